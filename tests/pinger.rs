//! Orchestrator tests with a scripted probe client

use async_trait::async_trait;
use http_ping::{
    client::ProbeClient,
    executor::{PingSource, Pinger},
    models::{Config, Measurement, RuntimeConfig},
    Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Clone)]
struct MockClient {
    probes: Arc<AtomicUsize>,
    delay: Duration,
}

impl MockClient {
    fn new(delay: Duration) -> Self {
        Self { probes: Arc::new(AtomicUsize::new(0)), delay }
    }
}

#[async_trait]
impl ProbeClient for MockClient {
    async fn do_measure(&mut self, _follow_redirects: bool) -> Measurement {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Measurement { proto: "HTTP/2.0".to_string(), status_code: 200, ..Default::default() }
    }

    fn url(&self) -> String {
        "https://mock.test/".to_string()
    }

    fn fresh_instance(&self) -> Result<Box<dyn ProbeClient>> {
        Ok(Box::new(self.clone()))
    }
}

fn config(workers: usize, count: u64, keep_alive: bool) -> Config {
    let mut config = Config::for_target("https://mock.test/");
    config.workers = workers;
    config.count = count;
    config.interval = Duration::ZERO;
    config.disable_keep_alive = !keep_alive;
    config
}

async fn collect(mut rx: mpsc::Receiver<Measurement>) -> Vec<Measurement> {
    let mut received = Vec::new();
    while let Some(measurement) = rx.recv().await {
        received.push(measurement);
    }
    received
}

#[tokio::test]
async fn test_workers_times_count_measurements() {
    let client = MockClient::new(Duration::ZERO);
    let probes = client.probes.clone();
    let config = config(3, 10, false);
    let mut pinger = Pinger::with_client(&config, &RuntimeConfig::default(), Box::new(client));

    let received = collect(pinger.ping().unwrap()).await;

    assert_eq!(received.len(), 30);
    assert_eq!(probes.load(Ordering::SeqCst), 30);
    assert!(received.iter().all(|m| m.status_code == 200));
}

#[tokio::test]
async fn test_single_worker_count() {
    let client = MockClient::new(Duration::ZERO);
    let config = config(1, 123, false);
    let mut pinger = Pinger::with_client(&config, &RuntimeConfig::default(), Box::new(client));

    assert_eq!(collect(pinger.ping().unwrap()).await.len(), 123);
}

#[tokio::test]
async fn test_keep_alive_warm_up_is_not_reported() {
    let client = MockClient::new(Duration::ZERO);
    let probes = client.probes.clone();
    let config = config(1, 123, true);
    let mut pinger = Pinger::with_client(&config, &RuntimeConfig::default(), Box::new(client));

    assert_eq!(collect(pinger.ping().unwrap()).await.len(), 123);
    assert_eq!(probes.load(Ordering::SeqCst), 124);
}

#[tokio::test]
async fn test_stop_closes_stream() {
    let client = MockClient::new(Duration::from_millis(5));
    let mut config = config(2, u64::MAX, false);
    config.interval = Duration::from_millis(5);
    let mut pinger = Pinger::with_client(&config, &RuntimeConfig::default(), Box::new(client));

    let mut rx = pinger.ping().unwrap();
    for _ in 0..3 {
        assert!(rx.recv().await.is_some());
    }
    PingSource::stop(&pinger);

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while rx.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok(), "stream did not close after stop");
}

#[tokio::test]
async fn test_source_reports_client_url() {
    let config = config(1, 1, false);
    let pinger = Pinger::with_client(&config, &RuntimeConfig::default(), Box::new(MockClient::new(Duration::ZERO)));
    assert_eq!(PingSource::url(&pinger), "https://mock.test/");
}
