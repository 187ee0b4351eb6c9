//! Probe orchestration
//!
//! This module contains:
//! - The `Pinger`, which runs concurrent workers issuing paced probes into one stream
//! - The `PingSource` seam consumed by the reporting layer
//! - A throughput window sampled by an external ticker

pub mod throughput;

pub use throughput::{ThroughputSample, ThroughputWindow};

use crate::{
    client::{ProbeClient, WebClient},
    error::{AppError, Result},
    logging::Logger,
    models::{Config, Measurement, RuntimeConfig},
};
use futures::future::join_all;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Buffered measurements between workers and the consumer
const CHANNEL_CAPACITY: usize = 64;

/// A stream of measurements for one target
pub trait PingSource: Send {
    /// Current target, updated after a redirect or an Alt-Svc upgrade
    fn url(&self) -> String;

    /// Start probing; the receiver closes once every worker is done or after `stop`
    fn ping(&mut self) -> Result<mpsc::Receiver<Measurement>>;

    /// Ask every worker to stop
    fn stop(&self);
}

/// Per-worker loop parameters
#[derive(Debug, Clone, Copy)]
struct WorkerPlan {
    count: u64,
    interval: Duration,
    keep_alive: bool,
    follow_redirects: bool,
}

impl WorkerPlan {
    fn from_config(config: &Config) -> Self {
        Self {
            count: config.count,
            interval: config.interval,
            keep_alive: config.keep_alive(),
            follow_redirects: config.follow_redirects,
        }
    }
}

/// Runs `workers` concurrent probe loops against one target
pub struct Pinger {
    plan: WorkerPlan,
    workers: usize,
    client: Option<Box<dyn ProbeClient>>,
    url: Arc<RwLock<String>>,
    stop_tx: watch::Sender<bool>,
    logger: Logger,
}

impl Pinger {
    /// Build a pinger with a web client for the configured target
    pub fn new(config: &Config, runtime: &RuntimeConfig) -> Result<Self> {
        let client = WebClient::new(config, runtime)?;
        Ok(Self::with_client(config, runtime, Box::new(client)))
    }

    /// Build a pinger around an existing client
    pub fn with_client(config: &Config, runtime: &RuntimeConfig, client: Box<dyn ProbeClient>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            plan: WorkerPlan::from_config(config),
            workers: config.workers.max(1),
            url: Arc::new(RwLock::new(client.url())),
            client: Some(client),
            stop_tx,
            logger: runtime.logger.named("PINGER"),
        }
    }

    pub fn url(&self) -> String {
        read_url(&self.url)
    }

    /// Start probing. Can only be called once per pinger.
    pub fn ping(&mut self) -> Result<mpsc::Receiver<Measurement>> {
        let mut client = self
            .client
            .take()
            .ok_or_else(|| AppError::internal("Pinger has already been started"))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let plan = self.plan;
        let workers = self.workers;
        let url = self.url.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        let logger = self.logger.clone();

        tokio::spawn(async move {
            if plan.follow_redirects {
                tokio::select! {
                    biased;
                    _ = stopped(&mut stop_rx) => return,
                    _ = client.do_measure(true) => {}
                }
                let final_url = client.url();
                logger.debug(&format!("Redirect warm-up settled on {}", final_url))
                    .field("url", &final_url)
                    .log()
                    .await;
                if let Ok(mut shared) = url.write() {
                    *shared = final_url;
                }
            }

            let mut tasks = Vec::with_capacity(workers);
            if workers == 1 {
                tasks.push(tokio::spawn(run_worker(client, plan, url, tx, stop_rx)));
            } else {
                for worker in 0..workers {
                    match client.fresh_instance() {
                        Ok(instance) => {
                            tasks.push(tokio::spawn(run_worker(
                                instance,
                                plan,
                                url.clone(),
                                tx.clone(),
                                stop_rx.clone(),
                            )));
                        }
                        Err(error) => {
                            logger.error(&format!("Failed to create client for worker {}: {}", worker, error))
                                .field("worker", worker)
                                .error_info(&error)
                                .log()
                                .await;
                            let _ = tx.send(Measurement::failure(error.to_string(), Default::default())).await;
                        }
                    }
                }
                drop(tx);
            }

            logger.debug(&format!("Started {} worker(s)", tasks.len()))
                .field("workers", tasks.len())
                .field("count", plan.count)
                .log()
                .await;
            let _ = join_all(tasks).await;
        });

        Ok(rx)
    }

    /// Ask every worker to stop; the stream closes once they return.
    /// A stop requested before `ping` makes it return a stream that closes at once.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }
}

impl PingSource for Pinger {
    fn url(&self) -> String {
        Pinger::url(self)
    }

    fn ping(&mut self) -> Result<mpsc::Receiver<Measurement>> {
        Pinger::ping(self)
    }

    fn stop(&self) {
        Pinger::stop(self)
    }
}

fn read_url(url: &RwLock<String>) -> String {
    url.read().map(|u| u.clone()).unwrap_or_default()
}

/// Resolves once a stop is requested; never resolves if the pinger is gone
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    if stop_rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Sleep for `duration`, returning true when interrupted by a stop
async fn pause(duration: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = stopped(stop_rx) => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Publish the client's target when an upgrade moved it
fn publish_url(client: &dyn ProbeClient, url: &RwLock<String>) {
    let current = client.url();
    if read_url(url) != current {
        if let Ok(mut shared) = url.write() {
            *shared = current;
        }
    }
}

/// Redirects were settled by the warm-up, so worker probes never follow them
async fn run_worker(
    mut client: Box<dyn ProbeClient>,
    plan: WorkerPlan,
    url: Arc<RwLock<String>>,
    tx: mpsc::Sender<Measurement>,
    mut stop_rx: watch::Receiver<bool>,
) {
    if plan.keep_alive {
        tokio::select! {
            biased;
            _ = stopped(&mut stop_rx) => return,
            _ = client.do_measure(false) => {}
        }
        publish_url(client.as_ref(), &url);
        if pause(plan.interval, &mut stop_rx).await {
            return;
        }
    }

    for probe in 0..plan.count {
        let measurement = tokio::select! {
            biased;
            _ = stopped(&mut stop_rx) => return,
            measurement = client.do_measure(false) => measurement,
        };
        publish_url(client.as_ref(), &url);
        if tx.send(measurement).await.is_err() {
            return;
        }
        if probe + 1 < plan.count && pause(plan.interval, &mut stop_rx).await {
            return;
        }
    }
}
