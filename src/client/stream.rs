//! Byte-reporting stream wrapper for the TCP dial path

use super::trace::TraceContext;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// The trace of the request currently using a transport's connections.
///
/// Pooled connections outlive a single request, so streams look up the
/// active trace on every I/O instead of capturing one at dial time.
#[derive(Debug, Default)]
pub struct TraceSlot {
    current: Mutex<Option<TraceContext>>,
    awaiting_response: AtomicBool,
}

impl TraceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route subsequent I/O events to `trace`
    pub fn install(&self, trace: TraceContext) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(trace);
        }
        self.awaiting_response.store(false, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        self.awaiting_response.store(false, Ordering::SeqCst);
    }

    /// While set, writes are reported as request bytes
    pub fn set_awaiting_response(&self, awaiting: bool) {
        self.awaiting_response.store(awaiting, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Option<TraceContext> {
        self.current.lock().ok().and_then(|current| current.clone())
    }

    fn report_read(&self, n: usize) {
        if let Some(trace) = self.snapshot() {
            trace.fire(|h| h.read.as_ref(), &n);
        }
    }

    fn report_write(&self, n: usize) {
        if let Some(trace) = self.snapshot() {
            trace.fire(|h| h.write.as_ref(), &n);
            if self.awaiting_response.load(Ordering::SeqCst) {
                trace.fire(|h| h.wrote_request.as_ref(), &());
            }
        }
    }
}

/// Reports every successful read and write to a [`TraceSlot`]
#[derive(Debug)]
pub struct TracedStream<S> {
    inner: S,
    slot: Arc<TraceSlot>,
}

impl<S> TracedStream<S> {
    pub fn new(inner: S, slot: Arc<TraceSlot>) -> Self {
        Self { inner, slot }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TracedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let result = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let n = buf.filled().len() - before;
            if n > 0 {
                self.slot.report_read(n);
            }
        }
        result
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TracedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let result = Pin::new(&mut self.inner).poll_write(cx, data);
        if let Poll::Ready(Ok(n)) = &result {
            if *n > 0 {
                self.slot.report_write(*n);
            }
        }
        result
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Plain or TLS connection, both traced at the TCP level
pub enum ConnStream {
    Plain(TracedStream<TcpStream>),
    Tls(Box<TlsStream<TracedStream<TcpStream>>>),
}

impl AsyncRead for ConnStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ConnStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ConnStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_write(cx, data),
            ConnStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, data),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ConnStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ConnStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::trace::HookSet;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_reads_and_writes_are_reported() {
        let (client, mut server) = tokio::io::duplex(64);
        let read = Arc::new(AtomicUsize::new(0));
        let written = Arc::new(AtomicUsize::new(0));
        let wrote_request = Arc::new(AtomicUsize::new(0));
        let (r, w, q) = (read.clone(), written.clone(), wrote_request.clone());

        let slot = Arc::new(TraceSlot::new());
        slot.install(TraceContext::new().attach(
            HookSet::new()
                .on_read(move |n| { r.fetch_add(*n, Ordering::SeqCst); })
                .on_write(move |n| { w.fetch_add(*n, Ordering::SeqCst); })
                .on_wrote_request(move |_| { q.fetch_add(1, Ordering::SeqCst); }),
        ));

        let mut stream = TracedStream::new(client, slot.clone());
        stream.write_all(b"hello").await.unwrap();
        assert_eq!(wrote_request.load(Ordering::SeqCst), 0);

        slot.set_awaiting_response(true);
        stream.write_all(b"!").await.unwrap();
        server.write_all(b"world!!").await.unwrap();

        let mut buf = [0u8; 7];
        stream.read_exact(&mut buf).await.unwrap();

        assert_eq!(written.load(Ordering::SeqCst), 6);
        assert_eq!(read.load(Ordering::SeqCst), 7);
        assert_eq!(wrote_request.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleared_slot_reports_nothing() {
        let (client, mut server) = tokio::io::duplex(64);
        let read = Arc::new(AtomicUsize::new(0));
        let r = read.clone();
        let slot = Arc::new(TraceSlot::new());
        slot.install(TraceContext::new().attach(
            HookSet::new().on_read(move |n| { r.fetch_add(*n, Ordering::SeqCst); }),
        ));
        slot.clear();

        let mut stream = TracedStream::new(client, slot);
        server.write_all(b"abc").await.unwrap();
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(read.load(Ordering::SeqCst), 0);
    }
}
