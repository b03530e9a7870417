//! In-memory server side for integration testing.
//!
//! [`mock_pair`] returns a [`MockConnector`] to hand to the client and the
//! [`MockServer`] that receives its connections. By default every connect
//! attempt succeeds with a `tokio::io::duplex` pipe; a plan can be queued
//! to fail the next attempt or to serve a [`ScriptedStream`] instead.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use slircc::RemoteAddr;
use slircc::client::{BoxedStream, Connector};
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
    ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

const PIPE_CAPACITY: usize = 64 * 1024;

/// What the next connect attempt does.
pub enum Plan {
    /// Fail with an I/O error of this kind.
    Fail(io::ErrorKind),
    /// Serve a scripted stream instead of a pipe.
    Scripted(ScriptedStream),
}

#[derive(Default)]
struct Shared {
    plans: Mutex<VecDeque<Plan>>,
    attempts: Mutex<Vec<RemoteAddr>>,
    delay: Mutex<Option<Duration>>,
}

/// Connector handed to the client under test.
pub struct MockConnector {
    shared: Arc<Shared>,
    accepted: mpsc::UnboundedSender<DuplexStream>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, addr: &RemoteAddr) -> io::Result<BoxedStream> {
        self.shared.attempts.lock().push(addr.clone());

        let delay = *self.shared.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let plan = self.shared.plans.lock().pop_front();
        match plan {
            Some(Plan::Fail(kind)) => Err(io::Error::new(kind, "mock connect failure")),
            Some(Plan::Scripted(stream)) => Ok(Box::new(stream)),
            None => {
                let (client_side, server_side) = tokio::io::duplex(PIPE_CAPACITY);
                self.accepted
                    .send(server_side)
                    .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "server gone"))?;
                Ok(Box::new(client_side))
            }
        }
    }
}

/// Test-side view of the mock network.
pub struct MockServer {
    shared: Arc<Shared>,
    accepted: mpsc::UnboundedReceiver<DuplexStream>,
}

/// Create a connected connector/server pair.
pub fn mock_pair() -> (MockConnector, MockServer) {
    let shared = Arc::new(Shared::default());
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MockConnector {
            shared: Arc::clone(&shared),
            accepted: tx,
        },
        MockServer {
            shared,
            accepted: rx,
        },
    )
}

impl MockServer {
    /// Queue a plan for the next connect attempt.
    pub fn plan(&self, plan: Plan) {
        self.shared.plans.lock().push_back(plan);
    }

    /// Make every later connect attempt take `delay` before it resolves.
    pub fn delay_connects(&self, delay: Duration) {
        *self.shared.delay.lock() = Some(delay);
    }

    /// Addresses of every connect attempt so far.
    pub fn attempts(&self) -> Vec<RemoteAddr> {
        self.shared.attempts.lock().clone()
    }

    /// Wait for the next pipe connection.
    pub async fn accept(&mut self) -> ServerConn {
        let stream = timeout(Duration::from_secs(5), self.accepted.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped");
        let (read, write) = tokio::io::split(stream);
        ServerConn {
            reader: BufReader::new(read),
            writer: write,
        }
    }
}

/// Server end of one pipe connection.
pub struct ServerConn {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl ServerConn {
    /// Write raw bytes to the client.
    pub async fn write(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write to client");
        self.writer.flush().await.expect("flush to client");
    }

    /// Read one line (terminator included) written by the client.
    /// Returns an empty string at end of stream.
    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .expect("read from client");
        line
    }

    /// Hang up.
    pub fn close(self) {
        drop(self);
    }
}

/// A stream that replays queued read results and records writes.
///
/// Once the queue is empty, reads stay pending forever.
pub struct ScriptedStream {
    reads: VecDeque<io::Result<Vec<u8>>>,
    written: Arc<Mutex<Vec<u8>>>,
    shutdown_error: Option<io::ErrorKind>,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self {
            reads: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            shutdown_error: None,
        }
    }

    /// Queue a successful read of `bytes`.
    pub fn read(mut self, bytes: &[u8]) -> Self {
        self.reads.push_back(Ok(bytes.to_vec()));
        self
    }

    /// Queue a failed read.
    pub fn read_error(mut self, kind: io::ErrorKind) -> Self {
        self.reads.push_back(Err(io::Error::new(kind, "scripted read failure")));
        self
    }

    /// Queue end of stream.
    pub fn eof(self) -> Self {
        self.read(b"")
    }

    /// Make shutdown fail with `kind`.
    pub fn failing_shutdown(mut self, kind: io::ErrorKind) -> Self {
        self.shutdown_error = Some(kind);
        self
    }

    /// Handle to everything written so far.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.reads.pop_front() {
            Some(Ok(bytes)) => {
                buf.put_slice(&bytes);
                Poll::Ready(Ok(()))
            }
            Some(Err(e)) => Poll::Ready(Err(e)),
            None => Poll::Pending,
        }
    }
}

impl AsyncWrite for ScriptedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.written.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.shutdown_error {
            Some(kind) => Poll::Ready(Err(io::Error::new(kind, "scripted shutdown failure"))),
            None => Poll::Ready(Ok(())),
        }
    }
}
