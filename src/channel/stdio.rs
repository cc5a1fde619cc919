//! JSON-lines client connection over an async writer (stdout by default).
//!
//! All output goes through a bounded queue drained by one writer task, so a
//! line is either written whole or not at all. Pushes never wait for the
//! writer; when the queue is full the message is dropped.

use super::ClientConnection;
use crate::error::ApiError;
use crate::protocol::PushMessage;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type LineWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Lines that may wait for the writer before pushes start being dropped
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

enum Outbound {
    Line(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

/// Client reached through a line-oriented stream; each message is one JSON line.
pub struct StdoutConnection {
    label: String,
    tx: mpsc::Sender<Outbound>,
    dropped_messages: AtomicU64,
}

impl StdoutConnection {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self::with_writer("stdout", Box::new(tokio::io::stdout()))
    }

    pub fn with_writer(label: impl Into<String>, writer: LineWriter) -> Self {
        Self::with_capacity(label, writer, OUTBOUND_QUEUE_CAPACITY)
    }

    pub fn with_capacity(label: impl Into<String>, writer: LineWriter, capacity: usize) -> Self {
        let label = label.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(writer_loop(label.clone(), writer, rx));
        Self {
            label,
            tx,
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue `value` as a single line, waiting for room in the queue.
    pub async fn write_line<T: Serialize>(&self, value: &T) -> Result<(), ApiError> {
        let line = encode_line(value)?;
        self.tx
            .send(Outbound::Line(line))
            .await
            .map_err(|_| ApiError::DeliveryFailure(format!("{} writer stopped", self.label)))
    }

    /// Wait until every line queued before this call has been written and flushed.
    pub async fn flush(&self) -> Result<(), ApiError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Outbound::Flush(ack))
            .await
            .map_err(|_| ApiError::DeliveryFailure(format!("{} writer stopped", self.label)))?;
        done.await
            .map_err(|_| ApiError::DeliveryFailure(format!("{} writer stopped", self.label)))
    }

    /// Pushes dropped because the queue was full or the writer had stopped
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

impl Default for StdoutConnection {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>, ApiError> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(line)
}

async fn writer_loop(label: String, mut out: LineWriter, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Line(line) => {
                let written = match out.write_all(&line).await {
                    Ok(()) => out.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    warn!(label = %label, error = %e, "Client writer failed; closing connection");
                    return;
                }
            }
            Outbound::Flush(ack) => {
                if let Err(e) = out.flush().await {
                    warn!(label = %label, error = %e, "Client writer failed; closing connection");
                    return;
                }
                let _ = ack.send(());
            }
        }
    }
    debug!(label = %label, "Client writer finished");
}

#[async_trait]
impl ClientConnection for StdoutConnection {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, message: &PushMessage) -> Result<(), ApiError> {
        let line = encode_line(message)?;
        self.tx.try_send(Outbound::Line(line)).map_err(|err| {
            self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    ApiError::DeliveryFailure(format!("{} queue full", self.label))
                }
                mpsc::error::TrySendError::Closed(_) => {
                    ApiError::DeliveryFailure(format!("{} writer stopped", self.label))
                }
            }
        })
    }

    async fn keepalive(&self) -> Result<(), ApiError> {
        // The ack is the writer draining the queue up to this point.
        self.flush().await
    }
}
