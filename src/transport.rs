//! Line based message transport: one `subject payload` message per line.
use crate::error::Result;
use crate::pipeline::{InboundMessage, Publisher};
use anyhow::Context;
use std::io::BufRead;
use std::thread::{self, JoinHandle};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Splits a `subject payload` line. The payload may be empty; blank lines yield nothing.
pub fn parse_line(line: &str) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (subject, payload) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    Some(InboundMessage::new(subject, payload.trim()))
}

/// Forwards every line of `reader` to `tx` until EOF or until the receiver is dropped. Returns
/// the number of forwarded messages.
///
/// Reads on a plain OS thread, so a read blocked on an idle stdin never holds up runtime
/// shutdown. A thread that is still blocked when the process exits is simply dropped.
pub fn spawn_line_reader<R>(
    reader: R,
    tx: mpsc::Sender<InboundMessage>,
) -> JoinHandle<Result<usize>>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        let mut forwarded = 0;
        for line in reader.lines() {
            let line = line.context("Error reading inbound message")?;
            let Some(message) = parse_line(&line) else {
                continue;
            };
            if tx.blocking_send(message).is_err() {
                debug!("Inbound channel closed");
                break;
            }
            forwarded += 1;
        }
        Ok(forwarded)
    })
}

/// Writes published messages as `subject payload` lines.
pub struct LinePublisher<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin> LinePublisher<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: AsyncWrite + Unpin> Publisher for LinePublisher<W> {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<()> {
        let payload = String::from_utf8_lossy(payload);
        if payload.contains('\n') {
            warn!(subject, "Payload contains a line break, message will be split");
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_all(format!("{subject} {payload}\n").as_bytes())
            .await
            .with_context(|| format!("Error publishing to {subject}"))?;
        writer.flush().await.context("Error flushing publisher")?;
        Ok(())
    }
}

/// Sends published messages into an unbounded channel, for embedding the pipeline in-process.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Publisher for ChannelPublisher {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<()> {
        self.tx
            .send(InboundMessage::new(subject, payload))
            .map_err(|_| anyhow::anyhow!("Receiver for {subject} dropped"))?;
        Ok(())
    }
}
