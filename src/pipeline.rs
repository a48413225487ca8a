//! Request loop: creation requests in, build results out.
//!
//! Inbound subjects are `{inbound_prefix}.collection` and `{inbound_prefix}.item` with the sensor
//! or acquisition key as payload. Every handled request publishes `{outbound_prefix}.{kind}` with
//! the resulting document key, or an empty payload when nothing was built.
use crate::builder::{BuildOutcome, CatalogBuilder, DocumentKind};
use crate::error::Result;
use crate::s3::ObjectStore;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
        }
    }
}

pub trait Publisher {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: usize,
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct EventPipeline<'a, S, P> {
    builder: CatalogBuilder<'a, S>,
    publisher: &'a P,
}

impl<'a, S: ObjectStore, P: Publisher> EventPipeline<'a, S, P> {
    pub fn new(builder: CatalogBuilder<'a, S>, publisher: &'a P) -> Self {
        Self { builder, publisher }
    }

    /// Handles inbound messages one at a time until the channel closes or `shutdown` turns true.
    ///
    /// Failed and panicking handlers are logged and counted; the loop keeps going.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> PipelineStats {
        let mut stats = PipelineStats::default();
        let mut watching = true;

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping");
                break;
            }

            let message = if watching {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        // sender gone: no shutdown can be signalled any more
                        watching = changed.is_ok();
                        continue;
                    }
                    message = inbound.recv() => message,
                }
            } else {
                inbound.recv().await
            };
            let Some(message) = message else {
                info!("Inbound channel closed, stopping");
                break;
            };

            stats.received += 1;
            match AssertUnwindSafe(self.handle(&message)).catch_unwind().await {
                Ok(Ok(true)) => stats.published += 1,
                Ok(Ok(false)) => stats.skipped += 1,
                Ok(Err(e)) => {
                    stats.failed += 1;
                    error!(subject = %message.subject, error = %e, "Error handling message");
                }
                Err(_) => {
                    stats.failed += 1;
                    error!(subject = %message.subject, "Handler panicked");
                }
            }
        }

        info!(
            received = stats.received,
            published = stats.published,
            failed = stats.failed,
            skipped = stats.skipped,
            "Pipeline stopped"
        );
        stats
    }

    /// Returns whether a result was published.
    async fn handle(&self, message: &InboundMessage) -> Result<bool> {
        let Some(kind) = self.request_kind(&message.subject) else {
            warn!(subject = %message.subject, "Unknown subject");
            return Ok(false);
        };
        let Ok(key) = std::str::from_utf8(&message.payload) else {
            warn!(subject = %message.subject, "Payload is not valid UTF-8");
            return Ok(false);
        };
        let key = key.trim();
        info!(subject = %message.subject, key, "Received request");

        let outcome = match kind {
            DocumentKind::Collection => self.builder.ensure_collection(key).await?,
            DocumentKind::Item => self.builder.ensure_item(key).await?,
        };
        self.publish(&outcome).await?;
        Ok(true)
    }

    fn request_kind(&self, subject: &str) -> Option<DocumentKind> {
        let (prefix, suffix) = subject.rsplit_once('.')?;
        if prefix != self.builder.settings().worker.inbound_prefix {
            return None;
        }
        match suffix {
            "collection" => Some(DocumentKind::Collection),
            "item" => Some(DocumentKind::Item),
            _ => None,
        }
    }

    async fn publish(&self, outcome: &BuildOutcome) -> Result<()> {
        let subject = format!(
            "{}.{}",
            self.builder.settings().worker.outbound_prefix,
            outcome.kind
        );
        let payload = outcome.key.as_deref().unwrap_or_default();
        debug!(subject = %subject, payload, "Publishing result");
        self.publisher.publish(&subject, payload.as_bytes()).await
    }
}
