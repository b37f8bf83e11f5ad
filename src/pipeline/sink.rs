use crate::error::{OcrelayError, Result};
use crate::event::EventMeta;
use crate::pipeline::policy::ForwardingDecision;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One forwarding decision, tagged with the event it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub meta: EventMeta,
    pub decision: ForwardingDecision,
}

/// Destination for forwarding decisions.
///
/// Deliveries may arrive in any order across events; a sink must not rely
/// on arrival order matching post order.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one decision. Errors are retried by the orchestrator.
    async fn deliver(&self, delivery: &Delivery) -> Result<()>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

#[async_trait]
impl<T: Sink + ?Sized> Sink for Arc<T> {
    async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        (**self).deliver(delivery).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Header line for relayed text: `🔔 New post in "<channel>":`.
pub fn headline(meta: &EventMeta) -> String {
    format!("🔔 New post in \"{}\":", meta.display_name())
}

/// Caption for a photo in which no text was recognized.
pub fn no_text_caption(meta: &EventMeta) -> String {
    format!(
        "🔔 Image in \"{}\", but no text was recognized.",
        meta.display_name()
    )
}

/// Full relay text for a decision that carries text.
pub fn render_text(meta: &EventMeta, text: &str) -> String {
    format!("{}\n\n{}", headline(meta), text)
}

/// Test sink that records every delivery.
///
/// Clones share the same storage, so a clone can be handed to the
/// orchestrator while the test keeps the original for assertions.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    collected: Arc<Mutex<Vec<Delivery>>>,
    failures_left: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `count` delivery attempts with `SinkDelivery`.
    pub fn with_failures(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.collected
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.collected.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivery attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for CollectorSink {
    async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(OcrelayError::SinkDelivery {
                message: "collector configured to fail".to_string(),
            });
        }

        self.collected
            .lock()
            .map_err(|_| OcrelayError::SinkDelivery {
                message: "collector lock poisoned".to_string(),
            })?
            .push(delivery.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Pipe mode sink — prints each delivery to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn render(delivery: &Delivery) -> String {
        let meta = &delivery.meta;
        match &delivery.decision {
            ForwardingDecision::ForwardText(text) => render_text(meta, text),
            ForwardingDecision::ForwardMedia(media) => format!(
                "{} [{}, {} bytes]",
                headline(meta),
                media.mime_type,
                media.len()
            ),
            ForwardingDecision::ForwardTextAndMedia(text, media) => format!(
                "{}\n[{}, {} bytes]",
                render_text(meta, text),
                media.mime_type,
                media.len()
            ),
            ForwardingDecision::NoTextFound(media) => format!(
                "{} [{}, {} bytes]",
                no_text_caption(meta),
                media.mime_type,
                media.len()
            ),
        }
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        println!("{}", Self::render(delivery));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}
