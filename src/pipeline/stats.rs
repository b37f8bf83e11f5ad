//! Run counters shared by all event tasks.

use crate::pipeline::policy::ForwardingDecision;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated from concurrent event tasks.
#[derive(Debug, Default)]
pub struct RunStats {
    received: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    forward_text: AtomicU64,
    forward_media: AtomicU64,
    forward_text_and_media: AtomicU64,
    no_text_found: AtomicU64,
    ocr_failures: AtomicU64,
    fallbacks: AtomicU64,
    reconnects: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision(&self, decision: &ForwardingDecision) {
        let counter = match decision {
            ForwardingDecision::ForwardText(_) => &self.forward_text,
            ForwardingDecision::ForwardMedia(_) => &self.forward_media,
            ForwardingDecision::ForwardTextAndMedia(..) => &self.forward_text_and_media,
            ForwardingDecision::NoTextFound(_) => &self.no_text_found,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ocr_failure(&self) {
        self.ocr_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// An event that could not run its normal branch (fetch or transform failure).
    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            forward_text: self.forward_text.load(Ordering::Relaxed),
            forward_media: self.forward_media.load(Ordering::Relaxed),
            forward_text_and_media: self.forward_text_and_media.load(Ordering::Relaxed),
            no_text_found: self.no_text_found.load(Ordering::Relaxed),
            ocr_failures: self.ocr_failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`RunStats`], returned when the orchestrator stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunSummary {
    pub received: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub forward_text: u64,
    pub forward_media: u64,
    pub forward_text_and_media: u64,
    pub no_text_found: u64,
    pub ocr_failures: u64,
    pub fallbacks: u64,
    pub reconnects: u64,
}

impl RunSummary {
    /// Total decisions taken; equals `received` once all tasks have finished.
    pub fn decisions(&self) -> u64 {
        self.forward_text + self.forward_media + self.forward_text_and_media + self.no_text_found
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} received, {} delivered, {} dropped (text {}, media {}, text+media {}, no text {}; {} OCR failures, {} fallbacks, {} reconnects)",
            self.received,
            self.delivered,
            self.dropped,
            self.forward_text,
            self.forward_media,
            self.forward_text_and_media,
            self.no_text_found,
            self.ocr_failures,
            self.fallbacks,
            self.reconnects
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaAsset;

    #[test]
    fn test_counts_decisions_by_variant() {
        let stats = RunStats::new();
        let asset = MediaAsset::from_bytes(vec![1, 2, 3], None);

        stats.record_decision(&ForwardingDecision::ForwardText("a".into()));
        stats.record_decision(&ForwardingDecision::ForwardText("b".into()));
        stats.record_decision(&ForwardingDecision::NoTextFound(asset.clone()));
        stats.record_decision(&ForwardingDecision::ForwardMedia(asset));

        let summary = stats.summary();
        assert_eq!(summary.forward_text, 2);
        assert_eq!(summary.no_text_found, 1);
        assert_eq!(summary.forward_media, 1);
        assert_eq!(summary.decisions(), 4);
    }

    #[test]
    fn test_delivery_counters() {
        let stats = RunStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_delivered();
        stats.record_dropped();

        let summary = stats.summary();
        assert_eq!(summary.received, 2);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.dropped, 1);
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            received: 3,
            delivered: 3,
            ..RunSummary::default()
        };
        assert!(summary.to_string().starts_with("3 received, 3 delivered, 0 dropped"));
    }
}
