//! ocrelay - Relay channel posts, reading text out of screenshots
//!
//! Each post of a monitored channel becomes exactly one forwarded payload:
//! text is relayed as is, photos are cropped, filtered and run through OCR,
//! everything else is forwarded untouched.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod media;
pub mod ocr;
pub mod pipeline;
pub mod source;
pub mod telegram;
pub mod text;

// Composition root - needs everything
#[cfg(feature = "cli")]
pub mod app;

// Core traits (source → process → sink)
pub use ocr::OcrEngine;
pub use pipeline::sink::{CollectorSink, Sink, StdoutSink};
pub use source::{CredentialProvider, EventSource, MediaFetcher};

// Pipeline
pub use pipeline::orchestrator::{EventProcessor, Orchestrator, PipelineSettings};
pub use pipeline::policy::{ForwardingDecision, ForwardingPolicy};

// Error handling
pub use error::{OcrelayError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
