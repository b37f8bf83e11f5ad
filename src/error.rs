//! Error types for ocrelay.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrelayError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Media errors
    #[error("Invalid media: {message}")]
    InvalidMedia { message: String },

    #[error("Crop geometry error: {message}")]
    Geometry { message: String },

    // OCR errors
    #[error("OCR failed: {message}")]
    Ocr { message: String },

    #[error("OCR backend unavailable: {message}")]
    OcrUnavailable { message: String },

    #[error("OCR timed out after {timeout_ms}ms")]
    OcrTimeout { timeout_ms: u64 },

    // Delivery errors
    #[error("Sink delivery failed: {message}")]
    SinkDelivery { message: String },

    // Event source errors
    #[error("Event source disconnected: {message}")]
    Source { message: String },

    #[error("Event source unreachable after {attempts} attempt(s): {message}")]
    SourceConnectivity { attempts: u32, message: String },

    #[error("Failed to fetch media {reference}: {message}")]
    MediaFetch { reference: String, message: String },

    // Transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl OcrelayError {
    /// Whether retrying the failed operation may succeed.
    ///
    /// Backend outages, timeouts, transient disconnects and delivery
    /// failures are retryable; content and configuration errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OcrelayError::OcrUnavailable { .. }
                | OcrelayError::OcrTimeout { .. }
                | OcrelayError::SinkDelivery { .. }
                | OcrelayError::Source { .. }
                | OcrelayError::MediaFetch { .. }
                | OcrelayError::Http(_)
        )
    }

    /// Only an exhausted reconnect budget may terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OcrelayError::SourceConnectivity { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, OcrelayError>;
