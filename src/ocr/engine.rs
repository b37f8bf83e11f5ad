use crate::defaults;
use crate::error::{OcrelayError, Result};
use crate::media::ProcessedImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Which backend produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Local,
    Remote,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Local => "local",
            EngineKind::Remote => "remote",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Region the remote service should read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrFocus {
    /// The whole processed crop.
    #[default]
    Full,
    /// Only a visually marked sub-region, when the service finds one.
    Highlight,
}

impl OcrFocus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrFocus::Full => "full",
            OcrFocus::Highlight => "highlight",
        }
    }
}

/// Recognition parameters shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOptions {
    /// Tesseract-style language codes, e.g. `["eng", "rus"]`.
    pub languages: Vec<String>,
    pub char_whitelist: String,
}

impl OcrOptions {
    /// Languages joined the way Tesseract expects them (`eng+rus`).
    pub fn language_spec(&self) -> String {
        self.languages.join("+")
    }
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            languages: defaults::OCR_LANGUAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            char_whitelist: defaults::CHAR_WHITELIST.to_string(),
        }
    }
}

/// Text recognized from one processed image. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrResult {
    pub raw_text: String,
    pub engine: EngineKind,
    /// Whether the remote service found a highlight mask. `None` for local recognition.
    pub mask_present: Option<bool>,
}

impl OcrResult {
    pub fn local(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            engine: EngineKind::Local,
            mask_present: None,
        }
    }

    pub fn remote(raw_text: impl Into<String>, mask_present: bool) -> Self {
        Self {
            raw_text: raw_text.into(),
            engine: EngineKind::Remote,
            mask_present: Some(mask_present),
        }
    }
}

/// OCR backend contract.
///
/// Implementations are selected once at startup; the orchestrator only
/// ever sees `dyn OcrEngine`.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize the text in a processed image.
    ///
    /// # Errors
    /// - `OcrUnavailable` when the backend cannot be reached (retryable)
    /// - `OcrTimeout` when the backend did not answer in time (retryable)
    /// - `Ocr` for malformed responses or engine failures
    async fn recognize(&self, image: &ProcessedImage, options: &OcrOptions) -> Result<OcrResult>;

    fn kind(&self) -> EngineKind;

    /// Human-readable backend description for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: OcrEngine + ?Sized> OcrEngine for Arc<T> {
    async fn recognize(&self, image: &ProcessedImage, options: &OcrOptions) -> Result<OcrResult> {
        (**self).recognize(image, options).await
    }

    fn kind(&self) -> EngineKind {
        (**self).kind()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mock engine for testing
#[derive(Debug, Clone)]
pub struct MockOcrEngine {
    kind: EngineKind,
    response: String,
    should_fail: bool,
    unavailable_for: usize,
    delays: Arc<Mutex<Vec<Duration>>>,
    calls: Arc<AtomicUsize>,
}

impl MockOcrEngine {
    pub fn new() -> Self {
        Self {
            kind: EngineKind::Local,
            response: "mock text".to_string(),
            should_fail: false,
            unavailable_for: 0,
            delays: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific text
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail with a non-retryable engine error
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Report the backend as unavailable for the first `calls` calls
    pub fn unavailable_for(mut self, calls: usize) -> Self {
        self.unavailable_for = calls;
        self
    }

    /// Sleep before answering; each call takes the next delay, the last one repeats
    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        if let Ok(mut guard) = self.delays.lock() {
            *guard = delays;
        }
        self
    }

    pub fn with_kind(mut self, kind: EngineKind) -> Self {
        self.kind = kind;
        self
    }

    /// Number of `recognize` calls so far (shared between clones)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_delay(&self) -> Option<Duration> {
        let mut guard = self.delays.lock().ok()?;
        match guard.len() {
            0 => None,
            1 => guard.first().copied(),
            _ => Some(guard.remove(0)),
        }
    }
}

impl Default for MockOcrEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for MockOcrEngine {
    async fn recognize(&self, _image: &ProcessedImage, _options: &OcrOptions) -> Result<OcrResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.next_delay() {
            tokio::time::sleep(delay).await;
        }

        if call < self.unavailable_for {
            return Err(OcrelayError::OcrUnavailable {
                message: "mock backend unavailable".to_string(),
            });
        }
        if self.should_fail {
            return Err(OcrelayError::Ocr {
                message: "mock recognition failure".to_string(),
            });
        }

        Ok(OcrResult {
            raw_text: self.response.clone(),
            engine: self.kind,
            mask_present: match self.kind {
                EngineKind::Local => None,
                EngineKind::Remote => Some(false),
            },
        })
    }

    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn name(&self) -> &str {
        "mock"
    }
}
