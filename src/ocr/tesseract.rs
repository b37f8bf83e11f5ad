//! Local OCR engine backed by Tesseract.
//!
//! # Feature Gate
//!
//! Real recognition requires the `tesseract` feature (libtesseract and
//! libleptonica development headers must be installed):
//!
//! ```bash
//! cargo build --features tesseract
//! ```
//!
//! Without it, [`TesseractEngine`] still constructs but every call fails with
//! `OcrUnavailable`, which the orchestrator degrades to "no text found".

use crate::defaults;
use crate::error::{OcrelayError, Result};
use crate::media::ProcessedImage;
use crate::ocr::engine::{EngineKind, OcrEngine, OcrOptions, OcrResult};
use async_trait::async_trait;
use std::path::PathBuf;

#[cfg(feature = "tesseract")]
use leptess::{LepTess, Variable};

/// Configuration for the local engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TesseractConfig {
    /// Directory holding `*.traineddata` (None = Tesseract's compiled-in default)
    pub tessdata_dir: Option<PathBuf>,
    /// Page segmentation mode (6 = a single uniform block of text)
    pub page_segmentation_mode: u32,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            tessdata_dir: None,
            page_segmentation_mode: defaults::PAGE_SEGMENTATION_MODE,
        }
    }
}

/// In-process recognition engine.
///
/// A fresh Tesseract handle is created per call on the blocking pool, so
/// concurrent events never share engine state.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TesseractConfig {
        &self.config
    }

    /// Whether this binary was built with Tesseract support.
    pub fn is_available() -> bool {
        cfg!(feature = "tesseract")
    }
}

#[cfg(feature = "tesseract")]
fn recognize_blocking(
    bytes: &[u8],
    options: &OcrOptions,
    config: &TesseractConfig,
) -> Result<String> {
    let tessdata = config
        .tessdata_dir
        .as_ref()
        .map(|p| p.to_string_lossy().to_string());

    let mut tess = LepTess::new(tessdata.as_deref(), &options.language_spec()).map_err(|e| {
        OcrelayError::OcrUnavailable {
            message: format!(
                "failed to initialise tesseract for '{}': {e}",
                options.language_spec()
            ),
        }
    })?;

    if !options.char_whitelist.is_empty() {
        tess.set_variable(Variable::TesseditCharWhitelist, &options.char_whitelist)
            .map_err(|e| OcrelayError::Ocr {
                message: format!("failed to set character whitelist: {e}"),
            })?;
    }
    tess.set_variable(
        Variable::TesseditPagesegMode,
        &config.page_segmentation_mode.to_string(),
    )
    .map_err(|e| OcrelayError::Ocr {
        message: format!("failed to set page segmentation mode: {e}"),
    })?;

    tess.set_image_from_mem(bytes)
        .map_err(|e| OcrelayError::Ocr {
            message: format!("tesseract could not load image: {e}"),
        })?;

    tess.get_utf8_text().map_err(|e| OcrelayError::Ocr {
        message: format!("tesseract returned invalid UTF-8: {e}"),
    })
}

#[cfg(feature = "tesseract")]
#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, image: &ProcessedImage, options: &OcrOptions) -> Result<OcrResult> {
        let bytes = image.bytes().to_vec();
        let options = options.clone();
        let config = self.config.clone();

        let text = tokio::task::spawn_blocking(move || recognize_blocking(&bytes, &options, &config))
            .await
            .map_err(|e| OcrelayError::Ocr {
                message: format!("tesseract task panicked: {e}"),
            })??;

        tracing::debug!(chars = text.chars().count(), "local recognition finished");
        Ok(OcrResult::local(text))
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Local
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

#[cfg(not(feature = "tesseract"))]
#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, _image: &ProcessedImage, _options: &OcrOptions) -> Result<OcrResult> {
        Err(OcrelayError::OcrUnavailable {
            message: concat!(
                "tesseract feature not enabled. This binary was built without local OCR.\n",
                "To fix: cargo build --release --features tesseract\n",
                "or set [ocr] backend = \"remote\""
            )
            .to_string(),
        })
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Local
    }

    fn name(&self) -> &str {
        "tesseract (disabled)"
    }
}
