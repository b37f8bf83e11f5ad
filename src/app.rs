//! Relay application entry points.
//!
//! Wires configuration into concrete components:
//! Telegram source → pipeline → Telegram (or stdout) sink.

use crate::config::{Config, SinkKind};
use crate::error::{OcrelayError, Result};
use crate::media::MediaAsset;
use crate::ocr::{EngineKind, OcrEngine, RemoteOcrEngine, TesseractEngine};
use crate::pipeline::{OcrOutcome, Orchestrator, PolicyInput, RunSummary, Sink, StdoutSink};
use crate::source::CredentialProvider;
use crate::telegram::{BotApi, TelegramSink, TelegramSource};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Headroom on top of the long-poll timeout for every Bot API request.
const API_TIMEOUT_HEADROOM: Duration = Duration::from_secs(15);

/// Build the configured OCR engine.
///
/// The remote service is probed once; a failing probe is only a warning
/// since the service may come up later and per-event retries cover it.
pub async fn build_engine(config: &Config) -> Result<Arc<dyn OcrEngine>> {
    match config.ocr.backend {
        EngineKind::Local => {
            if !TesseractEngine::is_available() {
                return Err(OcrelayError::OcrUnavailable {
                    message: "built without the `tesseract` feature; use --backend remote"
                        .to_string(),
                });
            }
            Ok(Arc::new(TesseractEngine::new(config.tesseract_config())))
        }
        EngineKind::Remote => {
            let engine = RemoteOcrEngine::new(config.remote_config())?;
            if let Err(e) = engine.check().await {
                tracing::warn!(endpoint = %config.ocr.endpoint, error = %e, "OCR service health check failed");
            }
            Ok(Arc::new(engine))
        }
    }
}

fn build_sink(config: &Config, api: &Arc<BotApi>, force_stdout: bool) -> Result<Arc<dyn Sink>> {
    if force_stdout || config.sink.kind == SinkKind::Stdout {
        return Ok(Arc::new(StdoutSink));
    }
    if config.sink.chat_id.trim().is_empty() {
        return Err(OcrelayError::ConfigInvalidValue {
            key: "sink.chat_id".to_string(),
            message: "required for the telegram sink (or set OCRELAY_SINK_CHAT)".to_string(),
        });
    }
    Ok(Arc::new(TelegramSink::new(
        Arc::clone(api),
        config.sink.chat_id.clone(),
    )))
}

/// Run the relay until `cancel` fires or the source becomes unreachable.
pub async fn run_relay(
    config: &Config,
    credentials: &dyn CredentialProvider,
    force_stdout: bool,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let settings = config.pipeline_settings()?;
    if settings.channel.trim().is_empty() {
        return Err(OcrelayError::ConfigInvalidValue {
            key: "source.channel".to_string(),
            message: "no channel configured (or set OCRELAY_CHANNEL)".to_string(),
        });
    }

    let token = credentials.bot_token()?;
    let poll_timeout = Duration::from_secs(config.source.poll_timeout_secs);
    let api = Arc::new(BotApi::new(
        &config.source.api_base,
        token,
        poll_timeout + API_TIMEOUT_HEADROOM,
    )?);

    let engine = build_engine(config).await?;
    let sink = build_sink(config, &api, force_stdout)?;
    let mut source = TelegramSource::new(api, poll_timeout, config.source.max_media_bytes);

    let mut orchestrator = Orchestrator::new(settings, engine, sink);
    if let Some(archive) = config.archive() {
        tracing::info!(dir = %archive.dir().display(), "archiving photos");
        orchestrator = orchestrator.with_archive(archive);
    }
    orchestrator.run(&mut source, cancel).await
}

/// Outcome of `ocrelay scan` for one image.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub processed_width: Option<u32>,
    pub processed_height: Option<u32>,
    pub engine: String,
    pub raw_text: Option<String>,
    pub normalized_text: Option<String>,
    pub decision: &'static str,
    pub error: Option<String>,
}

/// Run transform → OCR → normalize → policy on one local image.
///
/// Stage failures are reported in the returned [`ScanReport`], not as errors.
pub async fn scan_image(
    config: &Config,
    engine: &dyn OcrEngine,
    image: &Path,
    save_processed: Option<&Path>,
) -> Result<ScanReport> {
    let settings = config.pipeline_settings()?;
    let bytes = tokio::fs::read(image).await?;
    let original = MediaAsset::image(bytes)?;

    let mut report = ScanReport {
        mime_type: original.mime_type.clone(),
        width: original.width,
        height: original.height,
        processed_width: None,
        processed_height: None,
        engine: engine.name().to_string(),
        raw_text: None,
        normalized_text: None,
        decision: "",
        error: None,
    };

    let outcome = match settings.transform.apply(&original.bytes) {
        Err(e) => {
            report.error = Some(e.to_string());
            OcrOutcome::Untransformable {
                reason: e.to_string(),
            }
        }
        Ok(processed) => {
            report.processed_width = Some(processed.width());
            report.processed_height = Some(processed.height());
            if let Some(path) = save_processed {
                tokio::fs::write(path, processed.bytes()).await?;
                tracing::info!(path = %path.display(), mime = processed.mime_type(), "saved processed image");
            }

            let recognized = tokio::time::timeout(
                settings.ocr_timeout,
                engine.recognize(&processed, &settings.ocr_options),
            )
            .await
            .unwrap_or_else(|_| {
                Err(OcrelayError::OcrTimeout {
                    timeout_ms: settings.ocr_timeout.as_millis() as u64,
                })
            });

            match recognized {
                Ok(result) => {
                    let normalized = settings.normalizer.normalize(&result.raw_text);
                    report.raw_text = Some(result.raw_text);
                    report.normalized_text = Some(normalized.clone());
                    OcrOutcome::from_text(normalized, processed)
                }
                Err(e) => {
                    report.error = Some(e.to_string());
                    OcrOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        }
    };

    let decision = settings.policy.decide(PolicyInput::Photo { original, outcome });
    report.decision = decision.label();
    tracing::debug!(decision = report.decision, "scan finished");
    Ok(report)
}
