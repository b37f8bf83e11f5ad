//! Remote OCR engine: posts the processed image to an HTTP recognition service.
//!
//! Request: multipart form with an `image` file part and a `focus` text field.
//! Response: JSON carrying `full_text`, an optional `highlighted_text` and a
//! `mask_present` flag, either at the top level or under an `ocr` object.

use crate::defaults;
use crate::error::{OcrelayError, Result};
use crate::media::ProcessedImage;
use crate::ocr::engine::{EngineKind, OcrEngine, OcrFocus, OcrOptions, OcrResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Configuration for the remote engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub focus: OcrFocus,
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::OCR_ENDPOINT.to_string(),
            focus: OcrFocus::Full,
            timeout: Duration::from_secs(defaults::OCR_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecognitionPayload {
    #[serde(default)]
    full_text: String,
    #[serde(default)]
    highlighted_text: Option<String>,
    #[serde(default)]
    mask_present: bool,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

pub struct RemoteOcrEngine {
    client: reqwest::Client,
    config: RemoteConfig,
    name: String,
}

impl std::fmt::Debug for RemoteOcrEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteOcrEngine")
            .field("config", &self.config)
            .finish()
    }
}

impl RemoteOcrEngine {
    /// # Errors
    /// `ConfigInvalidValue` if the endpoint is not an absolute URL.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        reqwest::Url::parse(&config.endpoint).map_err(|e| OcrelayError::ConfigInvalidValue {
            key: "ocr.endpoint".to_string(),
            message: format!("'{}' is not a valid URL: {e}", config.endpoint),
        })?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let name = format!("remote ({})", config.endpoint);
        Ok(Self {
            client,
            config,
            name,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Health endpoint next to the recognition endpoint (`.../ocr` -> `.../check`).
    pub fn health_url(&self) -> Result<reqwest::Url> {
        let endpoint = reqwest::Url::parse(&self.config.endpoint).map_err(|e| {
            OcrelayError::ConfigInvalidValue {
                key: "ocr.endpoint".to_string(),
                message: e.to_string(),
            }
        })?;
        endpoint
            .join("check")
            .map_err(|e| OcrelayError::ConfigInvalidValue {
                key: "ocr.endpoint".to_string(),
                message: e.to_string(),
            })
    }

    /// Probe the service's health endpoint.
    ///
    /// # Errors
    /// `OcrUnavailable` when the service is unreachable or not reporting `ok`.
    pub async fn check(&self) -> Result<()> {
        let url = self.health_url()?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(OcrelayError::OcrUnavailable {
                message: format!("{url} returned {}", response.status()),
            });
        }
        let health: HealthResponse =
            response
                .json()
                .await
                .map_err(|e| OcrelayError::OcrUnavailable {
                    message: format!("unexpected health response from {url}: {e}"),
                })?;
        if health.status != "ok" {
            return Err(OcrelayError::OcrUnavailable {
                message: format!("{url} reports status '{}'", health.status),
            });
        }
        Ok(())
    }

    fn map_transport_error(&self, e: reqwest::Error) -> OcrelayError {
        if e.is_timeout() {
            OcrelayError::OcrTimeout {
                timeout_ms: self.config.timeout.as_millis() as u64,
            }
        } else {
            OcrelayError::OcrUnavailable {
                message: format!("{}: {e}", self.config.endpoint),
            }
        }
    }

    fn select_text(&self, payload: RecognitionPayload) -> String {
        match (self.config.focus, payload.highlighted_text) {
            (OcrFocus::Highlight, Some(highlighted)) if !highlighted.trim().is_empty() => {
                highlighted
            }
            _ => payload.full_text,
        }
    }
}

/// Parse a service response body, accepting both the nested and the flat layout.
fn parse_payload(body: &[u8]) -> Result<RecognitionPayload> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| OcrelayError::Ocr {
        message: format!("malformed OCR response: {e}"),
    })?;

    if value.get("status").and_then(|s| s.as_str()) == Some("error") {
        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("service reported an error");
        return Err(OcrelayError::Ocr {
            message: message.to_string(),
        });
    }

    let payload = value.get("ocr").cloned().unwrap_or(value);
    if payload.get("full_text").is_none() {
        return Err(OcrelayError::Ocr {
            message: "malformed OCR response: missing full_text".to_string(),
        });
    }
    serde_json::from_value(payload).map_err(|e| OcrelayError::Ocr {
        message: format!("malformed OCR response: {e}"),
    })
}

#[async_trait]
impl OcrEngine for RemoteOcrEngine {
    async fn recognize(&self, image: &ProcessedImage, _options: &OcrOptions) -> Result<OcrResult> {
        let file_name = format!("image.{}", image.as_asset().extension());
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(file_name)
            .mime_str(image.mime_type())?;
        let form = Form::new()
            .part("image", part)
            .text("focus", self.config.focus.as_str());

        let response = self
            .client
            .post(&self.config.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(OcrelayError::OcrUnavailable {
                message: format!(
                    "{} returned {status}: {}",
                    self.config.endpoint,
                    String::from_utf8_lossy(&body)
                ),
            });
        }

        let payload = parse_payload(&body)?;
        let mask_present = payload.mask_present;
        let text = self.select_text(payload);
        tracing::debug!(
            chars = text.chars().count(),
            mask_present,
            focus = self.config.focus.as_str(),
            "remote recognition finished"
        );
        Ok(OcrResult::remote(text, mask_present))
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Remote
    }

    fn name(&self) -> &str {
        &self.name
    }
}
