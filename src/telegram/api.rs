//! Minimal Telegram Bot API client.
//!
//! Every method is a JSON `POST /bot<token>/<method>` except file uploads
//! (multipart) and file downloads (`GET /file/bot<token>/<path>`).
//! The token is part of every URL, so transport errors are stripped of their
//! URL before they are returned.

use crate::error::{OcrelayError, Result};
use crate::media::MediaAsset;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

/// Attempts for a call answered with 429 before giving up.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// `sendMessage` text limit (characters).
pub const MESSAGE_LIMIT: usize = 4096;

/// Photo/document caption limit (characters).
pub const CAPTION_LIMIT: usize = 1024;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    pub file_size: Option<u64>,
}

/// Any non-photo file attachment (document, video, voice, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct FileAttachment {
    pub file_id: String,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Vec<PhotoSize>,
    pub document: Option<FileAttachment>,
    pub video: Option<FileAttachment>,
    pub animation: Option<FileAttachment>,
    pub audio: Option<FileAttachment>,
    pub voice: Option<FileAttachment>,
    pub sticker: Option<FileAttachment>,
    pub video_note: Option<FileAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub channel_post: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    pub file_size: Option<u64>,
    pub file_path: Option<String>,
}

/// Bot API client bound to one token.
#[derive(Clone)]
pub struct BotApi {
    client: Client,
    base: String,
    token: String,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi")
            .field("base", &self.base)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl BotApi {
    /// `timeout` bounds every request, so it must exceed the long-poll timeout.
    pub fn new(base: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OcrelayError::Http(e.without_url()))?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base, self.token, method)
    }

    /// JSON call with 429 handling.
    async fn call<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T> {
        let url = self.method_url(method);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| OcrelayError::Http(e.without_url()))?;

            match parse_response(method, response).await {
                Err(ApiFailure::RateLimited(retry_after)) if attempts < MAX_RATE_LIMIT_RETRIES => {
                    let wait = retry_after.unwrap_or(Duration::from_secs(1));
                    tracing::debug!(
                        method,
                        attempt = attempts,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(failure) => return Err(failure.into_error(method)),
                Ok(result) => return Ok(result),
            }
        }
    }

    async fn call_multipart<T: DeserializeOwned>(&self, method: &str, form: Form) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| OcrelayError::Http(e.without_url()))?;
        parse_response(method, response)
            .await
            .map_err(|failure| failure.into_error(method))
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &json!({})).await
    }

    /// Long-poll for channel posts after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut payload = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["channel_post"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        self.call("getUpdates", &payload).await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File> {
        self.call("getFile", &json!({ "file_id": file_id })).await
    }

    /// Download a file previously resolved with [`get_file`](Self::get_file).
    pub async fn download(&self, file_path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/file/bot{}/{}", self.base, self.token, file_path);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OcrelayError::Http(e.without_url()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(OcrelayError::Other(format!("file download failed: HTTP {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OcrelayError::Http(e.without_url()))?;
        Ok(bytes.to_vec())
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<Message> {
        let payload = json!({
            "chat_id": chat_ref(chat_id),
            "text": truncate_message(text, MESSAGE_LIMIT),
        });
        self.call("sendMessage", &payload).await
    }

    pub async fn forward_message(
        &self,
        chat_id: &str,
        from_chat_id: &str,
        message_id: i64,
    ) -> Result<Message> {
        let payload = json!({
            "chat_id": chat_ref(chat_id),
            "from_chat_id": chat_ref(from_chat_id),
            "message_id": message_id,
        });
        self.call("forwardMessage", &payload).await
    }

    pub async fn send_photo(
        &self,
        chat_id: &str,
        image: &MediaAsset,
        caption: &str,
    ) -> Result<Message> {
        let form = upload_form(chat_id, "photo", image, caption)?;
        self.call_multipart("sendPhoto", form).await
    }

    pub async fn send_document(
        &self,
        chat_id: &str,
        file: &MediaAsset,
        caption: &str,
    ) -> Result<Message> {
        let form = upload_form(chat_id, "document", file, caption)?;
        self.call_multipart("sendDocument", form).await
    }
}

fn upload_form(chat_id: &str, field: &'static str, asset: &MediaAsset, caption: &str) -> Result<Form> {
    let part = Part::bytes(asset.bytes.clone())
        .file_name(format!("{field}.{}", asset.extension()))
        .mime_str(&asset.mime_type)?;
    Ok(Form::new()
        .text("chat_id", chat_id.to_string())
        .text("caption", truncate_message(caption, CAPTION_LIMIT))
        .part(field, part))
}

enum ApiFailure {
    RateLimited(Option<Duration>),
    Rejected { status: u16, description: String },
    Malformed(String),
}

impl ApiFailure {
    fn into_error(self, method: &str) -> OcrelayError {
        match self {
            ApiFailure::RateLimited(_) => {
                OcrelayError::Other(format!("{method}: rate limit exceeded after {MAX_RATE_LIMIT_RETRIES} attempts"))
            }
            ApiFailure::Rejected {
                status,
                description,
            } => OcrelayError::Other(format!("{method} failed ({status}): {description}")),
            ApiFailure::Malformed(message) => {
                OcrelayError::Other(format!("{method}: malformed response: {message}"))
            }
        }
    }
}

async fn parse_response<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> std::result::Result<T, ApiFailure> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiFailure::Malformed(e.without_url().to_string()))?;

    let parsed: ApiResponse<T> = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => return Err(ApiFailure::Malformed(e.to_string())),
        Err(_) => {
            return Err(ApiFailure::Rejected {
                status: status.as_u16(),
                description: String::from_utf8_lossy(&body).chars().take(200).collect(),
            });
        }
    };

    if parsed.ok
        && let Some(result) = parsed.result
    {
        return Ok(result);
    }

    let code = parsed.error_code.unwrap_or(status.as_u16());
    if code == 429 {
        let retry_after = parsed
            .parameters
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs);
        return Err(ApiFailure::RateLimited(retry_after));
    }

    tracing::debug!(method, code, "Bot API call rejected");
    Err(ApiFailure::Rejected {
        status: code,
        description: parsed
            .description
            .unwrap_or_else(|| "no description".to_string()),
    })
}

/// Numeric chat ids go out as numbers, `@username` as strings.
fn chat_ref(chat: &str) -> Value {
    match chat.parse::<i64>() {
        Ok(id) => json!(id),
        Err(_) => json!(chat),
    }
}

/// Truncate to the Bot API character limit.
pub fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit.saturating_sub(suffix.chars().count());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}
