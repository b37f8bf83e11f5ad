//! Long-polling event source for one Telegram channel.

use crate::error::{OcrelayError, Result};
use crate::event::{Attachment, AttachmentKind, MediaRef, RawPost};
use crate::source::{EventSource, MediaFetcher};
use crate::telegram::api::{BotApi, Chat, FileAttachment, Message};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Which channel posts are accepted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelTarget {
    Id(i64),
    /// Lowercased, without the leading `@`.
    Username(String),
}

impl ChannelTarget {
    pub fn parse(channel: &str) -> Result<Self> {
        let channel = channel.trim();
        if let Ok(id) = channel.parse::<i64>() {
            return Ok(ChannelTarget::Id(id));
        }
        let name = channel.trim_start_matches('@');
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(OcrelayError::ConfigInvalidValue {
                key: "source.channel".to_string(),
                message: format!("'{channel}' is neither a chat id nor a channel username"),
            });
        }
        Ok(ChannelTarget::Username(name.to_ascii_lowercase()))
    }

    pub fn matches(&self, chat: &Chat) -> bool {
        match self {
            ChannelTarget::Id(id) => chat.id == *id,
            ChannelTarget::Username(name) => chat
                .username
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case(name)),
        }
    }
}

/// Channel identifier used on posts: `@username` when public, otherwise the id.
fn channel_name(chat: &Chat) -> String {
    match chat.username {
        Some(ref username) => format!("@{username}"),
        None => chat.id.to_string(),
    }
}

fn file_attachment(kind: AttachmentKind, file: &FileAttachment) -> Attachment {
    let mut reference = MediaRef::new(&file.file_id);
    if let Some(size) = file.file_size {
        reference = reference.with_size(size);
    }
    let attachment = Attachment::new(kind, reference);
    match file.mime_type {
        Some(ref mime) => attachment.with_mime_type(mime),
        None => attachment,
    }
}

/// Convert a Bot API channel post into a raw post.
///
/// Of the photo sizes Telegram sends, only the largest is kept.
pub fn to_raw_post(message: &Message) -> RawPost {
    let mut attachments = Vec::new();

    if let Some(photo) = message
        .photo
        .iter()
        .max_by_key(|p| (u64::from(p.width) * u64::from(p.height), p.file_size))
    {
        let mut reference = MediaRef::new(&photo.file_id);
        if let Some(size) = photo.file_size {
            reference = reference.with_size(size);
        }
        attachments.push(Attachment::photo(reference));
    }

    let files = [
        (AttachmentKind::Document, &message.document),
        (AttachmentKind::Video, &message.video),
        (AttachmentKind::Animation, &message.animation),
        (AttachmentKind::Audio, &message.audio),
        (AttachmentKind::Voice, &message.voice),
        (AttachmentKind::Sticker, &message.sticker),
        (AttachmentKind::Other("video_note".to_string()), &message.video_note),
    ];
    for (kind, file) in files {
        if let Some(file) = file {
            attachments.push(file_attachment(kind, file));
        }
    }

    RawPost {
        channel: channel_name(&message.chat),
        channel_title: message.chat.title.clone(),
        message_id: message.message_id,
        text: message.text.clone().or_else(|| message.caption.clone()),
        attachments,
    }
}

/// Resolves file ids through `getFile` and downloads the bytes.
#[derive(Debug, Clone)]
pub struct TelegramFetcher {
    api: Arc<BotApi>,
    max_bytes: u64,
}

impl TelegramFetcher {
    pub fn new(api: Arc<BotApi>, max_bytes: u64) -> Self {
        Self { api, max_bytes }
    }
}

#[async_trait]
impl MediaFetcher for TelegramFetcher {
    async fn fetch(&self, media: &MediaRef) -> Result<Vec<u8>> {
        let fetch_error = |message: String| OcrelayError::MediaFetch {
            reference: media.file_id.clone(),
            message,
        };

        let file = self
            .api
            .get_file(&media.file_id)
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        if let Some(size) = file.file_size
            && size > self.max_bytes
        {
            return Err(fetch_error(format!(
                "file is too big ({size} > {} bytes)",
                self.max_bytes
            )));
        }
        let Some(path) = file.file_path else {
            return Err(fetch_error("file is not available for download".to_string()));
        };

        let bytes = self
            .api
            .download(&path)
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        tracing::debug!(file_id = %media.file_id, bytes = bytes.len(), "media downloaded");
        Ok(bytes)
    }
}

/// `getUpdates` long-poll source.
///
/// Only `channel_post` updates from the target channel are yielded; the
/// offset advances past everything else so it is not seen again.
pub struct TelegramSource {
    api: Arc<BotApi>,
    poll_timeout: Duration,
    max_media_bytes: u64,
    target: Option<ChannelTarget>,
    offset: Option<i64>,
    pending: VecDeque<RawPost>,
}

impl TelegramSource {
    pub fn new(api: Arc<BotApi>, poll_timeout: Duration, max_media_bytes: u64) -> Self {
        Self {
            api,
            poll_timeout,
            max_media_bytes,
            target: None,
            offset: None,
            pending: VecDeque::new(),
        }
    }

    async fn poll(&mut self, target: &ChannelTarget) -> Result<()> {
        let updates = self
            .api
            .get_updates(self.offset, self.poll_timeout.as_secs())
            .await
            .map_err(|e| OcrelayError::Source {
                message: e.to_string(),
            })?;

        for update in updates {
            self.offset = Some(update.update_id + 1);
            match update.channel_post {
                Some(ref message) if target.matches(&message.chat) => {
                    self.pending.push_back(to_raw_post(message));
                }
                Some(ref message) => {
                    tracing::trace!(chat_id = message.chat.id, "ignoring post from other chat");
                }
                None => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventSource for TelegramSource {
    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        let target = ChannelTarget::parse(channel)?;
        let me = self.api.get_me().await.map_err(|e| OcrelayError::Source {
            message: e.to_string(),
        })?;
        tracing::info!(
            bot = me.username.as_deref().unwrap_or(&me.first_name),
            channel,
            "listening for channel posts"
        );
        self.target = Some(target);
        Ok(())
    }

    async fn next_post(&mut self) -> Result<Option<RawPost>> {
        let Some(target) = self.target.clone() else {
            return Err(OcrelayError::Source {
                message: "not subscribed".to_string(),
            });
        };
        loop {
            if let Some(post) = self.pending.pop_front() {
                return Ok(Some(post));
            }
            self.poll(&target).await?;
        }
    }

    fn fetcher(&self) -> Arc<dyn MediaFetcher> {
        Arc::new(TelegramFetcher::new(
            Arc::clone(&self.api),
            self.max_media_bytes,
        ))
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
