//! Inbound post types.
//!
//! An [`EventSource`](crate::source::EventSource) yields [`RawPost`]s exactly as the
//! channel delivered them. The classifier turns each one into an immutable
//! [`InboundEvent`] that the orchestrator consumes exactly once.

use crate::media::classifier;
use std::fmt;

/// Opaque reference to a media file held by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRef {
    /// Source-specific file identifier (a Bot API `file_id`).
    pub file_id: String,
    /// Size advertised by the source, if known.
    pub size: Option<u64>,
}

impl MediaRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_id)
    }
}

/// Kind of binary attachment carried by a raw post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentKind {
    Photo,
    Document,
    Video,
    Animation,
    Audio,
    Voice,
    Sticker,
    Other(String),
}

/// A binary attachment on a raw post.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub reference: MediaRef,
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn photo(reference: MediaRef) -> Self {
        Self {
            kind: AttachmentKind::Photo,
            reference,
            mime_type: Some("image/jpeg".to_string()),
        }
    }

    pub fn new(kind: AttachmentKind, reference: MediaRef) -> Self {
        Self {
            kind,
            reference,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// A post as delivered by the event source, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPost {
    /// Channel identifier (numeric chat id or `@username`).
    pub channel: String,
    /// Human-readable channel title, if the source knows it.
    pub channel_title: Option<String>,
    pub message_id: i64,
    /// Text body or media caption.
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl RawPost {
    pub fn text(channel: impl Into<String>, message_id: i64, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            channel_title: None,
            message_id,
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(
        channel: impl Into<String>,
        message_id: i64,
        attachment: Attachment,
    ) -> Self {
        Self {
            channel: channel.into(),
            channel_title: None,
            message_id,
            text: None,
            attachments: vec![attachment],
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.text = Some(caption.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.channel_title = Some(title.into());
        self
    }
}

/// Classifier tag for an inbound post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// No binary media; the post is its text body.
    None,
    /// A photo, routed through transform and OCR.
    Photo,
    /// Any other media, relayed untouched.
    Other,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::None => "text-only",
            MediaKind::Photo => "photo",
            MediaKind::Other => "other-media",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an event, carried alongside its forwarding decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub channel: String,
    pub channel_title: Option<String>,
    pub message_id: i64,
}

impl EventMeta {
    /// Title for display, falling back to the channel identifier.
    pub fn display_name(&self) -> &str {
        self.channel_title.as_deref().unwrap_or(&self.channel)
    }
}

/// A classified post. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub source_channel: String,
    pub channel_title: Option<String>,
    pub message_id: i64,
    pub text: Option<String>,
    pub media_kind: MediaKind,
    pub raw_media_ref: Option<MediaRef>,
}

impl InboundEvent {
    /// Classify a raw post.
    pub fn from_post(post: RawPost) -> Self {
        let classification = classifier::classify(&post);
        Self {
            source_channel: post.channel,
            channel_title: post.channel_title,
            message_id: post.message_id,
            text: post.text,
            media_kind: classification.kind,
            raw_media_ref: classification.media_ref,
        }
    }

    pub fn meta(&self) -> EventMeta {
        EventMeta {
            channel: self.source_channel.clone(),
            channel_title: self.channel_title.clone(),
            message_id: self.message_id,
        }
    }

    /// Text body, or an empty string for posts without one.
    pub fn body(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}
