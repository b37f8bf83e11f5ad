//! Forwarding policy: picks the single payload relayed for each event.
//!
//! Total over every reachable pipeline state. There is no drop branch; a post
//! that cannot be processed still produces a fallback payload.

use crate::event::MediaKind;
use crate::media::{MediaAsset, ProcessedImage};
use std::fmt;

/// The tagged payload handed to the sink. Exactly one per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardingDecision {
    ForwardText(String),
    ForwardMedia(MediaAsset),
    ForwardTextAndMedia(String, MediaAsset),
    NoTextFound(MediaAsset),
}

impl ForwardingDecision {
    pub fn label(&self) -> &'static str {
        match self {
            ForwardingDecision::ForwardText(_) => "forward_text",
            ForwardingDecision::ForwardMedia(_) => "forward_media",
            ForwardingDecision::ForwardTextAndMedia(..) => "forward_text_and_media",
            ForwardingDecision::NoTextFound(_) => "no_text_found",
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ForwardingDecision::ForwardText(text)
            | ForwardingDecision::ForwardTextAndMedia(text, _) => Some(text),
            ForwardingDecision::ForwardMedia(_) | ForwardingDecision::NoTextFound(_) => None,
        }
    }

    pub fn media(&self) -> Option<&MediaAsset> {
        match self {
            ForwardingDecision::ForwardText(_) => None,
            ForwardingDecision::ForwardMedia(media)
            | ForwardingDecision::ForwardTextAndMedia(_, media)
            | ForwardingDecision::NoTextFound(media) => Some(media),
        }
    }
}

impl fmt::Display for ForwardingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the photo branch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrOutcome {
    /// Normalized text, non-empty, plus the image it was read from.
    Text {
        normalized: String,
        processed: ProcessedImage,
    },
    /// OCR ran but nothing survived normalization.
    Empty,
    /// The OCR backend failed after retries.
    Failed { reason: String },
    /// The transform rejected the image (invalid media or crop geometry).
    Untransformable { reason: String },
}

impl OcrOutcome {
    /// Build the outcome from normalized text, mapping blank text to `Empty`.
    pub fn from_text(normalized: String, processed: ProcessedImage) -> Self {
        if normalized.trim().is_empty() {
            OcrOutcome::Empty
        } else {
            OcrOutcome::Text {
                normalized,
                processed,
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OcrOutcome::Text { .. } => "text",
            OcrOutcome::Empty => "empty",
            OcrOutcome::Failed { .. } => "failed",
            OcrOutcome::Untransformable { .. } => "untransformable",
        }
    }
}

/// Everything the policy needs to decide, one variant per pipeline branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyInput {
    TextOnly {
        body: String,
    },
    OtherMedia {
        original: MediaAsset,
    },
    Photo {
        original: MediaAsset,
        outcome: OcrOutcome,
    },
    /// The media could not be fetched, so neither branch could run.
    MediaUnavailable {
        kind: MediaKind,
        body: String,
        reason: String,
    },
}

/// Policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForwardingPolicy {
    /// Relay recognized text together with the processed image.
    pub attach_processed_image: bool,
}

impl ForwardingPolicy {
    pub fn new(attach_processed_image: bool) -> Self {
        Self {
            attach_processed_image,
        }
    }

    pub fn decide(&self, input: PolicyInput) -> ForwardingDecision {
        match input {
            PolicyInput::TextOnly { body } => ForwardingDecision::ForwardText(body),
            PolicyInput::OtherMedia { original } => ForwardingDecision::ForwardMedia(original),
            PolicyInput::Photo { original, outcome } => match outcome {
                OcrOutcome::Text {
                    normalized,
                    processed,
                } => {
                    if self.attach_processed_image {
                        ForwardingDecision::ForwardTextAndMedia(normalized, processed.into_asset())
                    } else {
                        ForwardingDecision::ForwardText(normalized)
                    }
                }
                OcrOutcome::Empty | OcrOutcome::Failed { .. } => {
                    ForwardingDecision::NoTextFound(original)
                }
                OcrOutcome::Untransformable { .. } => ForwardingDecision::ForwardMedia(original),
            },
            PolicyInput::MediaUnavailable { kind, body, reason } => {
                ForwardingDecision::ForwardText(unavailable_notice(kind, &body, &reason))
            }
        }
    }
}

fn unavailable_notice(kind: MediaKind, body: &str, reason: &str) -> String {
    let what = match kind {
        MediaKind::Photo => "photo",
        MediaKind::Other | MediaKind::None => "media",
    };
    if body.trim().is_empty() {
        format!("[{what} could not be downloaded: {reason}]")
    } else {
        format!("[{what} could not be downloaded: {reason}]\n\n{body}")
    }
}
