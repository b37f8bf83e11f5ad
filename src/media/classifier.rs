//! Media classifier: derives the [`MediaKind`] of a raw post.
//!
//! Total and side-effect free. A photo attachment wins over any other
//! attachment; any other attachment makes the post "other media"; a post
//! without attachments is text-only, even when its body is empty.

use crate::event::{AttachmentKind, MediaKind, MediaRef, RawPost};

/// Classifier output: the tag plus the reference of the media to process.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: MediaKind,
    pub media_ref: Option<MediaRef>,
}

pub fn classify(post: &RawPost) -> Classification {
    if let Some(photo) = post
        .attachments
        .iter()
        .find(|a| a.kind == AttachmentKind::Photo)
    {
        return Classification {
            kind: MediaKind::Photo,
            media_ref: Some(photo.reference.clone()),
        };
    }

    match post.attachments.first() {
        Some(other) => Classification {
            kind: MediaKind::Other,
            media_ref: Some(other.reference.clone()),
        },
        None => Classification {
            kind: MediaKind::None,
            media_ref: None,
        },
    }
}
