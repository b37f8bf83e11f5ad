//! Fetched media bytes plus the metadata sniffed from them.

use crate::error::{OcrelayError, Result};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;

const OCTET_STREAM: &str = "application/octet-stream";

/// Media bytes owned by one event's processing task.
///
/// `width`/`height` are zero for non-image media.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for MediaAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaAsset")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl MediaAsset {
    /// Wrap arbitrary media bytes, sniffing the content type.
    ///
    /// Image content is recognised from its magic bytes. Anything else keeps
    /// `mime_hint` (as reported by the source) or `application/octet-stream`.
    pub fn from_bytes(bytes: Vec<u8>, mime_hint: Option<&str>) -> Self {
        match sniff_image(&bytes) {
            Some((format, width, height)) => Self {
                bytes,
                mime_type: format.to_mime_type().to_string(),
                width,
                height,
            },
            None => Self {
                bytes,
                mime_type: mime_hint.unwrap_or(OCTET_STREAM).to_string(),
                width: 0,
                height: 0,
            },
        }
    }

    /// Wrap bytes that must be a decodable image.
    ///
    /// # Errors
    /// `InvalidMedia` when the bytes are not sniffed as an image format.
    pub fn image(bytes: Vec<u8>) -> Result<Self> {
        match sniff_image(&bytes) {
            Some((format, width, height)) => Ok(Self {
                bytes,
                mime_type: format.to_mime_type().to_string(),
                width,
                height,
            }),
            None => Err(OcrelayError::InvalidMedia {
                message: format!("unsupported content ({} bytes, not an image)", bytes.len()),
            }),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension matching the MIME type (`bin` when unknown).
    pub fn extension(&self) -> &str {
        ImageFormat::from_mime_type(&self.mime_type)
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("bin")
    }
}

/// Guess the image format from magic bytes and read its dimensions
/// without decoding pixel data.
pub(crate) fn sniff_image(bytes: &[u8]) -> Option<(ImageFormat, u32, u32)> {
    let format = image::guess_format(bytes).ok()?;
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .ok()?;
    Some((format, width, height))
}
