//! Default configuration constants for ocrelay.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Pixels removed from the top of a source image before OCR.
///
/// Tuned for phone screenshots where the status bar and chat header
/// occupy the first ~310 pixels.
pub const TOP_MARGIN: u32 = 310;

/// Pixels removed from the right edge of a source image before OCR.
pub const RIGHT_MARGIN: u32 = 120;

/// Fixed band removed from the bottom of every source image.
///
/// Coupled to one specific screenshot layout (input bar and keyboard chrome);
/// it is not derived from image content.
pub const BOTTOM_EXCLUSION: u32 = 950;

/// Brightness gain applied after greyscale conversion (1.0 = unchanged).
pub const BRIGHTNESS: f32 = 1.0;

/// Gain applied to the corrected colour channel.
pub const CHANNEL_GAIN: f32 = 0.3;

/// Recognition languages (Tesseract language codes).
pub const OCR_LANGUAGES: &[&str] = &["eng", "rus"];

/// Characters the local engine is allowed to emit.
pub const CHAR_WHITELIST: &str = concat!(
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz",
    "АБВГДЕЁЖЗИЙКЛМНОПРСТУФХЦЧШЩЪЫЬЭЮЯабвгдеёжзийклмнопрстуфхцчшщъыьэюя",
    "0123456789",
    ".,-—:;()\"'«»…!?"
);

/// Tesseract page segmentation mode: assume a single uniform block of text.
///
/// The crop already isolates the caption region, so sparse-text modes
/// only add false positives.
pub const PAGE_SEGMENTATION_MODE: u32 = 6;

/// Default remote OCR endpoint.
pub const OCR_ENDPOINT: &str = "http://127.0.0.1:8000/ocr";

/// Remote OCR request timeout in seconds.
pub const OCR_TIMEOUT_SECS: u64 = 30;

/// OCR attempts before degrading to a "no text found" decision.
pub const OCR_ATTEMPTS: u32 = 3;

/// Initial backoff between OCR attempts in milliseconds.
pub const OCR_BACKOFF_MS: u64 = 500;

/// Punctuation kept by the text normalizer.
pub const NORMALIZER_PUNCTUATION: &str = ".,?!—";

/// Telegram Bot API base URL.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Long-poll timeout for `getUpdates` in seconds.
pub const POLL_TIMEOUT_SECS: u64 = 30;

/// Reconnect attempts before the event source is declared unreachable.
pub const RECONNECT_ATTEMPTS: u32 = 5;

/// Initial reconnect backoff in milliseconds (doubles per attempt).
pub const RECONNECT_BACKOFF_MS: u64 = 1000;

/// Upper bound for any exponential backoff.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Largest media file fetched for processing (Bot API download limit).
pub const MAX_MEDIA_BYTES: u64 = 20 * 1024 * 1024;

/// Downloads shorter than this cannot be a real photo.
pub const MIN_MEDIA_BYTES: usize = 100;

/// Sink delivery attempts before an event is logged as dropped.
pub const DELIVERY_ATTEMPTS: u32 = 3;

/// Initial backoff between delivery attempts in milliseconds.
pub const DELIVERY_BACKOFF_MS: u64 = 1000;

/// Image/OCR tasks allowed in flight at once.
pub const MAX_IN_FLIGHT: usize = 4;

/// Environment variable holding the bot token.
pub const BOT_TOKEN_ENV: &str = "OCRELAY_BOT_TOKEN";
