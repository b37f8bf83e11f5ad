use crate::defaults;
use crate::error::OcrelayError;
use crate::media::{ColorChannel, CropSpec, ImageTransform, MediaArchive, PhotometricSpec};
use crate::ocr::{EngineKind, OcrFocus, OcrOptions, RemoteConfig, TesseractConfig};
use crate::pipeline::{ForwardingPolicy, PipelineSettings, RetryPolicy};
use crate::text::{NormalizerConfig, TextNormalizer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub crop: CropConfig,
    pub photometric: PhotometricConfig,
    pub ocr: OcrConfig,
    pub normalize: NormalizerConfig,
    pub pipeline: PipelineConfig,
    pub archive: ArchiveConfig,
}

/// Monitored channel and Bot API connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    /// `@username` or numeric chat id
    pub channel: String,
    pub api_base: String,
    pub poll_timeout_secs: u64,
    pub reconnect_attempts: u32,
    pub reconnect_backoff_ms: u64,
    pub max_media_bytes: u64,
    pub min_media_bytes: usize,
}

/// Where forwarding decisions go
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Telegram,
    Stdout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,
    /// Collection chat for the Telegram sink
    pub chat_id: String,
    pub delivery_attempts: u32,
    pub delivery_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CropConfig {
    pub top_margin: u32,
    pub right_margin: u32,
    pub bottom_exclusion: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhotometricConfig {
    pub brightness: f32,
    pub channel: ColorChannel,
    pub channel_gain: f32,
}

/// OCR backend selection and parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrConfig {
    pub backend: EngineKind,
    pub languages: Vec<String>,
    pub char_whitelist: String,
    pub page_segmentation_mode: u32,
    pub tessdata_dir: Option<PathBuf>,
    pub endpoint: String,
    pub focus: OcrFocus,
    pub timeout_secs: u64,
    pub attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_in_flight: usize,
    pub attach_processed_image: bool,
}

/// Optional image archive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ArchiveConfig {
    pub dir: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            api_base: defaults::TELEGRAM_API_BASE.to_string(),
            poll_timeout_secs: defaults::POLL_TIMEOUT_SECS,
            reconnect_attempts: defaults::RECONNECT_ATTEMPTS,
            reconnect_backoff_ms: defaults::RECONNECT_BACKOFF_MS,
            max_media_bytes: defaults::MAX_MEDIA_BYTES,
            min_media_bytes: defaults::MIN_MEDIA_BYTES,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Telegram,
            chat_id: String::new(),
            delivery_attempts: defaults::DELIVERY_ATTEMPTS,
            delivery_backoff_ms: defaults::DELIVERY_BACKOFF_MS,
        }
    }
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            top_margin: defaults::TOP_MARGIN,
            right_margin: defaults::RIGHT_MARGIN,
            bottom_exclusion: defaults::BOTTOM_EXCLUSION,
        }
    }
}

impl Default for PhotometricConfig {
    fn default() -> Self {
        Self {
            brightness: defaults::BRIGHTNESS,
            channel: ColorChannel::Green,
            channel_gain: defaults::CHANNEL_GAIN,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: EngineKind::Local,
            languages: defaults::OCR_LANGUAGES
                .iter()
                .map(|l| l.to_string())
                .collect(),
            char_whitelist: defaults::CHAR_WHITELIST.to_string(),
            page_segmentation_mode: defaults::PAGE_SEGMENTATION_MODE,
            tessdata_dir: None,
            endpoint: defaults::OCR_ENDPOINT.to_string(),
            focus: OcrFocus::Full,
            timeout_secs: defaults::OCR_TIMEOUT_SECS,
            attempts: defaults::OCR_ATTEMPTS,
            backoff_ms: defaults::OCR_BACKOFF_MS,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: defaults::MAX_IN_FLIGHT,
            attach_processed_image: false,
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> OcrelayError {
    OcrelayError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only a missing file yields defaults; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - OCRELAY_CHANNEL → source.channel
    /// - OCRELAY_SINK_CHAT → sink.chat_id
    /// - OCRELAY_OCR_BACKEND → ocr.backend (`local` | `remote`)
    /// - OCRELAY_OCR_ENDPOINT → ocr.endpoint
    ///
    /// The bot token (OCRELAY_BOT_TOKEN) is read by the credential provider,
    /// never stored here.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(channel) = std::env::var("OCRELAY_CHANNEL")
            && !channel.is_empty()
        {
            self.source.channel = channel;
        }

        if let Ok(chat) = std::env::var("OCRELAY_SINK_CHAT")
            && !chat.is_empty()
        {
            self.sink.chat_id = chat;
        }

        if let Ok(backend) = std::env::var("OCRELAY_OCR_BACKEND")
            && !backend.is_empty()
        {
            match backend.to_ascii_lowercase().as_str() {
                "local" => self.ocr.backend = EngineKind::Local,
                "remote" => self.ocr.backend = EngineKind::Remote,
                other => tracing::warn!(value = other, "ignoring unknown OCRELAY_OCR_BACKEND"),
            }
        }

        if let Ok(endpoint) = std::env::var("OCRELAY_OCR_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.ocr.endpoint = endpoint;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/ocrelay/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ocrelay")
            .join("config.toml")
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values no component can run with.
    ///
    /// Channel and chat ids are checked where they are needed, so a fresh
    /// default config still validates.
    pub fn validate(&self) -> Result<(), OcrelayError> {
        if self.pipeline.max_in_flight == 0 {
            return Err(invalid("pipeline.max_in_flight", "must be at least 1"));
        }
        for (key, value) in [
            ("source.reconnect_attempts", self.source.reconnect_attempts),
            ("sink.delivery_attempts", self.sink.delivery_attempts),
            ("ocr.attempts", self.ocr.attempts),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be at least 1"));
            }
        }
        if self.ocr.timeout_secs == 0 {
            return Err(invalid("ocr.timeout_secs", "must be at least 1"));
        }
        if self.ocr.languages.is_empty() || self.ocr.languages.iter().any(|l| l.trim().is_empty()) {
            return Err(invalid("ocr.languages", "at least one non-empty language is required"));
        }
        if self.ocr.page_segmentation_mode > 13 {
            return Err(invalid(
                "ocr.page_segmentation_mode",
                format!("{} is not a Tesseract mode (0-13)", self.ocr.page_segmentation_mode),
            ));
        }
        if self.ocr.backend == EngineKind::Remote {
            reqwest::Url::parse(&self.ocr.endpoint)
                .map_err(|e| invalid("ocr.endpoint", format!("{}: {e}", self.ocr.endpoint)))?;
        }
        for (key, gain) in [
            ("photometric.brightness", self.photometric.brightness),
            ("photometric.channel_gain", self.photometric.channel_gain),
        ] {
            if !gain.is_finite() || gain <= 0.0 {
                return Err(invalid(key, format!("{gain} must be a positive number")));
            }
        }
        if self.source.min_media_bytes as u64 > self.source.max_media_bytes {
            return Err(invalid(
                "source.min_media_bytes",
                "must not exceed source.max_media_bytes",
            ));
        }
        self.normalize.validate()
    }

    pub fn crop_spec(&self) -> CropSpec {
        CropSpec {
            top_margin: self.crop.top_margin,
            right_margin: self.crop.right_margin,
            bottom_exclusion: self.crop.bottom_exclusion,
        }
    }

    pub fn photometric_spec(&self) -> PhotometricSpec {
        PhotometricSpec {
            brightness: self.photometric.brightness,
            channel: self.photometric.channel,
            channel_gain: self.photometric.channel_gain,
        }
    }

    pub fn image_transform(&self) -> ImageTransform {
        ImageTransform::new(self.crop_spec(), self.photometric_spec())
    }

    pub fn ocr_options(&self) -> OcrOptions {
        OcrOptions {
            languages: self.ocr.languages.clone(),
            char_whitelist: self.ocr.char_whitelist.clone(),
        }
    }

    pub fn tesseract_config(&self) -> TesseractConfig {
        TesseractConfig {
            tessdata_dir: self.ocr.tessdata_dir.clone(),
            page_segmentation_mode: self.ocr.page_segmentation_mode,
        }
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            endpoint: self.ocr.endpoint.clone(),
            focus: self.ocr.focus,
            timeout: self.ocr_timeout(),
        }
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr.timeout_secs)
    }

    pub fn archive(&self) -> Option<MediaArchive> {
        self.archive.dir.as_ref().map(MediaArchive::new)
    }

    /// Validate and freeze into runtime settings.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings, OcrelayError> {
        self.validate()?;
        let ocr_retry = RetryPolicy::new(self.ocr.attempts, Duration::from_millis(self.ocr.backoff_ms));
        Ok(PipelineSettings {
            channel: self.source.channel.clone(),
            transform: self.image_transform(),
            normalizer: TextNormalizer::new(self.normalize.clone())?,
            ocr_options: self.ocr_options(),
            ocr_timeout: self.ocr_timeout(),
            ocr_retry,
            fetch_retry: ocr_retry,
            reconnect: RetryPolicy::new(
                self.source.reconnect_attempts,
                Duration::from_millis(self.source.reconnect_backoff_ms),
            ),
            delivery_retry: RetryPolicy::new(
                self.sink.delivery_attempts,
                Duration::from_millis(self.sink.delivery_backoff_ms),
            ),
            policy: ForwardingPolicy::new(self.pipeline.attach_processed_image),
            max_in_flight: self.pipeline.max_in_flight,
            min_media_bytes: self.source.min_media_bytes,
            max_media_bytes: self.source.max_media_bytes,
        })
    }
}
