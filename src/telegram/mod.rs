//! Telegram Bot API adapters: channel-post source, media fetcher and sink.

pub mod api;
pub mod sink;
pub mod source;

pub use api::BotApi;
pub use sink::TelegramSink;
pub use source::{ChannelTarget, TelegramFetcher, TelegramSource};
