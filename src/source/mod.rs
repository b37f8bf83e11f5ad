//! Event source seam: where raw posts and their media come from.

pub mod channel;
pub mod credentials;

pub use channel::{ChannelEventSource, MemoryFetcher, SourceItem};
pub use credentials::{CredentialProvider, EnvCredentials, StaticCredentials};

use crate::error::Result;
use crate::event::{MediaRef, RawPost};
use async_trait::async_trait;
use std::sync::Arc;

/// Ordered stream of posts from one monitored channel.
///
/// Owned exclusively by the orchestrator. A transient disconnect surfaces as
/// `Err(Source)` from [`next_post`](EventSource::next_post); the orchestrator
/// then calls [`subscribe`](EventSource::subscribe) again under its retry budget.
#[async_trait]
pub trait EventSource: Send {
    /// (Re)establish the subscription to `channel`.
    async fn subscribe(&mut self, channel: &str) -> Result<()>;

    /// Next post in arrival order. `Ok(None)` means the stream has ended.
    async fn next_post(&mut self) -> Result<Option<RawPost>>;

    /// Fetcher for media referenced by this source's posts.
    fn fetcher(&self) -> Arc<dyn MediaFetcher>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "source"
    }
}

/// Downloads the bytes behind a [`MediaRef`]. Shared by concurrent event tasks.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, media: &MediaRef) -> Result<Vec<u8>>;
}
