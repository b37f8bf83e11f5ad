//! In-process event source fed through a tokio channel.
//!
//! Used by tests and by `ocrelay scan`-style tooling: posts are pushed by the
//! caller, media lives in memory, and connect failures or disconnects can be
//! scripted.

use crate::error::{OcrelayError, Result};
use crate::event::{MediaRef, RawPost};
use crate::source::{EventSource, MediaFetcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// One scripted item on the channel.
#[derive(Debug, Clone)]
pub enum SourceItem {
    Post(RawPost),
    /// Simulated transport drop; the next `next_post` returns `Err(Source)`.
    Disconnect(String),
}

/// Media store keyed by `file_id`.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    media: RwLock<HashMap<String, Vec<u8>>>,
    delay: Option<Duration>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file_id: impl Into<String>, bytes: Vec<u8>) {
        if let Ok(mut media) = self.media.write() {
            media.insert(file_id.into(), bytes);
        }
    }
}

#[async_trait]
impl MediaFetcher for MemoryFetcher {
    async fn fetch(&self, media: &MediaRef) -> Result<Vec<u8>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let store = self.media.read().map_err(|_| OcrelayError::MediaFetch {
            reference: media.file_id.clone(),
            message: "media store lock poisoned".to_string(),
        })?;
        store
            .get(&media.file_id)
            .cloned()
            .ok_or_else(|| OcrelayError::MediaFetch {
                reference: media.file_id.clone(),
                message: "no such file".to_string(),
            })
    }
}

/// Event source backed by an mpsc receiver.
pub struct ChannelEventSource {
    rx: mpsc::Receiver<SourceItem>,
    fetcher: Arc<MemoryFetcher>,
    connect_failures: u32,
    subscribes: Arc<AtomicU32>,
    connected: bool,
}

impl ChannelEventSource {
    /// Create a source and the sender that feeds it.
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<SourceItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let source = Self {
            rx,
            fetcher: Arc::new(MemoryFetcher::new()),
            connect_failures: 0,
            subscribes: Arc::new(AtomicU32::new(0)),
            connected: false,
        };
        (source, tx)
    }

    /// A source that yields `items` and then ends.
    pub fn scripted(items: Vec<SourceItem>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity equals the item count, so this never fails.
            if tx.try_send(item).is_err() {
                break;
            }
        }
        Self {
            rx,
            fetcher: Arc::new(MemoryFetcher::new()),
            connect_failures: 0,
            subscribes: Arc::new(AtomicU32::new(0)),
            connected: false,
        }
    }

    /// Register media bytes under `file_id`.
    pub fn with_media(self, file_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.fetcher.insert(file_id, bytes);
        self
    }

    /// Delay every media fetch.
    ///
    /// Must be called before the fetcher is shared.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        if let Some(fetcher) = Arc::get_mut(&mut self.fetcher) {
            fetcher.delay = Some(delay);
        }
        self
    }

    /// Fail the next `count` subscribe attempts.
    pub fn with_connect_failures(mut self, count: u32) -> Self {
        self.connect_failures = count;
        self
    }

    /// Counter of subscribe calls, readable after the source is moved.
    pub fn subscribe_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.subscribes)
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(OcrelayError::Source {
                message: format!("scripted connect failure for {channel}"),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn next_post(&mut self) -> Result<Option<RawPost>> {
        if !self.connected {
            return Err(OcrelayError::Source {
                message: "not subscribed".to_string(),
            });
        }
        match self.rx.recv().await {
            Some(SourceItem::Post(post)) => Ok(Some(post)),
            Some(SourceItem::Disconnect(reason)) => {
                self.connected = false;
                Err(OcrelayError::Source { message: reason })
            }
            None => Ok(None),
        }
    }

    fn fetcher(&self) -> Arc<dyn MediaFetcher> {
        self.fetcher.clone()
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
