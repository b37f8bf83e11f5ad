//! Event pipeline that runs from subscription until the source ends or shutdown.
//!
//! Source → classify → (photo) transform → OCR → normalize → policy → sink.
//! Each post runs in its own task; a semaphore bounds how many are in flight,
//! and the next post is only read once a slot is free.

use crate::defaults;
use crate::error::{OcrelayError, Result};
use crate::event::{EventMeta, InboundEvent, MediaKind, MediaRef};
use crate::media::{ArchiveKind, ImageTransform, MediaArchive, MediaAsset, ProcessedImage};
use crate::ocr::{OcrEngine, OcrOptions, OcrResult};
use crate::pipeline::policy::{ForwardingDecision, ForwardingPolicy, OcrOutcome, PolicyInput};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::sink::{Delivery, Sink};
use crate::pipeline::stats::{RunStats, RunSummary};
use crate::source::{EventSource, MediaFetcher};
use crate::text::TextNormalizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Immutable runtime settings, built once from the configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Channel to subscribe to.
    pub channel: String,
    pub transform: ImageTransform,
    pub normalizer: TextNormalizer,
    pub ocr_options: OcrOptions,
    /// Per-attempt OCR deadline.
    pub ocr_timeout: Duration,
    pub ocr_retry: RetryPolicy,
    pub fetch_retry: RetryPolicy,
    pub reconnect: RetryPolicy,
    pub delivery_retry: RetryPolicy,
    pub policy: ForwardingPolicy,
    /// Events processed concurrently; reading pauses when all slots are taken.
    pub max_in_flight: usize,
    /// Fetched photos shorter than this are treated as invalid media.
    pub min_media_bytes: usize,
    pub max_media_bytes: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            channel: String::new(),
            transform: ImageTransform::default(),
            normalizer: TextNormalizer::default(),
            ocr_options: OcrOptions::default(),
            ocr_timeout: Duration::from_secs(defaults::OCR_TIMEOUT_SECS),
            ocr_retry: RetryPolicy::new(
                defaults::OCR_ATTEMPTS,
                Duration::from_millis(defaults::OCR_BACKOFF_MS),
            ),
            fetch_retry: RetryPolicy::new(
                defaults::OCR_ATTEMPTS,
                Duration::from_millis(defaults::OCR_BACKOFF_MS),
            ),
            reconnect: RetryPolicy::new(
                defaults::RECONNECT_ATTEMPTS,
                Duration::from_millis(defaults::RECONNECT_BACKOFF_MS),
            ),
            delivery_retry: RetryPolicy::new(
                defaults::DELIVERY_ATTEMPTS,
                Duration::from_millis(defaults::DELIVERY_BACKOFF_MS),
            ),
            policy: ForwardingPolicy::default(),
            max_in_flight: defaults::MAX_IN_FLIGHT,
            min_media_bytes: defaults::MIN_MEDIA_BYTES,
            max_media_bytes: defaults::MAX_MEDIA_BYTES,
        }
    }
}

/// Per-event processing stage, in the order one event passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classified(MediaKind),
    Fetched,
    Transformed,
    Recognized,
    Normalized,
    Decided(&'static str),
    Delivered,
    Dropped,
}

/// Progress notification published to an optional observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEvent {
    pub message_id: i64,
    pub stage: Stage,
}

/// Optional, non-blocking stage observer.
#[derive(Debug, Clone, Default)]
pub struct StageObserver {
    tx: Option<mpsc::UnboundedSender<StageEvent>>,
}

impl StageObserver {
    pub fn new(tx: mpsc::UnboundedSender<StageEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    fn emit(&self, message_id: i64, stage: Stage) {
        if let Some(ref tx) = self.tx
            && tx.send(StageEvent { message_id, stage }).is_err()
        {
            // Receiver dropped - observing is optional
        }
    }
}

/// Turns one inbound event into exactly one forwarding decision.
///
/// Never fails: every stage error is mapped onto a policy input.
#[derive(Clone)]
pub struct EventProcessor {
    settings: PipelineSettings,
    engine: Arc<dyn OcrEngine>,
    archive: Option<MediaArchive>,
    observer: StageObserver,
    stats: Arc<RunStats>,
    /// One permit per running engine call, released when the engine returns.
    ocr_slots: Arc<Semaphore>,
}

impl EventProcessor {
    pub fn new(settings: PipelineSettings, engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            ocr_slots: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
            settings,
            engine,
            archive: None,
            observer: StageObserver::default(),
            stats: Arc::new(RunStats::new()),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn process(
        &self,
        event: &InboundEvent,
        fetcher: &dyn MediaFetcher,
    ) -> ForwardingDecision {
        let id = event.message_id;
        self.observer.emit(id, Stage::Classified(event.media_kind));
        tracing::debug!(kind = %event.media_kind, "classified");

        let input = match (event.media_kind, &event.raw_media_ref) {
            (MediaKind::None, _) => PolicyInput::TextOnly {
                body: event.body().to_string(),
            },
            (kind, None) => {
                self.stats.record_fallback();
                PolicyInput::MediaUnavailable {
                    kind,
                    body: event.body().to_string(),
                    reason: "post has no media reference".to_string(),
                }
            }
            (kind, Some(media)) => match self.fetch(media, fetcher).await {
                Err(e) => {
                    tracing::warn!(error = %e, "media fetch failed, relaying post text only");
                    self.stats.record_fallback();
                    PolicyInput::MediaUnavailable {
                        kind,
                        body: event.body().to_string(),
                        reason: e.to_string(),
                    }
                }
                Ok(bytes) => {
                    self.observer.emit(id, Stage::Fetched);
                    let original = MediaAsset::from_bytes(bytes, None);
                    if kind == MediaKind::Photo {
                        let outcome = self.photo_outcome(id, &original).await;
                        PolicyInput::Photo { original, outcome }
                    } else {
                        PolicyInput::OtherMedia { original }
                    }
                }
            },
        };

        let decision = self.settings.policy.decide(input);
        self.observer.emit(id, Stage::Decided(decision.label()));
        tracing::debug!(decision = decision.label(), "decided");
        decision
    }

    async fn fetch(&self, media: &MediaRef, fetcher: &dyn MediaFetcher) -> Result<Vec<u8>> {
        let max = self.settings.max_media_bytes;
        if let Some(size) = media.size
            && size > max
        {
            return Err(OcrelayError::MediaFetch {
                reference: media.file_id.clone(),
                message: format!("file is too big ({size} > {max} bytes)"),
            });
        }

        let bytes = self
            .settings
            .fetch_retry
            .run("media fetch", |_| fetcher.fetch(media))
            .await?;

        if bytes.len() as u64 > max {
            return Err(OcrelayError::MediaFetch {
                reference: media.file_id.clone(),
                message: format!("file is too big ({} > {max} bytes)", bytes.len()),
            });
        }
        Ok(bytes)
    }

    /// Transform, recognize and normalize one fetched photo.
    pub async fn photo_outcome(&self, message_id: i64, original: &MediaAsset) -> OcrOutcome {
        if original.len() < self.settings.min_media_bytes || !original.is_image() {
            let e = OcrelayError::InvalidMedia {
                message: format!(
                    "{} bytes of {} is not a usable photo",
                    original.len(),
                    original.mime_type
                ),
            };
            tracing::warn!(error = %e, "forwarding original media");
            self.stats.record_fallback();
            return OcrOutcome::Untransformable {
                reason: e.to_string(),
            };
        }

        let processed = match self.transform(original).await {
            Ok(processed) => processed,
            Err(e) => {
                tracing::warn!(error = %e, "image transform failed, forwarding original media");
                self.stats.record_fallback();
                return OcrOutcome::Untransformable {
                    reason: e.to_string(),
                };
            }
        };
        self.observer.emit(message_id, Stage::Transformed);
        tracing::debug!(
            width = processed.width(),
            height = processed.height(),
            "transformed"
        );
        self.archive_images(message_id, original, &processed).await;

        let result = self
            .settings
            .ocr_retry
            .run("ocr", |_| self.recognize_once(&processed))
            .await;
        self.observer.emit(message_id, Stage::Recognized);

        match result {
            Ok(recognized) => {
                let normalized = self.settings.normalizer.normalize(&recognized.raw_text);
                self.observer.emit(message_id, Stage::Normalized);
                tracing::debug!(
                    engine = %recognized.engine,
                    raw_chars = recognized.raw_text.chars().count(),
                    chars = normalized.chars().count(),
                    mask_present = ?recognized.mask_present,
                    "recognized"
                );
                OcrOutcome::from_text(normalized, processed)
            }
            Err(e) => {
                tracing::warn!(engine = self.engine.name(), error = %e, "OCR failed");
                self.stats.record_ocr_failure();
                OcrOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// One OCR attempt under the per-attempt deadline.
    ///
    /// The engine call runs in its own task holding an OCR slot. On timeout
    /// only the wait is abandoned: the slot stays taken until the engine
    /// returns, so later attempts queue behind work that cannot be cancelled.
    async fn recognize_once(&self, image: &ProcessedImage) -> Result<OcrResult> {
        let slot = Arc::clone(&self.ocr_slots)
            .acquire_owned()
            .await
            .map_err(|_| OcrelayError::OcrUnavailable {
                message: "OCR slots closed".to_string(),
            })?;
        let engine = Arc::clone(&self.engine);
        let options = self.settings.ocr_options.clone();
        let image = image.clone();
        let job = tokio::spawn(
            async move {
                let result = engine.recognize(&image, &options).await;
                drop(slot);
                result
            }
            .instrument(tracing::Span::current()),
        );

        let timeout = self.settings.ocr_timeout;
        match tokio::time::timeout(timeout, job).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(OcrelayError::Ocr {
                message: format!("OCR task panicked: {e}"),
            }),
            Err(_) => Err(OcrelayError::OcrTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Wait until every engine call, including timed-out ones, has returned.
    async fn wait_for_ocr(&self) {
        let slots = self.settings.max_in_flight.max(1);
        let busy = slots.saturating_sub(self.ocr_slots.available_permits());
        if busy > 0 {
            tracing::info!(busy, "waiting for abandoned OCR calls to finish");
        }
        if let Ok(permits) = self.ocr_slots.acquire_many(slots as u32).await {
            drop(permits);
        }
    }

    async fn transform(&self, original: &MediaAsset) -> Result<ProcessedImage> {
        let transform = self.settings.transform;
        let bytes = original.bytes.clone();
        tokio::task::spawn_blocking(move || transform.apply(&bytes))
            .await
            .map_err(|e| OcrelayError::InvalidMedia {
                message: format!("transform task panicked: {e}"),
            })?
    }

    async fn archive_images(&self, message_id: i64, original: &MediaAsset, processed: &ProcessedImage) {
        let Some(ref archive) = self.archive else {
            return;
        };
        for (kind, asset) in [
            (ArchiveKind::Original, original),
            (ArchiveKind::Processed, processed.as_asset()),
        ] {
            if let Err(e) = archive.store(kind, message_id, asset).await {
                tracing::warn!(dir = %archive.dir().display(), error = %e, "failed to archive image");
            }
        }
    }
}

struct Shared {
    processor: EventProcessor,
    sink: Arc<dyn Sink>,
}

impl Shared {
    async fn handle(&self, event: InboundEvent, fetcher: Arc<dyn MediaFetcher>) {
        let decision = self.processor.process(&event, fetcher.as_ref()).await;
        self.deliver(event.meta(), decision).await;
    }

    async fn deliver(&self, meta: EventMeta, decision: ForwardingDecision) {
        let stats = &self.processor.stats;
        let observer = &self.processor.observer;
        stats.record_decision(&decision);

        let delivery = Delivery { meta, decision };
        let sink = &self.sink;
        let payload = &delivery;
        let result = self
            .processor
            .settings
            .delivery_retry
            .run("delivery", |_| async move { sink.deliver(payload).await })
            .await;

        match result {
            Ok(()) => {
                stats.record_delivered();
                observer.emit(delivery.meta.message_id, Stage::Delivered);
                tracing::info!(
                    decision = delivery.decision.label(),
                    sink = sink.name(),
                    "delivered"
                );
            }
            Err(e) => {
                stats.record_dropped();
                observer.emit(delivery.meta.message_id, Stage::Dropped);
                tracing::error!(
                    channel = %delivery.meta.channel,
                    message_id = delivery.meta.message_id,
                    decision = delivery.decision.label(),
                    text = ?delivery.decision.text(),
                    media_bytes = delivery.decision.media().map(|m| m.len()),
                    error = %e,
                    "delivery failed, event dropped"
                );
            }
        }
    }
}

/// Pipeline orchestrator: owns the event source session and drives every
/// post to exactly one delivery attempt sequence.
pub struct Orchestrator {
    processor: EventProcessor,
    sink: Arc<dyn Sink>,
}

impl Orchestrator {
    pub fn new(settings: PipelineSettings, engine: Arc<dyn OcrEngine>, sink: Arc<dyn Sink>) -> Self {
        Self {
            processor: EventProcessor::new(settings, engine),
            sink,
        }
    }

    /// Publish per-event stage progress to `tx`.
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<StageEvent>) -> Self {
        self.processor.observer = StageObserver::new(tx);
        self
    }

    /// Archive original and processed photos.
    pub fn with_archive(mut self, archive: MediaArchive) -> Self {
        self.processor.archive = Some(archive);
        self
    }

    /// Live counters (shared with the running pipeline).
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.processor.stats)
    }

    /// Run until the source ends, `cancel` fires, or reconnecting fails.
    ///
    /// In-flight events always finish before this returns.
    ///
    /// # Errors
    /// `SourceConnectivity` when the reconnect budget is exhausted.
    pub async fn run<S>(self, source: &mut S, cancel: CancellationToken) -> Result<RunSummary>
    where
        S: EventSource + ?Sized,
    {
        let settings = &self.processor.settings;
        let channel = settings.channel.clone();
        let reconnect = settings.reconnect;
        let semaphore = Arc::new(Semaphore::new(settings.max_in_flight.max(1)));
        let stats = Arc::clone(&self.processor.stats);
        let shared = Arc::new(Shared {
            processor: self.processor,
            sink: self.sink,
        });
        let mut tasks = JoinSet::new();

        tracing::info!(
            channel = %channel,
            source = source.name(),
            sink = shared.sink.name(),
            engine = shared.processor.engine.name(),
            "starting pipeline"
        );

        let mut outcome = subscribe_with_retry(source, &channel, reconnect, &cancel).await;
        let fetcher = source.fetcher();

        while outcome.is_ok() {
            // Admission: wait for a free slot before accepting the next post.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            reap_finished(&mut tasks);

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = source.next_post() => next,
            };

            match next {
                Ok(Some(post)) => {
                    stats.record_received();
                    let event = InboundEvent::from_post(post);
                    let span = tracing::info_span!(
                        "event",
                        channel = %event.source_channel,
                        message_id = event.message_id,
                        kind = %event.media_kind
                    );
                    let shared = Arc::clone(&shared);
                    let fetcher = Arc::clone(&fetcher);
                    tasks.spawn(
                        async move {
                            shared.handle(event, fetcher).await;
                            drop(permit);
                        }
                        .instrument(span),
                    );
                }
                Ok(None) => {
                    tracing::info!("event source ended");
                    break;
                }
                Err(e) => {
                    drop(permit);
                    if e.is_fatal() {
                        outcome = Err(e);
                        break;
                    }
                    tracing::warn!(error = %e, "event source disconnected, reconnecting");
                    stats.record_reconnect();
                    outcome = subscribe_with_retry(source, &channel, reconnect, &cancel).await;
                }
            }
        }

        if cancel.is_cancelled() {
            tracing::info!(in_flight = tasks.len(), "shutdown requested, finishing in-flight events");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "event task panicked");
            }
        }
        shared.processor.wait_for_ocr().await;

        let summary = stats.summary();
        tracing::info!(%summary, "pipeline stopped");
        outcome.map(|()| summary)
    }
}

/// Subscribe with bounded retries. Returns `Ok` early if cancelled.
async fn subscribe_with_retry<S>(
    source: &mut S,
    channel: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: EventSource + ?Sized,
{
    let mut attempt = 1;
    loop {
        match source.subscribe(channel).await {
            Ok(()) => {
                tracing::info!(channel, attempt, "subscribed");
                return Ok(());
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if attempt >= policy.max_attempts => {
                tracing::error!(channel, attempts = attempt, error = %e, "event source unreachable");
                return Err(OcrelayError::SourceConnectivity {
                    attempts: attempt,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    channel,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "subscribe failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        if let Err(e) = joined {
            tracing::error!(error = %e, "event task panicked");
        }
    }
}
