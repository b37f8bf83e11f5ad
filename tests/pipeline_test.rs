//! End-to-end pipeline tests: in-memory channel source, mock OCR engine,
//! collecting sink.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ocrelay::OcrelayError;
use ocrelay::event::{Attachment, AttachmentKind, MediaKind, MediaRef, RawPost};
use ocrelay::media::{CropSpec, ImageTransform, ProcessedImage};
use ocrelay::ocr::{EngineKind, MockOcrEngine, OcrEngine, OcrOptions, OcrResult};
use ocrelay::pipeline::{
    CollectorSink, ForwardingDecision, ForwardingPolicy, Orchestrator, PipelineSettings,
    RetryPolicy, Stage, StageEvent,
};
use ocrelay::source::{ChannelEventSource, SourceItem};
use ocrelay::text::{NormalizerConfig, TextNormalizer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CHANNEL: &str = "@screens";

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn settings() -> PipelineSettings {
    let fast = RetryPolicy::new(2, Duration::from_millis(1));
    PipelineSettings {
        channel: CHANNEL.into(),
        transform: ImageTransform::new(
            CropSpec {
                top_margin: 4,
                right_margin: 4,
                bottom_exclusion: 4,
            },
            Default::default(),
        ),
        ocr_timeout: Duration::from_millis(500),
        ocr_retry: fast,
        fetch_retry: fast,
        reconnect: fast,
        delivery_retry: fast,
        policy: ForwardingPolicy::new(false),
        min_media_bytes: 16,
        ..PipelineSettings::default()
    }
}

fn photo(id: i64, file_id: &str) -> SourceItem {
    SourceItem::Post(RawPost::with_attachment(
        CHANNEL,
        id,
        Attachment::photo(MediaRef::new(file_id)),
    ))
}

async fn run(
    settings: PipelineSettings,
    engine: MockOcrEngine,
    sink: &CollectorSink,
    source: &mut ChannelEventSource,
) -> ocrelay::Result<ocrelay::pipeline::RunSummary> {
    Orchestrator::new(settings, Arc::new(engine), Arc::new(sink.clone()))
        .run(source, CancellationToken::new())
        .await
}

/// Answers after a delay chosen by the processed image width.
struct DelayByWidth {
    delays: HashMap<u32, Duration>,
}

impl DelayByWidth {
    fn new<const N: usize>(delays: [(u32, Duration); N]) -> Self {
        Self {
            delays: HashMap::from(delays),
        }
    }
}

#[async_trait]
impl OcrEngine for DelayByWidth {
    async fn recognize(&self, image: &ProcessedImage, _options: &OcrOptions) -> ocrelay::Result<OcrResult> {
        if let Some(delay) = self.delays.get(&image.width()) {
            tokio::time::sleep(*delay).await;
        }
        Ok(OcrResult::local("text"))
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Local
    }

    fn name(&self) -> &str {
        "delay-by-width"
    }
}

/// Runs every call on the blocking pool, which a timeout cannot interrupt.
#[derive(Default)]
struct BlockingEngine {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl OcrEngine for BlockingEngine {
    async fn recognize(&self, _image: &ProcessedImage, _options: &OcrOptions) -> ocrelay::Result<OcrResult> {
        let active = Arc::clone(&self.active);
        let peak = Arc::clone(&self.peak);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::spawn_blocking(move || {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(120));
            active.fetch_sub(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
        Ok(OcrResult::local("too late"))
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Local
    }

    fn name(&self) -> &str {
        "blocking"
    }
}

#[tokio::test]
async fn test_photo_with_text_is_forwarded_as_text() {
    let sink = CollectorSink::new();
    let mut source = ChannelEventSource::scripted(vec![photo(1, "shot")]).with_media("shot", png(64, 48));

    let summary = run(settings(), MockOcrEngine::new().with_response("hello"), &sink, &mut source)
        .await
        .unwrap();

    assert_eq!(summary.forward_text, 1);
    let deliveries = sink.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].meta.channel, CHANNEL);
    assert_eq!(deliveries[0].decision, ForwardingDecision::ForwardText("hello".into()));
}

#[tokio::test]
async fn test_digits_and_symbols_are_stripped() {
    let mut normalizer = NormalizerConfig {
        allow_digits: false,
        punctuation: String::new(),
        ..NormalizerConfig::default()
    };
    normalizer.substitutions.insert('0', 'o');
    let settings = PipelineSettings {
        normalizer: TextNormalizer::new(normalizer).unwrap(),
        ..settings()
    };

    let sink = CollectorSink::new();
    let mut source = ChannelEventSource::scripted(vec![photo(7, "inv")]).with_media("inv", png(64, 48));

    run(settings, MockOcrEngine::new().with_response("inv0ic3!!"), &sink, &mut source)
        .await
        .unwrap();

    assert_eq!(
        sink.deliveries()[0].decision,
        ForwardingDecision::ForwardText("invoic".into())
    );
}

#[tokio::test]
async fn test_ocr_timeout_forwards_original_bytes() {
    let original = png(64, 48);
    let sink = CollectorSink::new();
    let mut source = ChannelEventSource::scripted(vec![photo(3, "slow")]).with_media("slow", original.clone());
    let engine = MockOcrEngine::new().with_delays(vec![Duration::from_millis(300)]);
    let settings = PipelineSettings {
        ocr_timeout: Duration::from_millis(20),
        ..settings()
    };

    let summary = run(settings, engine.clone(), &sink, &mut source).await.unwrap();

    assert_eq!(summary.no_text_found, 1);
    assert_eq!(summary.ocr_failures, 1);
    assert_eq!(engine.calls(), 2);
    match sink.deliveries()[0].decision {
        ForwardingDecision::NoTextFound(ref media) => assert_eq!(media.bytes, original),
        ref other => panic!("expected no_text_found, got {other:?}"),
    }
}

#[tokio::test]
async fn test_blank_ocr_result_is_no_text_found() {
    let sink = CollectorSink::new();
    let mut source = ChannelEventSource::scripted(vec![photo(4, "blank")]).with_media("blank", png(64, 48));

    run(settings(), MockOcrEngine::new().with_response(" \n\t "), &sink, &mut source)
        .await
        .unwrap();

    assert_eq!(sink.deliveries()[0].decision.label(), "no_text_found");
}

#[tokio::test]
async fn test_margin_beyond_image_forwards_media_without_ocr() {
    let original = png(64, 48);
    let sink = CollectorSink::new();
    let mut source = ChannelEventSource::scripted(vec![photo(5, "tiny")]).with_media("tiny", original.clone());
    let engine = MockOcrEngine::new();
    let settings = PipelineSettings {
        transform: ImageTransform::new(
            CropSpec {
                top_margin: 48,
                right_margin: 4,
                bottom_exclusion: 0,
            },
            Default::default(),
        ),
        ..settings()
    };

    run(settings, engine.clone(), &sink, &mut source).await.unwrap();

    assert_eq!(engine.calls(), 0);
    match sink.deliveries()[0].decision {
        ForwardingDecision::ForwardMedia(ref media) => assert_eq!(media.bytes, original),
        ref other => panic!("expected forward_media, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_photo_media_is_forwarded_untouched() {
    let sink = CollectorSink::new();
    let clip = b"\x00\x00\x00\x18ftypmp42 not really a video".to_vec();
    let post = RawPost::with_attachment(
        CHANNEL,
        6,
        Attachment::new(AttachmentKind::Video, MediaRef::new("clip")).with_mime_type("video/mp4"),
    );
    let mut source = ChannelEventSource::scripted(vec![SourceItem::Post(post)]).with_media("clip", clip.clone());
    let engine = MockOcrEngine::new();

    run(settings(), engine.clone(), &sink, &mut source).await.unwrap();

    assert_eq!(engine.calls(), 0);
    match sink.deliveries()[0].decision {
        ForwardingDecision::ForwardMedia(ref media) => assert_eq!(media.bytes, clip),
        ref other => panic!("expected forward_media, got {other:?}"),
    }
}

#[tokio::test]
async fn test_every_post_yields_exactly_one_delivery() {
    let sink = CollectorSink::new();
    let mut source = ChannelEventSource::scripted(vec![
        SourceItem::Post(RawPost::text(CHANNEL, 1, "first")),
        photo(2, "a"),
        photo(3, "missing"),
        SourceItem::Post(RawPost::text(CHANNEL, 4, "last")),
    ])
    .with_media("a", png(64, 48));

    let summary = run(settings(), MockOcrEngine::new().with_response("ok"), &sink, &mut source)
        .await
        .unwrap();

    assert_eq!(summary.received, 4);
    assert_eq!(summary.delivered, 4);
    let mut ids: Vec<i64> = sink.deliveries().iter().map(|d| d.meta.message_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_stage_order_holds_per_event_under_concurrency() {
    let (tx, mut rx) = mpsc::unbounded_channel::<StageEvent>();
    let sink = CollectorSink::new();
    // Processed widths 60/76/92 (4px right margin) select each message's OCR delay.
    let engine = DelayByWidth::new([
        (60, Duration::from_millis(150)),
        (76, Duration::from_millis(5)),
        (92, Duration::from_millis(60)),
    ]);
    let mut source = ChannelEventSource::scripted(vec![photo(1, "a"), photo(2, "b"), photo(3, "c")])
        .with_media("a", png(64, 48))
        .with_media("b", png(80, 48))
        .with_media("c", png(96, 48));

    Orchestrator::new(settings(), Arc::new(engine), Arc::new(sink.clone()))
        .with_event_sender(tx)
        .run(&mut source, CancellationToken::new())
        .await
        .unwrap();

    // A slow event does not hold back a later fast one.
    let order: Vec<i64> = sink.deliveries().iter().map(|d| d.meta.message_id).collect();
    let position = |id: i64| order.iter().position(|&m| m == id).unwrap();
    assert!(position(2) < position(1), "delivery order {order:?}");
    assert!(position(3) < position(1), "delivery order {order:?}");

    let mut per_event: HashMap<i64, Vec<Stage>> = HashMap::new();
    while let Ok(event) = rx.try_recv() {
        per_event.entry(event.message_id).or_default().push(event.stage);
    }

    let expected = vec![
        Stage::Classified(MediaKind::Photo),
        Stage::Fetched,
        Stage::Transformed,
        Stage::Recognized,
        Stage::Normalized,
        Stage::Decided("forward_text"),
        Stage::Delivered,
    ];
    assert_eq!(per_event.len(), 3);
    for id in 1..=3 {
        assert_eq!(per_event[&id], expected, "stages of message {id}");
    }
}

#[tokio::test]
async fn test_reconnect_then_exhaustion_is_fatal() {
    let sink = CollectorSink::new();
    let mut flaky = ChannelEventSource::scripted(vec![
        SourceItem::Post(RawPost::text(CHANNEL, 1, "before")),
        SourceItem::Disconnect("network down".into()),
        SourceItem::Post(RawPost::text(CHANNEL, 2, "after")),
    ]);
    let subscribes = flaky.subscribe_counter();

    let summary = run(settings(), MockOcrEngine::new(), &sink, &mut flaky).await.unwrap();
    assert_eq!(summary.reconnects, 1);
    assert_eq!(summary.delivered, 2);
    assert_eq!(subscribes.load(Ordering::SeqCst), 2);

    let mut dead = ChannelEventSource::scripted(vec![]).with_connect_failures(5);
    let err = run(settings(), MockOcrEngine::new(), &sink, &mut dead)
        .await
        .unwrap_err();
    assert!(matches!(err, OcrelayError::SourceConnectivity { attempts: 2, .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_timed_out_blocking_ocr_stays_within_in_flight_cap() {
    let sink = CollectorSink::new();
    let engine = Arc::new(BlockingEngine::default());
    let mut source = ChannelEventSource::scripted(vec![photo(1, "a"), photo(2, "b"), photo(3, "c")])
        .with_media("a", png(64, 48))
        .with_media("b", png(64, 48))
        .with_media("c", png(64, 48));
    let settings = PipelineSettings {
        max_in_flight: 1,
        ocr_timeout: Duration::from_millis(20),
        ocr_retry: RetryPolicy::new(3, Duration::from_millis(1)),
        ..settings()
    };

    let summary = Orchestrator::new(settings, Arc::clone(&engine) as Arc<dyn OcrEngine>, Arc::new(sink.clone()))
        .run(&mut source, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(engine.calls.load(Ordering::SeqCst), 9);
    assert_eq!(engine.peak.load(Ordering::SeqCst), 1, "OCR calls exceeded max_in_flight");
    assert_eq!(engine.active.load(Ordering::SeqCst), 0, "OCR calls outlived run()");
    assert_eq!(summary.no_text_found, 3);
}

#[tokio::test]
async fn test_sink_failures_are_retried_within_budget() {
    let sink = CollectorSink::new().with_failures(1);
    let mut source = ChannelEventSource::scripted(vec![SourceItem::Post(RawPost::text(CHANNEL, 1, "retry me"))]);

    let summary = run(settings(), MockOcrEngine::new(), &sink, &mut source).await.unwrap();

    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.dropped, 0);
    assert_eq!(sink.attempts(), 2);
}

#[tokio::test]
async fn test_live_channel_source_processes_until_closed() {
    let sink = CollectorSink::new();
    let (source, feed) = ChannelEventSource::new(8);
    let mut source = source.with_media("p", png(64, 48));

    let producer = tokio::spawn(async move {
        feed.send(SourceItem::Post(RawPost::text(CHANNEL, 10, "live"))).await.unwrap();
        feed.send(photo(11, "p")).await.unwrap();
    });

    let summary = run(
        settings(),
        MockOcrEngine::new().with_response("from image"),
        &sink,
        &mut source,
    )
    .await
    .unwrap();
    producer.await.unwrap();

    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.forward_text, 2);
}
