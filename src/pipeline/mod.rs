//! Event pipeline: per-post processing, forwarding policy and delivery.
//!
//! Every post becomes exactly one [`ForwardingDecision`]. Posts run
//! concurrently up to `max_in_flight`, so deliveries may reach the sink out
//! of post order.

pub mod orchestrator;
pub mod policy;
pub mod retry;
pub mod sink;
pub mod stats;

pub use orchestrator::{
    EventProcessor, Orchestrator, PipelineSettings, Stage, StageEvent, StageObserver,
};
pub use policy::{ForwardingDecision, ForwardingPolicy, OcrOutcome, PolicyInput};
pub use retry::RetryPolicy;
pub use sink::{CollectorSink, Delivery, Sink, StdoutSink};
pub use stats::{RunStats, RunSummary};
