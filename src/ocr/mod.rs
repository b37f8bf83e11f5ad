//! OCR stage: one contract, a local and a remote backend.

pub mod engine;
pub mod remote;
pub mod tesseract;

pub use engine::{EngineKind, MockOcrEngine, OcrEngine, OcrFocus, OcrOptions, OcrResult};
pub use remote::{RemoteConfig, RemoteOcrEngine};
pub use tesseract::{TesseractConfig, TesseractEngine};
