//! On-device text translation: prompt, whole-word tokenization, one forward pass
//! through a local model, greedy decoding and a softmax confidence heuristic.

pub mod assets;
pub mod bridge;
pub mod confidence;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod language;
pub mod pipeline;
pub mod progress;
pub mod tensor;
pub mod tokenizer;

pub use bridge::TranslatorBridge;
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineConfig, TranslationPipeline, TranslationResult};
