use thiserror::Error;

/// Failures surfaced by the translation pipeline.
///
/// Only the vocabulary store and the inference engine touch external resources, so
/// only they produce errors; tokenizer, decoder and confidence scorer are total.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Tokenizer configuration is unreadable or malformed.
    #[error("tokenizer config: {0}")]
    Config(String),

    /// Model asset unreadable, rejected by the runtime, or delegate setup failed.
    #[error("model init: {0}")]
    Init(String),

    #[error("Model not initialized. Call initializeModel first.")]
    NotReady,

    /// Runtime invocation failed (or the engine holds no model).
    #[error("inference: {0}")]
    Infer(String),

    #[error("cleanup: {0}")]
    Cleanup(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures reported by a tensor runtime implementation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("delegate unavailable: {0}")]
    Delegate(String),

    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("runtime failure: {0}")]
    Execution(String),
}

impl From<safetensors::SafeTensorError> for RuntimeError {
    fn from(err: safetensors::SafeTensorError) -> Self {
        RuntimeError::InvalidModel(err.to_string())
    }
}
