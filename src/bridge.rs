//! Host-facing operations. Each returns a serializable success payload or a
//! [`BridgeError`] carrying one of the stable error codes; nothing inside the
//! pipeline, including a panic, escapes as an unhandled fault.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;

use crate::error::PipelineError;
use crate::pipeline::TranslationPipeline;

pub const NOT_LOADED_VERSION: &str = "not_loaded";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ModelInitError,
    ModelNotLoaded,
    TranslationError,
    CleanupError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ModelInitError => "MODEL_INIT_ERROR",
            ErrorCode::ModelNotLoaded => "MODEL_NOT_LOADED",
            ErrorCode::TranslationError => "TRANSLATION_ERROR",
            ErrorCode::CleanupError => "CLEANUP_ERROR",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, thiserror::Error)]
#[error("{}: {}", .code.as_str(), .message)]
pub struct BridgeError {
    pub status: &'static str,
    pub code: ErrorCode,
    pub message: String,
}

impl BridgeError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            code,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReply {
    pub status: &'static str,
    pub model_version: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateReply {
    pub translated_text: String,
    pub confidence: f64,
    /// Milliseconds.
    pub processing_time: f64,
    pub model_version: String,
    pub status: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyReply {
    pub is_ready: bool,
    pub model_version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfoReply {
    pub model_version: String,
    pub is_loaded: bool,
    pub max_sequence_length: usize,
    pub vocab_size: usize,
    pub model_file: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReply {
    pub status: &'static str,
    pub message: String,
}

pub type Reply<T> = Result<T, BridgeError>;

pub struct TranslatorBridge {
    pipeline: TranslationPipeline,
}

impl TranslatorBridge {
    pub fn new(pipeline: TranslationPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &TranslationPipeline {
        &self.pipeline
    }

    pub fn initialize_model(&self) -> Reply<InitReply> {
        guarded(ErrorCode::ModelInitError, || {
            self.pipeline
                .initialize_model()
                .map(|_| InitReply {
                    status: "success",
                    model_version: self.pipeline.model_version().to_string(),
                    message: "Model initialized successfully".to_string(),
                })
                .map_err(|e| {
                    BridgeError::new(
                        ErrorCode::ModelInitError,
                        format!("Failed to initialize model: {e}"),
                    )
                })
        })
    }

    pub fn translate(
        &self,
        input_text: &str,
        from_language: &str,
        to_language: &str,
        context: Option<&str>,
    ) -> Reply<TranslateReply> {
        guarded(ErrorCode::TranslationError, || {
            match self
                .pipeline
                .translate(input_text, from_language, to_language, context)
            {
                Ok(r) => Ok(TranslateReply {
                    translated_text: r.translated_text,
                    confidence: r.confidence,
                    processing_time: r.processing_time.as_secs_f64() * 1000.0,
                    model_version: r.model_version,
                    status: "success",
                }),
                Err(e @ PipelineError::NotReady) => {
                    Err(BridgeError::new(ErrorCode::ModelNotLoaded, e.to_string()))
                }
                Err(e) => Err(BridgeError::new(
                    ErrorCode::TranslationError,
                    format!("Translation failed: {e}"),
                )),
            }
        })
    }

    pub fn is_model_ready(&self) -> ReadyReply {
        let is_ready = self.pipeline.is_ready();
        ReadyReply {
            is_ready,
            model_version: if is_ready {
                self.pipeline.model_version().to_string()
            } else {
                NOT_LOADED_VERSION.to_string()
            },
        }
    }

    pub fn get_model_info(&self) -> ModelInfoReply {
        let info = self.pipeline.model_info();
        ModelInfoReply {
            model_version: info.model_version,
            is_loaded: info.is_loaded,
            max_sequence_length: info.max_sequence_length,
            vocab_size: info.vocab_size,
            model_file: info.model_file,
        }
    }

    pub fn cleanup(&self) -> Reply<CleanupReply> {
        guarded(ErrorCode::CleanupError, || {
            self.pipeline
                .cleanup()
                .map(|()| CleanupReply {
                    status: "success",
                    message: "Resources cleaned up successfully".to_string(),
                })
                .map_err(|e| {
                    BridgeError::new(ErrorCode::CleanupError, format!("Failed to cleanup: {e}"))
                })
        })
    }
}

/// Serializes either side of a reply as one JSON object.
pub fn reply_json<T: Serialize>(reply: &Reply<T>) -> String {
    let res = match reply {
        Ok(v) => serde_json::to_string(v),
        Err(e) => serde_json::to_string(e),
    };
    res.unwrap_or_else(|e| {
        format!(r#"{{"status":"error","code":"INTERNAL","message":"serialize reply: {e}"}}"#)
    })
}

fn guarded<T>(code: ErrorCode, f: impl FnOnce() -> Reply<T>) -> Reply<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(BridgeError::new(code, format!("internal error: {msg}")))
    })
}
