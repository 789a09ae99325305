//! Inference engine: owns the loaded runtime and the execution strategy chosen
//! for it.
//!
//! ```text
//! Unloaded --initialize--> Ready --infer--> Ready --release--> Unloaded
//! ```
//!
//! `infer` while unloaded is an error. `release` while unloaded is a no-op.

pub mod delegate;
pub mod linear;
pub mod runtime;

use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};
use crate::tensor::OutputTensor;
use crate::tokenizer::TokenSequence;

use delegate::{select_strategy, DelegatePolicy, DelegateProbe, ExecutionStrategy};
use runtime::{RuntimeFactory, TensorRuntime};

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub vocab_size: usize,
    pub threads: usize,
    pub delegate: DelegatePolicy,
    /// Expected lowercase hex SHA-256 of the model blob.
    pub model_sha256: Option<String>,
}

enum EngineState {
    Unloaded,
    Ready {
        runtime: Box<dyn TensorRuntime>,
        strategy: ExecutionStrategy,
    },
}

pub struct InferenceEngine {
    settings: EngineSettings,
    factory: Box<dyn RuntimeFactory>,
    probe: Box<dyn DelegateProbe>,
    state: EngineState,
}

impl InferenceEngine {
    pub fn new(
        settings: EngineSettings,
        factory: Box<dyn RuntimeFactory>,
        probe: Box<dyn DelegateProbe>,
    ) -> Self {
        Self {
            settings,
            factory,
            probe,
            state: EngineState::Unloaded,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn runtime_name(&self) -> &str {
        self.factory.name()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, EngineState::Ready { .. })
    }

    pub fn strategy(&self) -> Option<&ExecutionStrategy> {
        match &self.state {
            EngineState::Ready { strategy, .. } => Some(strategy),
            EngineState::Unloaded => None,
        }
    }

    /// Loads `model` and picks the execution path. Any previously loaded runtime is
    /// released first. On failure the engine is left unloaded.
    pub fn initialize(&mut self, model: &[u8]) -> Result<ExecutionStrategy> {
        self.release()
            .map_err(|e| PipelineError::Init(format!("release previous model: {e}")))?;

        if let Some(expected) = self.settings.model_sha256.as_deref() {
            verify_sha256(model, expected)?;
        }
        let strategy =
            select_strategy(self.settings.delegate, self.probe.as_ref(), self.settings.threads)?;
        let runtime = self
            .factory
            .load(model, &strategy)
            .map_err(|e| PipelineError::Init(format!("{} runtime: {e}", self.factory.name())))?;
        if runtime.output_len() != self.settings.vocab_size {
            let got = runtime.output_len();
            let mut msg = format!(
                "model produces {got} scores per step, expected vocab size {}",
                self.settings.vocab_size
            );
            if let Err(e) = runtime.close() {
                msg.push_str(&format!(" (close also failed: {e})"));
            }
            return Err(PipelineError::Init(msg));
        }

        self.state = EngineState::Ready {
            runtime,
            strategy: strategy.clone(),
        };
        Ok(strategy)
    }

    /// One forward pass. Returns a fresh one-row tensor of `vocab_size` scores.
    pub fn infer(&mut self, ids: &TokenSequence) -> Result<OutputTensor> {
        let EngineState::Ready { runtime, .. } = &mut self.state else {
            return Err(PipelineError::Infer("engine has no loaded model".to_string()));
        };
        let input = ids.to_ne_bytes();
        let cols = self.settings.vocab_size;
        let mut output = vec![0.0f32; cols];
        runtime
            .run(&input, &mut output)
            .map_err(|e| PipelineError::Infer(e.to_string()))?;
        OutputTensor::new(1, cols, output)
            .ok_or_else(|| PipelineError::Infer("output buffer size changed".to_string()))
    }

    /// Frees the runtime. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, EngineState::Unloaded) {
            EngineState::Unloaded => Ok(()),
            EngineState::Ready { runtime, .. } => runtime
                .close()
                .map_err(|e| PipelineError::Cleanup(e.to_string())),
        }
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn verify_sha256(model: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(model);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(PipelineError::Init(format!(
            "model checksum mismatch: expected {}, got {actual}",
            expected.trim()
        )))
    }
}
