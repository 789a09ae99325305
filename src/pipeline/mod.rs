mod config;
mod controller;
pub mod prompts;
mod trace;

pub use config::{init_default_config, ConfigOverrides, PipelineConfig};
pub use controller::{ModelInfo, TranslationPipeline, TranslationResult};

#[cfg(test)]
pub(crate) use controller::tests as controller_tests;
