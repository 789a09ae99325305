use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::assets::AssetSource;
use crate::confidence;
use crate::decode;
use crate::engine::delegate::{DelegateProbe, ExecutionStrategy};
use crate::engine::runtime::RuntimeFactory;
use crate::engine::{sha256_hex, InferenceEngine};
use crate::error::{PipelineError, Result};
use crate::progress::ConsoleProgress;
use crate::tokenizer::{Tokenizer, Vocabulary};

use super::prompts::PromptBuilder;
use super::trace::TraceWriter;
use super::PipelineConfig;

/// Outcome of one translate call. Owned by the caller once returned.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslationResult {
    pub translated_text: String,
    /// Mean softmax max-probability; a heuristic in [0, 1].
    pub confidence: f64,
    pub processing_time: Duration,
    pub model_version: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    pub model_version: String,
    pub is_loaded: bool,
    pub max_sequence_length: usize,
    pub vocab_size: usize,
    pub model_file: String,
}

struct PipelineState {
    ready: bool,
    tokenizer: Option<Tokenizer>,
    engine: InferenceEngine,
    requests: u64,
}

/// Owns the translation lifecycle. All operations lock one mutex, so concurrent
/// callers are serialized and never observe a half-initialized pipeline.
pub struct TranslationPipeline {
    cfg: PipelineConfig,
    assets: Box<dyn AssetSource>,
    prompts: PromptBuilder,
    progress: ConsoleProgress,
    trace: TraceWriter,
    state: Mutex<PipelineState>,
}

impl TranslationPipeline {
    pub fn new(
        cfg: PipelineConfig,
        assets: Box<dyn AssetSource>,
        factory: Box<dyn RuntimeFactory>,
        probe: Box<dyn DelegateProbe>,
        progress: ConsoleProgress,
    ) -> Self {
        let trace = TraceWriter::new(cfg.trace_dir.clone(), cfg.trace_prompts).unwrap_or_else(|err| {
            progress.warn(format!("tracing disabled: {err:#}"));
            TraceWriter::disabled()
        });
        let engine = InferenceEngine::new(cfg.engine_settings(), factory, probe);
        Self {
            prompts: PromptBuilder::with_template(cfg.prompt_template.clone()),
            cfg,
            assets,
            progress,
            trace,
            state: Mutex::new(PipelineState {
                ready: false,
                tokenizer: None,
                engine,
                requests: 0,
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Loads the vocabulary, then the model. Ready only when both succeed; on
    /// failure everything loaded so far is dropped.
    pub fn initialize_model(&self) -> Result<ExecutionStrategy> {
        let mut st = self.lock();
        self.progress
            .info(format!("Initializing model {}...", self.cfg.model_version));
        st.ready = false;
        st.tokenizer = None;

        match self.load_into(&mut st) {
            Ok(strategy) => {
                st.ready = true;
                self.progress.info("Model initialization completed successfully");
                Ok(strategy)
            }
            Err(err) => {
                st.tokenizer = None;
                if let Err(e) = st.engine.release() {
                    self.progress.warn(format!("release after failed init: {e}"));
                }
                self.progress.warn(format!("Model initialization failed: {err}"));
                Err(err)
            }
        }
    }

    fn load_into(&self, st: &mut PipelineState) -> Result<ExecutionStrategy> {
        let vocab = self.load_vocabulary()?;
        let tokenizer = Tokenizer::new(Arc::new(vocab), self.cfg.max_sequence_length);

        let t0 = Instant::now();
        let model = self.assets.open(&self.cfg.model_file).map_err(|e| {
            PipelineError::Init(format!("open model asset {}: {e:#}", self.cfg.model_file))
        })?;
        self.progress.info(format!(
            "Model asset {} ({} bytes, sha256 {})",
            self.assets.describe(&self.cfg.model_file),
            model.len(),
            short_hash(&sha256_hex(&model))
        ));
        let strategy = st.engine.initialize(&model)?;
        self.progress.info(strategy.describe());
        self.progress.timed(
            &format!("{} runtime loaded", st.engine.runtime_name()),
            t0.elapsed(),
        );

        st.tokenizer = Some(tokenizer);
        Ok(strategy)
    }

    fn load_vocabulary(&self) -> Result<Vocabulary> {
        let name = &self.cfg.tokenizer_file;
        let bytes = self
            .assets
            .open(name)
            .map_err(|e| PipelineError::Config(format!("open {name}: {e:#}")))?;
        let vocab = Vocabulary::load(&bytes, self.cfg.vocab_policy)?;
        if !vocab.table_present() {
            self.progress
                .warn(format!("{name} has no model.vocab table; every word maps to <unk>"));
        }
        if vocab.skipped_duplicates() > 0 {
            self.progress.warn(format!(
                "{name}: skipped {} entries with duplicate ids",
                vocab.skipped_duplicates()
            ));
        }
        self.progress
            .info(format!("Vocabulary loaded with {} tokens", vocab.len()));
        Ok(vocab)
    }

    /// Prompt, tokenize, infer, then decode and score. A failure leaves the pipeline
    /// state untouched, so the call can be retried.
    pub fn translate(
        &self,
        input: &str,
        from_lang: &str,
        to_lang: &str,
        context: Option<&str>,
    ) -> Result<TranslationResult> {
        let start = Instant::now();
        let mut st = self.lock();
        if !st.ready {
            return Err(PipelineError::NotReady);
        }
        let PipelineState {
            tokenizer,
            engine,
            requests,
            ..
        } = &mut *st;
        let tokenizer = tokenizer.as_ref().ok_or(PipelineError::NotReady)?;
        *requests += 1;
        let request_id = *requests;

        let prompt = self.prompts.build(input, from_lang, to_lang, context);
        let ids = tokenizer.tokenize(&prompt);
        let logits = engine.infer(&ids)?;
        let translated_text = decode::decode(&logits, tokenizer.vocab());
        let confidence = confidence::score(&logits);
        let processing_time = start.elapsed();

        self.write_trace(request_id, &prompt, ids.ids(), &translated_text);
        self.progress.timed("Translation completed", processing_time);

        Ok(TranslationResult {
            translated_text,
            confidence,
            processing_time,
            model_version: self.cfg.model_version.clone(),
        })
    }

    fn write_trace(&self, request_id: u64, prompt: &str, ids: &[i32], output: &str) {
        if !self.trace.enabled() {
            return;
        }
        let ids_text = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let writes = [
            self.trace.write_request_text(request_id, "prompt", prompt),
            self.trace.write_request_text(request_id, "tokens", &ids_text),
            self.trace.write_request_text(request_id, "output", output),
        ];
        for res in writes {
            if let Err(err) = res {
                self.progress.warn(format!("trace write failed: {err:#}"));
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn model_version(&self) -> &str {
        &self.cfg.model_version
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_version: self.cfg.model_version.clone(),
            is_loaded: self.is_ready(),
            max_sequence_length: self.cfg.max_sequence_length,
            vocab_size: self.cfg.vocab_size,
            model_file: self.cfg.model_file.clone(),
        }
    }

    /// Releases the engine and clears the ready flag. Safe to call repeatedly.
    pub fn cleanup(&self) -> Result<()> {
        let mut st = self.lock();
        st.ready = false;
        st.tokenizer = None;
        st.engine.release()?;
        self.progress.info("Resources cleaned up");
        Ok(())
    }
}

fn short_hash(hex: &str) -> &str {
    hex.get(..12).unwrap_or(hex)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::TranslationPipeline;
    use crate::assets::MemoryAssets;
    use crate::engine::delegate::{ExecutionStrategy, NoAccelerator};
    use crate::engine::linear::tests::tiny_weights;
    use crate::engine::linear::PooledLinearFactory;
    use crate::engine::runtime::tests::ScriptedFactory;
    use crate::engine::runtime::RuntimeFactory;
    use crate::error::PipelineError;
    use crate::pipeline::PipelineConfig;
    use crate::progress::ConsoleProgress;

    /// Tokens chosen so the tiny model maps "hello" to "salam" and "world" to "amadal".
    pub(crate) const TOKENIZER_JSON: &str = r#"{"model":{"vocab":{
        "<unk>":0,"<pad>":1,"<eos>":2,"salam":3,"amadal":4,"hello":5,"world":6,"translate":7
    }}}"#;

    pub(crate) fn test_config() -> PipelineConfig {
        PipelineConfig {
            vocab_size: 8,
            threads: 2,
            verbose: false,
            ..PipelineConfig::default()
        }
    }

    pub(crate) fn test_assets() -> MemoryAssets {
        let model = tiny_weights().to_safetensors().expect("model");
        MemoryAssets::new()
            .with("tokenizer.json", TOKENIZER_JSON)
            .with("translator.safetensors", model)
    }

    pub(crate) fn pipeline_with(assets: MemoryAssets, cfg: PipelineConfig) -> TranslationPipeline {
        pipeline_with_factory(assets, cfg, Box::new(PooledLinearFactory))
    }

    pub(crate) fn pipeline_with_factory(
        assets: MemoryAssets,
        cfg: PipelineConfig,
        factory: Box<dyn RuntimeFactory>,
    ) -> TranslationPipeline {
        TranslationPipeline::new(
            cfg,
            Box::new(assets),
            factory,
            Box::new(NoAccelerator),
            ConsoleProgress::new(false),
        )
    }

    #[test]
    fn translate_before_init_is_not_ready() {
        let p = pipeline_with(test_assets(), test_config());
        assert!(matches!(p.translate("hello", "en", "ber", None), Err(PipelineError::NotReady)));
        assert!(!p.is_ready());
    }

    #[test]
    fn end_to_end_translation() {
        let p = pipeline_with(test_assets(), test_config());
        let strategy = p.initialize_model().expect("init");
        assert_eq!(strategy, ExecutionStrategy::MultiThreadedSoftware { threads: 2 });
        assert!(p.is_ready());

        // Prompt words "translate"/"from"/... pool with "hello", still favoring column 3.
        let r = p.translate("hello", "en", "ber", None).expect("translate");
        assert_eq!(r.translated_text, "salam");
        assert!(r.confidence > 0.0 && r.confidence <= 1.0);
        assert_eq!(r.model_version, "lite-translator-v1.0");

        let r = p.translate("world", "en", "ber", Some("emergency")).expect("translate");
        assert_eq!(r.translated_text, "amadal");
    }

    #[test]
    fn cleanup_twice_is_a_noop() {
        let p = pipeline_with(test_assets(), test_config());
        p.initialize_model().expect("init");
        p.cleanup().expect("cleanup");
        p.cleanup().expect("cleanup again");
        assert!(!p.is_ready());
        assert!(matches!(p.translate("hello", "en", "ber", None), Err(PipelineError::NotReady)));

        // Re-initialization after cleanup works.
        p.initialize_model().expect("re-init");
        assert!(p.is_ready());
    }

    #[test]
    fn failed_init_leaves_pipeline_unloaded() {
        let assets = MemoryAssets::new().with("tokenizer.json", TOKENIZER_JSON);
        let p = pipeline_with(assets, test_config());
        assert!(matches!(p.initialize_model(), Err(PipelineError::Init(_))));
        assert!(!p.is_ready());

        let p = pipeline_with(test_assets().with("tokenizer.json", "{oops"), test_config());
        assert!(matches!(p.initialize_model(), Err(PipelineError::Config(_))));
        assert!(!p.model_info().is_loaded);
    }

    #[test]
    fn unparsable_model_is_init_error() {
        let mut cfg = test_config();
        cfg.model_file = "other.safetensors".to_string();
        let assets = test_assets().with("other.safetensors", b"broken".to_vec());
        let p = pipeline_with(assets, cfg);
        assert!(matches!(p.initialize_model(), Err(PipelineError::Init(_))));
        assert!(matches!(p.translate("hello", "en", "ber", None), Err(PipelineError::NotReady)));
    }

    #[test]
    fn model_info_reports_configuration() {
        let p = pipeline_with(test_assets(), test_config());
        let info = p.model_info();
        assert_eq!(info.max_sequence_length, 512);
        assert_eq!(info.vocab_size, 8);
        assert_eq!(info.model_file, "translator.safetensors");
        assert!(!info.is_loaded);
    }

    #[test]
    fn concurrent_translations_are_serialized() {
        let p = Arc::new(pipeline_with(test_assets(), test_config()));
        p.initialize_model().expect("init");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = Arc::clone(&p);
                thread::spawn(move || p.translate("hello", "en", "ber", None).map(|r| r.translated_text))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().expect("join").expect("translate"), "salam");
        }
    }

    #[test]
    fn failed_inference_keeps_pipeline_ready() {
        let factory = ScriptedFactory::new(8, 3, 1);
        let p = pipeline_with_factory(test_assets(), test_config(), Box::new(factory.clone()));
        p.initialize_model().expect("init");

        assert!(matches!(p.translate("hello", "en", "ber", None), Err(PipelineError::Infer(_))));
        assert!(p.is_ready());

        let r = p.translate("hello", "en", "ber", None).expect("retry");
        assert_eq!(r.translated_text, "salam");
        assert_eq!(factory.log().inputs.len(), 2);
    }

    #[test]
    fn runtime_never_sees_tokens_past_max_length() {
        let factory = ScriptedFactory::new(8, 3, 0);
        let cfg = test_config();
        let max_len = cfg.max_sequence_length;
        let p = pipeline_with_factory(test_assets(), cfg, Box::new(factory.clone()));
        p.initialize_model().expect("init");

        // "translate from en to ber:" then 600 "hello"s; "world" lands past the cut.
        let text = format!("{}world", "hello ".repeat(600));
        p.translate(&text, "en", "ber", None).expect("translate");

        let log = factory.log();
        let input = log.inputs.last().expect("one run");
        assert_eq!(input.len(), 4 * max_len);
        let ids: Vec<i32> = input
            .chunks_exact(4)
            .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&ids[..5], &[7, 0, 0, 0, 0]);
        assert!(ids[5..].iter().all(|&id| id == 5));
        assert!(!ids.contains(&6));
    }
}
