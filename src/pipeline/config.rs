use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::{find_default_config, load_config, AppConfig, CONFIG_ENV, CONFIG_FILENAME};
use crate::engine::delegate::{DelegatePolicy, DEFAULT_SOFTWARE_THREADS};
use crate::engine::EngineSettings;
use crate::tokenizer::{VocabPolicy, DEFAULT_MAX_SEQUENCE_LENGTH};

use super::prompts::DEFAULT_TRANSLATE_TEMPLATE;

pub const DEFAULT_MODEL_FILE: &str = "translator.safetensors";
pub const DEFAULT_TOKENIZER_FILE: &str = "tokenizer.json";
pub const DEFAULT_MODEL_VERSION: &str = "lite-translator-v1.0";
pub const DEFAULT_VOCAB_SIZE: usize = 32000;
pub const DEFAULT_PROMPT_FILE: &str = "prompts/translate.txt";

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub config_path: Option<PathBuf>,
    pub asset_dir: PathBuf,
    pub model_file: String,
    pub tokenizer_file: String,
    pub model_version: String,
    pub model_sha256: Option<String>,
    pub max_sequence_length: usize,
    pub vocab_size: usize,
    pub threads: usize,
    pub delegate: DelegatePolicy,
    pub vocab_policy: VocabPolicy,
    pub verbose: bool,
    pub trace_dir: PathBuf,
    pub trace_prompts: bool,
    pub prompt_template: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            asset_dir: PathBuf::from("."),
            model_file: DEFAULT_MODEL_FILE.to_string(),
            tokenizer_file: DEFAULT_TOKENIZER_FILE.to_string(),
            model_version: DEFAULT_MODEL_VERSION.to_string(),
            model_sha256: None,
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            vocab_size: DEFAULT_VOCAB_SIZE,
            threads: DEFAULT_SOFTWARE_THREADS,
            delegate: DelegatePolicy::Auto,
            vocab_policy: VocabPolicy::Lenient,
            verbose: true,
            trace_dir: PathBuf::from("_trace"),
            trace_prompts: false,
            prompt_template: DEFAULT_TRANSLATE_TEMPLATE.to_string(),
        }
    }
}

/// Command-line values that win over the config file.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub asset_dir: Option<PathBuf>,
    pub threads: Option<usize>,
    pub delegate: Option<String>,
    pub trace_prompts: Option<bool>,
    pub verbose: Option<bool>,
}

impl PipelineConfig {
    /// Finds and loads the config file (explicit path, then `LITE_TRANSLATOR_CONFIG`,
    /// then an upward search for `lite-translator.toml`) and applies overrides.
    pub fn resolve(overrides: ConfigOverrides) -> anyhow::Result<Self> {
        let cfg_file = overrides
            .config_path
            .clone()
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(CONFIG_FILENAME));

        let (file_cfg, config_dir) = match cfg_file.as_ref() {
            Some(p) if p.exists() => (load_config(p)?, config_dir_of(p)),
            Some(p) if overrides.config_path.is_some() => {
                return Err(anyhow!("config file not found: {}", p.display()));
            }
            _ => (
                AppConfig::default(),
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            ),
        };

        let mut cfg = Self::from_app_config(&file_cfg, &config_dir)?;
        cfg.config_path = cfg_file.filter(|p| p.exists());
        cfg.apply(overrides);
        Ok(cfg)
    }

    pub fn from_app_config(file_cfg: &AppConfig, config_dir: &Path) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let m = &file_cfg.model;

        let asset_dir = file_cfg
            .assets
            .dir
            .clone()
            .map(|p| if p.is_relative() { config_dir.join(p) } else { p })
            .unwrap_or_else(|| config_dir.to_path_buf());

        let trace_dir = file_cfg
            .pipeline
            .trace_dir
            .clone()
            .map(PathBuf::from)
            .unwrap_or(defaults.trace_dir);
        let trace_dir = if trace_dir.is_absolute() {
            trace_dir
        } else {
            config_dir.join(trace_dir)
        };

        let prompt_template = match file_cfg.prompts.translate.as_deref() {
            Some(rel) => read_prompt(config_dir, rel)?,
            None => defaults.prompt_template,
        };

        Ok(Self {
            config_path: None,
            asset_dir,
            model_file: non_empty(m.file.as_deref()).unwrap_or(defaults.model_file),
            tokenizer_file: non_empty(m.tokenizer_file.as_deref())
                .unwrap_or(defaults.tokenizer_file),
            model_version: non_empty(m.version.as_deref()).unwrap_or(defaults.model_version),
            model_sha256: non_empty(m.sha256.as_deref()),
            max_sequence_length: m
                .max_sequence_length
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_sequence_length),
            vocab_size: m.vocab_size.filter(|n| *n > 0).unwrap_or(defaults.vocab_size),
            threads: file_cfg
                .runtime
                .threads
                .filter(|n| *n > 0)
                .unwrap_or(defaults.threads),
            delegate: DelegatePolicy::parse(file_cfg.runtime.delegate.as_deref()),
            vocab_policy: VocabPolicy::parse(file_cfg.tokenizer.vocab_policy.as_deref()),
            verbose: file_cfg.pipeline.verbose.unwrap_or(defaults.verbose),
            trace_dir,
            trace_prompts: file_cfg.pipeline.trace_prompts.unwrap_or(defaults.trace_prompts),
            prompt_template,
        })
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(dir) = overrides.asset_dir {
            self.asset_dir = dir;
        }
        if let Some(threads) = overrides.threads.filter(|n| *n > 0) {
            self.threads = threads;
        }
        if let Some(d) = overrides.delegate.as_deref() {
            self.delegate = DelegatePolicy::parse(Some(d));
        }
        if let Some(t) = overrides.trace_prompts {
            self.trace_prompts = t;
        }
        if let Some(v) = overrides.verbose {
            self.verbose = v;
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            vocab_size: self.vocab_size,
            threads: self.threads,
            delegate: self.delegate,
            model_sha256: self.model_sha256.clone(),
        }
    }
}

fn config_dir_of(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn read_prompt(config_dir: &Path, rel: &str) -> anyhow::Result<String> {
    let mut p = PathBuf::from(rel);
    if p.is_relative() {
        p = config_dir.join(&p);
    }
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found: {} (run: lite-translator --init-config)",
            p.display()
        ));
    }
    let text =
        std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);

    let prompt_path = dir.join(DEFAULT_PROMPT_FILE);
    if let Some(parent) = prompt_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create prompts dir: {}", parent.display()))?;
    }
    if !prompt_path.exists() || force {
        std::fs::write(&prompt_path, format!("{DEFAULT_TRANSLATE_TEMPLATE}\n"))
            .with_context(|| format!("write prompt: {}", prompt_path.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }

    let cfg_text = format!(
        r#"[model]
file = "{DEFAULT_MODEL_FILE}"
tokenizer_file = "{DEFAULT_TOKENIZER_FILE}"
version = "{DEFAULT_MODEL_VERSION}"
max_sequence_length = {DEFAULT_MAX_SEQUENCE_LENGTH}
vocab_size = {DEFAULT_VOCAB_SIZE}
# sha256 = "<hex digest of the model file>"

[runtime]
# "auto": use an acceleration delegate when the device offers one.
# "software": always run on CPU threads. "accelerator": fail without a delegate.
delegate = "auto"
threads = {DEFAULT_SOFTWARE_THREADS}

[assets]
dir = "assets"

[tokenizer]
# "lenient": a tokenizer.json without model.vocab loads as an empty vocabulary.
# "strict": refuse to load it.
vocab_policy = "lenient"

[pipeline]
verbose = true
trace_dir = "_trace"
trace_prompts = false

[prompts]
translate = "{DEFAULT_PROMPT_FILE}"
"#
    );

    std::fs::write(&cfg_path, cfg_text)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}
