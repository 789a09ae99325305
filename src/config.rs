use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILENAME: &str = "lite-translator.toml";
pub const CONFIG_ENV: &str = "LITE_TRANSLATOR_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub assets: AssetsSection,
    #[serde(default)]
    pub tokenizer: TokenizerSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ModelSection {
    /// Model weights asset name.
    #[serde(default)]
    pub file: Option<String>,
    /// Tokenizer configuration asset name.
    #[serde(default)]
    pub tokenizer_file: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Optional hex SHA-256 the weights must match.
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub max_sequence_length: Option<usize>,
    #[serde(default)]
    pub vocab_size: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RuntimeSection {
    /// Software thread count when no delegate is used.
    #[serde(default)]
    pub threads: Option<usize>,
    /// "auto", "software" or "accelerator".
    #[serde(default)]
    pub delegate: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AssetsSection {
    /// Directory holding the model and tokenizer files. Relative paths resolve
    /// against the config file directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TokenizerSection {
    /// "lenient" (missing token table gives an empty vocabulary) or "strict".
    #[serde(default)]
    pub vocab_policy: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    #[serde(default)]
    pub verbose: Option<bool>,
    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub trace_prompts: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    /// Path to a prompt template file overriding the built-in one.
    #[serde(default)]
    pub translate: Option<String>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> anyhow::Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(text).context("parse config toml")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::{find_file_upwards, parse_config};

    #[test]
    fn empty_config_is_all_defaults() {
        let cfg = parse_config("").expect("parse");
        assert!(cfg.model.file.is_none());
        assert!(cfg.runtime.threads.is_none());
        assert!(cfg.assets.dir.is_none());
    }

    #[test]
    fn sections_parse() {
        let cfg = parse_config(
            r#"
[model]
file = "m.safetensors"
max_sequence_length = 128
vocab_size = 8

[runtime]
threads = 2
delegate = "software"

[assets]
dir = "assets"

[tokenizer]
vocab_policy = "strict"

[pipeline]
trace_prompts = true
"#,
        )
        .expect("parse");
        assert_eq!(cfg.model.file.as_deref(), Some("m.safetensors"));
        assert_eq!(cfg.model.max_sequence_length, Some(128));
        assert_eq!(cfg.runtime.delegate.as_deref(), Some("software"));
        assert_eq!(cfg.tokenizer.vocab_policy.as_deref(), Some("strict"));
        assert_eq!(cfg.pipeline.trace_prompts, Some(true));
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(parse_config("[runtime]\nthreads = \"four\"").is_err());
    }

    #[test]
    fn upward_search_stops_at_root() {
        let dir = std::env::temp_dir().join(format!("lt-cfg-{}", std::process::id()));
        let nested = dir.join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.join("x.toml"), "").expect("write");
        assert_eq!(find_file_upwards(&nested, "x.toml", 4), Some(dir.join("x.toml")));
        assert_eq!(find_file_upwards(&nested, "x.toml", 1), None);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
