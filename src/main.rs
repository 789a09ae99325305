use std::io::Read;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;

use lite_translator::assets::DirAssets;
use lite_translator::bridge::{reply_json, TranslatorBridge};
use lite_translator::engine::delegate::NoAccelerator;
use lite_translator::engine::linear::PooledLinearFactory;
use lite_translator::language::model_language_code;
use lite_translator::pipeline::{
    init_default_config, ConfigOverrides, PipelineConfig, TranslationPipeline,
};
use lite_translator::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "lite-translator")]
#[command(about = "On-device text translator (local model, no network)", long_about = None)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Text to translate (default: read stdin)
    #[arg(value_name = "TEXT")]
    text: Option<String>,

    /// Source language (code or display name, e.g. en, English)
    #[arg(long, value_name = "LANG")]
    from: Option<String>,

    /// Target language (code or display name, e.g. ber, Tamazight)
    #[arg(long, value_name = "LANG")]
    to: Option<String>,

    /// Context tag: emergency, government or general
    #[arg(long)]
    context: Option<String>,

    /// Config file path (default: search for lite-translator.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the model and tokenizer files
    #[arg(long, value_name = "DIR")]
    asset_dir: Option<PathBuf>,

    /// Software inference threads (default: 4)
    #[arg(long)]
    threads: Option<usize>,

    /// Delegate policy: auto, software or accelerator
    #[arg(long)]
    delegate: Option<String>,

    /// Write prompt/token/output traces to the configured trace dir
    #[arg(long)]
    trace: bool,

    /// Print model info as JSON without loading the model, then exit
    #[arg(long)]
    info: bool,

    /// Suppress progress lines on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let cfg = PipelineConfig::resolve(ConfigOverrides {
        config_path: args.config.clone(),
        asset_dir: args.asset_dir.clone(),
        threads: args.threads,
        delegate: args.delegate.clone(),
        trace_prompts: args.trace.then_some(true),
        verbose: args.quiet.then_some(false),
    })
    .context("build config")?;

    let progress = ConsoleProgress::new(cfg.verbose);
    if let Some(p) = cfg.config_path.as_ref() {
        progress.info(format!("Config: {}", p.display()));
    }
    let assets = DirAssets::new(cfg.asset_dir.clone());
    let pipeline = TranslationPipeline::new(
        cfg,
        Box::new(assets),
        Box::new(PooledLinearFactory),
        Box::new(NoAccelerator),
        progress,
    );
    let bridge = TranslatorBridge::new(pipeline);

    if args.info {
        println!("{}", serde_json::to_string_pretty(&bridge.get_model_info())?);
        return Ok(());
    }

    let from = args
        .from
        .as_deref()
        .map(model_language_code)
        .ok_or_else(|| anyhow!("missing --from"))?;
    let to = args
        .to
        .as_deref()
        .map(model_language_code)
        .ok_or_else(|| anyhow!("missing --to"))?;
    let text = match args.text {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read text from stdin")?;
            buf.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    let init = bridge.initialize_model();
    if init.is_err() {
        println!("{}", reply_json(&init));
        std::process::exit(1);
    }

    let reply = bridge.translate(&text, &from, &to, args.context.as_deref());
    println!("{}", reply_json(&reply));

    let cleanup = bridge.cleanup();
    if let Err(e) = &cleanup {
        eprintln!("{e}");
    }
    if reply.is_err() {
        std::process::exit(1);
    }
    Ok(())
}
