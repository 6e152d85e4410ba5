use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use glossary_mask::config::{resolve_config, AppConfig};
use glossary_mask::{GlossaryPipeline, GlossarySnapshot, Segment};

const LOG_ENV: &str = "GLOSSARY_MASK_LOG";

#[derive(Parser, Debug)]
#[command(name = "glossary-mask")]
#[command(about = "Mask glossary terms before machine translation and restore them after", long_about = None)]
struct Args {
    /// Glossary snapshot JSON (terms + patterns)
    #[arg(long, value_name = "JSON")]
    glossary: PathBuf,

    /// Config file path (default: search for glossary-mask.toml upwards, or GLOSSARY_MASK_CONFIG)
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mask segments and print one prepared segment per line as JSON
    Mask {
        /// A single segment
        #[arg(long, conflicts_with = "input")]
        text: Option<String>,

        /// A text file; every line is one segment
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Restore a translated segment against its source
    Restore {
        /// Source segment, masked again with fresh token ids
        #[arg(long)]
        source: String,

        /// Translator output for that segment
        #[arg(long)]
        translated: String,
    },
}

fn init_logging(cfg: &AppConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .ok()
        .or_else(|| cfg.log_filter().and_then(|f| EnvFilter::try_new(f).ok()))
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = resolve_config(args.config.as_deref())?;
    init_logging(&cfg);

    let snapshot = GlossarySnapshot::load(&args.glossary)?;
    let mut pipeline = GlossaryPipeline::new(&snapshot, cfg.pipeline_options())?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.command {
        Command::Mask { text, input } => {
            let lines: Vec<String> = match (text, input) {
                (Some(t), _) => vec![t],
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("read input: {}", path.display()))?
                    .lines()
                    .map(str::to_string)
                    .collect(),
                (None, None) => return Err(anyhow::anyhow!("mask requires --text or --input")),
            };
            for (i, line) in lines.into_iter().enumerate() {
                let prepared = pipeline.prepare(Segment::new(format!("s{}", i + 1), line));
                let json = serde_json::to_string(&prepared).context("serialize prepared segment")?;
                writeln!(out, "{json}").context("write stdout")?;
            }
        }
        Command::Restore { source, translated } => {
            let prepared = pipeline.prepare(Segment::new("s1", source));
            let restored = pipeline.restore(&prepared, &translated);
            let json =
                serde_json::to_string_pretty(&restored).context("serialize restored segment")?;
            writeln!(out, "{json}").context("write stdout")?;
        }
    }
    Ok(())
}
