use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ocr_batch::annotate::Annotator;
use ocr_batch::{onnx_init, process_directory, AppConfig, PaddleOcr};

/// Runs OCR over every image in a directory and writes annotated copies.
#[derive(Parser, Debug)]
#[command(name = "ocr_batch", version)]
struct Args {
    /// TOML config file; ignored when absent
    #[arg(long, short = 'c', default_value = "ocr_batch.toml")]
    config: PathBuf,

    /// Directory to read images from
    #[arg(long, short = 'i')]
    input_dir: Option<PathBuf>,

    /// Directory annotated images are written to
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Recognition language (en, ch, latin, korean, japan, cyrillic, arabic)
    #[arg(long)]
    lang: Option<String>,

    /// Directory holding the ONNX models and dictionaries
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Log level for diagnostics on stderr (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    fn apply(self, config: &mut AppConfig) {
        if let Some(dir) = self.input_dir {
            config.input_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(lang) = self.lang {
            config.language = lang;
        }
        if let Some(dir) = self.models_dir {
            config.models_dir = dir;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut config = AppConfig::load(&args.config)?;
    args.apply(&mut config);
    tracing::debug!(?config, "resolved configuration");

    onnx_init(config.onnxruntime.as_deref())?;
    let mut ocr = PaddleOcr::new(&config)?;
    let annotator = Annotator::from_config(config.font_path.as_deref())?;

    let stdout = io::stdout();
    process_directory(
        &config.input_dir,
        &config.output_dir,
        &mut ocr,
        &annotator,
        &mut stdout.lock(),
    )?;
    Ok(())
}
