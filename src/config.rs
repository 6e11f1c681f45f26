use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ::config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::ocr::pp::DetectParams;

pub const INPUT_DIR: &str = "content";
pub const OUTPUT_DIR: &str = "results";
pub const LANGUAGE: &str = "en";
pub const MODELS_DIR: &str = "models";

/// Runtime settings. Every field has a default, so an absent or partial
/// config file is fine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub language: String,
    pub models_dir: PathBuf,
    /// ONNX Runtime shared library; falls back to `ORT_DYLIB_PATH` / the system search path.
    pub onnxruntime: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
    pub num_threads: usize,
    pub min_confidence: f32,
    pub detect: DetectParams,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(INPUT_DIR),
            output_dir: PathBuf::from(OUTPUT_DIR),
            language: LANGUAGE.to_string(),
            models_dir: PathBuf::from(MODELS_DIR),
            onnxruntime: None,
            font_path: None,
            num_threads: 4,
            min_confidence: 0.0,
            detect: DetectParams::default(),
        }
    }
}

impl AppConfig {
    /// Layers the TOML file at `path` (if it exists) over the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?;

        config
            .try_deserialize()
            .with_context(|| format!("invalid config {}", path.display()))
    }
}
