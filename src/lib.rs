use std::path::Path;

use anyhow::{Context, Result};

pub mod annotate;
pub mod config;
pub mod error;
pub mod files;
pub mod ocr;
pub mod pipeline;
pub mod report;

pub use config::AppConfig;
pub use error::BatchError;
pub use ocr::{Detection, Ocr, PaddleOcr};
pub use pipeline::{process_directory, BatchSummary};

/// Points `ort` at an explicit ONNX Runtime library. Without it the loader
/// uses `ORT_DYLIB_PATH` or the platform search path.
pub fn onnx_init(dylib: Option<&Path>) -> Result<()> {
    if let Some(path) = dylib {
        ort::init_from(path.to_string_lossy())
            .commit()
            .with_context(|| format!("failed to load ONNX Runtime from {}", path.display()))?;
    }
    Ok(())
}
