use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a single file without stopping the batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("could not read {}: {source}", path.display())]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{reason}")]
    Ocr { path: PathBuf, reason: String },
    #[error("failed to save {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BatchError {
    pub fn path(&self) -> &PathBuf {
        match self {
            BatchError::UnreadableImage { path, .. }
            | BatchError::Ocr { path, .. }
            | BatchError::Save { path, .. }
            | BatchError::OutputDir { path, .. } => path,
        }
    }

    /// Short tag used in diagnostic logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BatchError::UnreadableImage { .. } => "unreadable_image",
            BatchError::Ocr { .. } => "ocr",
            BatchError::Save { .. } => "save",
            BatchError::OutputDir { .. } => "output_dir",
        }
    }
}
