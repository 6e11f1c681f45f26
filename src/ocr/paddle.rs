use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use image::DynamicImage;

use super::pp::{DetectParams, OcrLite};
use super::{Detection, Point};
use crate::config::AppConfig;

/// Detection model, shared by every language.
pub const DET_MODEL: &str = "ch_PP-OCRv4_det_infer.onnx";

/// `(language, recognition model, character dictionary)`
const LANGUAGES: [(&str, &str, &str); 7] = [
    ("en", "en_PP-OCRv4_rec_infer.onnx", "en_dict.txt"),
    ("ch", "ch_PP-OCRv4_rec_infer.onnx", "ppocr_keys_v1.txt"),
    ("latin", "latin_PP-OCRv3_rec_infer.onnx", "latin_dict.txt"),
    ("korean", "korean_PP-OCRv3_rec_infer.onnx", "korean_dict.txt"),
    ("japan", "japan_PP-OCRv3_rec_infer.onnx", "japan_dict.txt"),
    ("cyrillic", "cyrillic_PP-OCRv3_rec_infer.onnx", "cyrillic_dict.txt"),
    ("arabic", "arabic_PP-OCRv3_rec_infer.onnx", "arabic_dict.txt"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ModelPaths {
    pub det: PathBuf,
    pub rec: PathBuf,
    pub keys: PathBuf,
}

pub fn supported_languages() -> impl Iterator<Item = &'static str> {
    LANGUAGES.iter().map(|(id, _, _)| *id)
}

/// Resolves and checks the model files for `language` under `models_dir`.
pub fn model_paths(models_dir: &Path, language: &str) -> Result<ModelPaths> {
    let (_, rec, keys) = LANGUAGES
        .iter()
        .find(|(id, _, _)| id.eq_ignore_ascii_case(language))
        .ok_or_else(|| {
            anyhow!(
                "unsupported OCR language {:?} (expected one of: {})",
                language,
                supported_languages().collect::<Vec<_>>().join(", ")
            )
        })?;

    let paths = ModelPaths {
        det: models_dir.join(DET_MODEL),
        rec: models_dir.join(rec),
        keys: models_dir.join(keys),
    };
    for (what, p) in [
        ("detection model", &paths.det),
        ("recognition model", &paths.rec),
        ("character dictionary", &paths.keys),
    ] {
        if !p.is_file() {
            return Err(anyhow!("{} not found: {}", what, p.display()));
        }
    }
    Ok(paths)
}

/// PaddleOCR detector + recognizer running on ONNX Runtime.
pub struct PaddleOcr {
    engine: OcrLite,
    params: DetectParams,
    min_confidence: f32,
}

impl PaddleOcr {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let paths = model_paths(&config.models_dir, &config.language)?;
        tracing::info!(
            language = %config.language,
            det = %paths.det.display(),
            rec = %paths.rec.display(),
            "loading OCR models"
        );
        let engine = OcrLite::new(&paths.det, &paths.rec, &paths.keys, config.num_threads)?;
        Ok(Self {
            engine,
            params: config.detect.clone(),
            min_confidence: config.min_confidence,
        })
    }
}

impl super::Ocr for PaddleOcr {
    fn recognize(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        let items = self.engine.detect(&img.to_rgb8(), &self.params)?;

        let mut result = Vec::with_capacity(items.len());
        for item in items {
            if item.score < self.min_confidence {
                tracing::debug!(text = %item.text, score = item.score, "below min_confidence");
                continue;
            }
            let points: Vec<Point> = item.points.iter().copied().map(Point::from).collect();
            let Ok(region) = <[Point; 4]>::try_from(points) else {
                tracing::debug!(text = %item.text, "discarding non-quadrilateral box");
                continue;
            };
            result.push(Detection::new(region, item.text, item.score));
        }
        Ok(result)
    }
}
