use image::DynamicImage;

pub mod detection;
pub mod paddle;
pub mod pp;

pub use detection::{BoundingBox, Detection, Point};
pub use paddle::PaddleOcr;

/// A text detection + recognition engine.
///
/// Implementations return detections in reading order as produced by the
/// underlying model; callers must not assume any particular sort.
pub trait Ocr {
    fn recognize(&mut self, img: &DynamicImage) -> anyhow::Result<Vec<Detection>>;
}
