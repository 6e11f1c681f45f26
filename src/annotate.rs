use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};

use crate::ocr::{BoundingBox, Detection};

/// Accent colour for boxes and labels (blue).
pub const ACCENT: Rgb<u8> = Rgb([0, 0, 255]);
pub const FONT_SIZE: f32 = 12.0;
/// Gap between the label baseline and the top edge of its box.
pub const LABEL_OFFSET: i32 = 5;

/// Embedded DejaVu Sans, used when no font is configured.
const FONT_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

pub fn load_font(path: &Path) -> Result<Font<'static>> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    Font::try_from_vec(bytes).ok_or_else(|| anyhow!("not a usable font: {}", path.display()))
}

pub fn embedded_font() -> Result<Font<'static>> {
    Font::try_from_bytes(FONT_DATA).ok_or_else(|| anyhow!("embedded font is corrupt"))
}

pub struct Annotator {
    font: Font<'static>,
    scale: Scale,
    color: Rgb<u8>,
}

impl Annotator {
    pub fn new(font: Font<'static>) -> Self {
        Self {
            font,
            scale: Scale::uniform(FONT_SIZE),
            color: ACCENT,
        }
    }

    pub fn embedded() -> Result<Self> {
        Ok(Self::new(embedded_font()?))
    }

    /// Uses `font_path` when given, otherwise the embedded font.
    pub fn from_config(font_path: Option<&Path>) -> Result<Self> {
        match font_path {
            Some(path) => {
                tracing::debug!(font = %path.display(), "using configured font");
                Ok(Self::new(load_font(path)?))
            }
            None => Self::embedded(),
        }
    }

    /// Draws `bbox` and the detection text with its baseline above the box.
    pub fn annotate(&self, img: &mut RgbImage, detection: &Detection, bbox: &BoundingBox) {
        let rect = Rect::at(bbox.x_min, bbox.y_min).of_size(bbox.width(), bbox.height());
        draw_hollow_rect_mut(img, rect, self.color);

        if detection.text.is_empty() {
            return;
        }
        // draw_text_mut positions by the glyph box top, so lift it by the ascent.
        let ascent = self.font.v_metrics(self.scale).ascent.round() as i32;
        let baseline = bbox.y_min - LABEL_OFFSET;
        draw_text_mut(
            img,
            self.color,
            bbox.x_min,
            baseline - ascent,
            self.scale,
            &self.font,
            &detection.text,
        );
    }
}
