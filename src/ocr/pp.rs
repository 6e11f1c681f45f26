use std::path::Path;

use anyhow::{anyhow, Context, Result};
use geo_clipper::{Clipper, EndType, JoinType};
use geo_types::{LineString, Polygon};
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::Contour;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::point::Point;
use ndarray::{Array, Array4};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct OcrItem {
    /// Corner points of the text box, clockwise from top-left.
    pub points: Vec<(u32, u32)>,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct TextBox {
    points: Vec<(u32, u32)>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct TextLine {
    pub text: String,
    pub text_score: f32,
}

const MEAN_VALS: [f32; 3] = [0.485 * 255.0, 0.456 * 255.0, 0.406 * 255.0];
const NORM_VALS: [f32; 3] = [
    1.0 / (0.229 * 255.0),
    1.0 / (0.224 * 255.0),
    1.0 / (0.225 * 255.0),
];
const CRNN_MEAN: [f32; 3] = [127.5, 127.5, 127.5];
const CRNN_NORM: [f32; 3] = [1.0 / 127.5, 1.0 / 127.5, 1.0 / 127.5];
const CRNN_HEIGHT: u32 = 48;

struct OnnxModel {
    session: Session,
}

impl OnnxModel {
    fn new(path: &Path, num_threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level2)?
            .with_intra_threads(num_threads)?
            .commit_from_file(path)
            .with_context(|| format!("failed to load model {}", path.display()))?;
        Ok(Self { session })
    }

    /// Runs the model and copies out the first output as `(shape, data)`.
    fn run(&mut self, input: Array4<f32>) -> Result<(Vec<i64>, Vec<f32>)> {
        let input_name = self.session.inputs[0].name.clone();
        let tensor = Tensor::from_array(input)?;
        let outputs = self.session.run(inputs![input_name => tensor])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok((shape.to_vec(), data.to_vec()))
    }
}

struct OcrUtils;

impl OcrUtils {
    fn normalize(img: &RgbImage, mean: &[f32], norm: &[f32]) -> Array4<f32> {
        let (width, height) = img.dimensions();
        let mut array = Array::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in img.enumerate_pixels() {
            for c in 0..3 {
                let val = pixel[c] as f32;
                array[[0, c, y as usize, x as usize]] = (val - mean[c]) * norm[c];
            }
        }
        array
    }

    fn pad_image(img: &RgbImage, padding: u32) -> RgbImage {
        if padding == 0 {
            return img.clone();
        }
        let (w, h) = img.dimensions();
        let mut padded =
            RgbImage::from_pixel(w + 2 * padding, h + 2 * padding, Rgb([255, 255, 255]));
        imageops::replace(&mut padded, img, padding as i64, padding as i64);
        padded
    }

    /// Perspective-crops the quadrilateral into an upright strip.
    fn get_crop(img: &RgbImage, points: &[(u32, u32)]) -> RgbImage {
        if points.len() != 4 {
            return img.clone();
        }
        let pts: Vec<(f32, f32)> = points.iter().map(|p| (p.0 as f32, p.1 as f32)).collect();

        let w = (pts[0].0 - pts[1].0).hypot(pts[0].1 - pts[1].1) as u32;
        let h = (pts[0].0 - pts[3].0).hypot(pts[0].1 - pts[3].1) as u32;
        if w == 0 || h == 0 {
            return img.clone();
        }

        let src = [pts[0], pts[1], pts[2], pts[3]];
        let dst = [
            (0.0, 0.0),
            (w as f32, 0.0),
            (w as f32, h as f32),
            (0.0, h as f32),
        ];

        let proj = Projection::from_control_points(src, dst).unwrap_or(Projection::scale(1.0, 1.0));
        let mut out = RgbImage::new(w, h);
        warp_into(
            img,
            &proj,
            Interpolation::Nearest,
            Rgb([255, 255, 255]),
            &mut out,
        );

        // Vertical text lines are rotated so the recognizer reads them left to right.
        if out.height() as f32 / out.width() as f32 > 1.5 {
            imageops::rotate90(&out)
        } else {
            out
        }
    }
}

// =======================================================
// Text detection (DBNet)
// =======================================================
struct DbNet {
    model: OnnxModel,
}

impl DbNet {
    fn forward(&mut self, img: &RgbImage, params: &DetectParams) -> Result<Vec<TextBox>> {
        let (w, h) = img.dimensions();
        let max_side = params.max_side_len.min(w.max(h)) + 2 * params.padding;
        let ratio = max_side as f32 / w.max(h) as f32;
        let (mut resize_w, mut resize_h) = ((w as f32 * ratio) as u32, (h as f32 * ratio) as u32);

        // DBNet wants both sides as multiples of 32.
        resize_w = (resize_w / 32).max(1) * 32;
        resize_h = (resize_h / 32).max(1) * 32;

        let resized = imageops::resize(img, resize_w, resize_h, imageops::FilterType::Triangle);
        let ratio_w = resize_w as f32 / w as f32;
        let ratio_h = resize_h as f32 / h as f32;

        let input = OcrUtils::normalize(&resized, &MEAN_VALS, &NORM_VALS);
        let (shape, data) = self.model.run(input)?;
        if shape.len() != 4 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        let out_h = shape[2] as usize;
        let out_w = shape[3] as usize;

        let bitmap: Vec<u8> = data
            .iter()
            .map(|&x| if x > params.box_thresh { 255 } else { 0 })
            .collect();
        let gray_img = GrayImage::from_vec(out_w as u32, out_h as u32, bitmap)
            .context("detector output does not match its shape")?;

        let contours = imageproc::contours::find_contours::<i32>(&gray_img);
        let mut boxes = Vec::new();

        for contour in contours {
            if contour.points.len() < 3 {
                continue;
            }
            let score = Self::box_score(&contour, &data, out_w, out_h);
            if score < params.box_score_thresh {
                continue;
            }

            let raw_box = Self::get_mini_box_points(&contour.points);
            if Self::side_len(&raw_box) < 3.0 {
                continue;
            }

            let unclipped_poly = Self::unclip(&raw_box, params.unclip_ratio);
            if unclipped_poly.len() < 3 {
                continue;
            }

            let rect_points = Self::get_mini_box_points(&unclipped_poly);
            if Self::side_len(&rect_points) < 3.0 {
                continue;
            }

            // Back to padded-image coordinates.
            let points: Vec<(u32, u32)> = rect_points
                .iter()
                .map(|p| {
                    (
                        (p.x / ratio_w).clamp(0.0, w as f32) as u32,
                        (p.y / ratio_h).clamp(0.0, h as f32) as u32,
                    )
                })
                .collect();

            boxes.push(TextBox { points });
        }
        Ok(boxes)
    }

    /// Mean probability inside the contour's polygon.
    fn box_score(contour: &Contour<i32>, pred: &[f32], w: usize, h: usize) -> f32 {
        let (xmin, ymin, xmax, ymax) = contour.points.iter().fold((w, h, 0, 0), |acc, p| {
            (
                acc.0.min(p.x as usize),
                acc.1.min(p.y as usize),
                acc.2.max(p.x as usize),
                acc.3.max(p.y as usize),
            )
        });
        if xmax < xmin || ymax < ymin {
            return 0.0;
        }
        let roi_w = xmax - xmin + 1;
        let roi_h = ymax - ymin + 1;

        let mut mask = GrayImage::new(roi_w as u32, roi_h as u32);
        let mut pts: Vec<_> = contour
            .points
            .iter()
            .map(|p| Point::new(p.x - xmin as i32, p.y - ymin as i32))
            .collect();
        // draw_polygon_mut panics on a closed point list.
        if pts.len() > 1 && pts.first() == pts.last() {
            pts.pop();
        }
        imageproc::drawing::draw_polygon_mut(&mut mask, &pts, Luma([1]));

        let mut sum = 0.0;
        let mut count = 0;
        for y in 0..roi_h {
            for x in 0..roi_w {
                if mask.get_pixel(x as u32, y as u32)[0] > 0 {
                    let idx = (ymin + y) * w + (xmin + x);
                    if idx < pred.len() {
                        sum += pred[idx];
                        count += 1;
                    }
                }
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    fn polygon_area(pts: &[Point<f32>]) -> f32 {
        if pts.is_empty() {
            return 0.0;
        }
        pts.iter()
            .zip(pts.iter().cycle().skip(1))
            .map(|(p0, p1)| (p1.x - p0.x) * (p1.y + p0.y))
            .sum::<f32>()
            / 2.0
    }

    fn polygon_len(pts: &[Point<f32>]) -> f32 {
        if pts.is_empty() {
            return 0.0;
        }
        pts.iter()
            .zip(pts.iter().cycle().skip(1))
            .map(|(p0, p1)| ((p0.x - p1.x).powi(2) + (p0.y - p1.y).powi(2)).sqrt())
            .sum()
    }

    fn get_mini_box_points(pts: &[Point<i32>]) -> Vec<Point<f32>> {
        let rect = imageproc::geometry::min_area_rect(pts);
        rect.iter()
            .map(|p| Point::new(p.x as f32, p.y as f32))
            .collect()
    }

    /// Grows the shrunk DBNet polygon back out by `area * ratio / perimeter`.
    fn unclip(points: &[Point<f32>], ratio: f32) -> Vec<Point<i32>> {
        let area = Self::polygon_area(points).abs();
        let len = Self::polygon_len(points);
        if len == 0.0 {
            return vec![];
        }
        let distance = area * ratio / len;

        let poly = Polygon::new(
            LineString::new(
                points
                    .iter()
                    .map(|p| geo_types::Coord {
                        x: p.x as f64,
                        y: p.y as f64,
                    })
                    .collect(),
            ),
            vec![],
        );
        let offset = poly.offset(
            distance as f64,
            JoinType::Round(2.0),
            EndType::ClosedPolygon,
            1.0,
        );

        offset
            .0
            .first()
            .map(|p| {
                p.exterior()
                    .points()
                    .map(|c| Point::new(c.x() as i32, c.y() as i32))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn side_len(pts: &[Point<f32>]) -> f32 {
        if pts.len() < 3 {
            return 0.0;
        }
        let w = ((pts[0].x - pts[1].x).powi(2) + (pts[0].y - pts[1].y).powi(2)).sqrt();
        let h = ((pts[1].x - pts[2].x).powi(2) + (pts[1].y - pts[2].y).powi(2)).sqrt();
        w.min(h)
    }
}

// =======================================================
// Text recognition (CRNN)
// =======================================================
struct CrnnNet {
    model: OnnxModel,
    keys: Vec<String>,
}

impl CrnnNet {
    fn predict(&mut self, img: &RgbImage) -> Result<TextLine> {
        let scale = CRNN_HEIGHT as f32 / img.height() as f32;
        let dst_w = ((img.width() as f32 * scale) as u32).max(1);
        let input_img = imageops::resize(img, dst_w, CRNN_HEIGHT, imageops::FilterType::Triangle);
        let tensor = OcrUtils::normalize(&input_img, &CRNN_MEAN, &CRNN_NORM);

        let (shape, data) = self.model.run(tensor)?;
        if shape.len() != 3 {
            return Err(anyhow!("unexpected recognizer output shape {:?}", shape));
        }
        let seq_len = shape[1] as usize;
        let num_classes = shape[2] as usize;

        Ok(ctc_greedy_decode(&data, seq_len, num_classes, &self.keys))
    }
}

/// Loads a PaddleOCR character dictionary: blank at index 0, space appended last.
pub(crate) fn load_keys(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dictionary {}", path.display()))?;
    Ok(keys_from_dictionary(&content))
}

pub(crate) fn keys_from_dictionary(content: &str) -> Vec<String> {
    let mut keys: Vec<String> = content.lines().map(|s| s.to_string()).collect();
    keys.insert(0, "#".into());
    keys.push(" ".into());
    keys
}

/// Best-path CTC decoding over a `[seq_len, num_classes]` probability matrix.
pub(crate) fn ctc_greedy_decode(
    data: &[f32],
    seq_len: usize,
    num_classes: usize,
    keys: &[String],
) -> TextLine {
    let mut text = String::new();
    let mut score_sum = 0.0;
    let mut valid_chars = 0;
    let mut last_idx = 0;

    for i in 0..seq_len {
        let start = i * num_classes;
        let Some(slice) = data.get(start..start + num_classes) else {
            break;
        };

        let (max_idx, max_val) = slice
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap_or((0, &0.0));

        if max_idx > 0 && max_idx < keys.len() && max_idx != last_idx {
            text.push_str(&keys[max_idx]);
            score_sum += max_val;
            valid_chars += 1;
        }
        last_idx = max_idx;
    }

    TextLine {
        text,
        text_score: if valid_chars > 0 {
            score_sum / valid_chars as f32
        } else {
            0.0
        },
    }
}

// =======================================================
// Entry point
// =======================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectParams {
    pub padding: u32,
    pub max_side_len: u32,
    pub box_score_thresh: f32,
    pub box_thresh: f32,
    pub unclip_ratio: f32,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            padding: 50,
            max_side_len: 960,
            box_score_thresh: 0.5,
            box_thresh: 0.3,
            unclip_ratio: 1.5,
        }
    }
}

pub struct OcrLite {
    db: DbNet,
    crnn: CrnnNet,
}

impl OcrLite {
    pub fn new(det_model: &Path, rec_model: &Path, keys: &Path, num_threads: usize) -> Result<Self> {
        Ok(Self {
            db: DbNet {
                model: OnnxModel::new(det_model, num_threads)?,
            },
            crnn: CrnnNet {
                model: OnnxModel::new(rec_model, num_threads)?,
                keys: load_keys(keys)?,
            },
        })
    }

    pub fn detect(&mut self, img: &RgbImage, params: &DetectParams) -> Result<Vec<OcrItem>> {
        if img.width() == 0 || img.height() == 0 {
            return Ok(vec![]);
        }
        let padded_img = OcrUtils::pad_image(img, params.padding);

        let boxes = self.db.forward(&padded_img, params)?;

        let mut results = Vec::with_capacity(boxes.len());
        for b in boxes {
            let part_img = OcrUtils::get_crop(&padded_img, &b.points);
            let rec_res = self.crnn.predict(&part_img)?;

            // Undo the padding so points land on the caller's image.
            let real_points: Vec<(u32, u32)> = b
                .points
                .iter()
                .map(|p| {
                    (
                        p.0.saturating_sub(params.padding),
                        p.1.saturating_sub(params.padding),
                    )
                })
                .collect();

            results.push(OcrItem {
                points: real_points,
                text: rec_res.text,
                score: rec_res.text_score,
            });
        }

        Ok(results)
    }
}
