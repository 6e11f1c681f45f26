use std::fmt;

use crate::ocr::{BoundingBox, Detection};

pub const NO_TEXT: &str = "No text detected.";

const HEADERS: [&str; 6] = ["Text", "Confidence", "X_min", "Y_min", "X_max", "Y_max"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub text: String,
    /// Two-decimal rendering of the engine confidence.
    pub confidence: String,
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl ReportRow {
    pub fn new(detection: &Detection, bbox: &BoundingBox) -> Self {
        Self {
            text: detection.text.clone(),
            confidence: format_confidence(detection.confidence),
            x_min: bbox.x_min,
            y_min: bbox.y_min,
            x_max: bbox.x_max,
            y_max: bbox.y_max,
        }
    }

    fn cells(&self) -> [String; 6] {
        [
            self.text.clone(),
            self.confidence.clone(),
            self.x_min.to_string(),
            self.y_min.to_string(),
            self.x_max.to_string(),
            self.y_max.to_string(),
        ]
    }
}

pub fn format_confidence(confidence: f32) -> String {
    format!("{:.2}", confidence)
}

/// Rows for one image, in detection order.
#[derive(Debug, Default, Clone)]
pub struct Report {
    rows: Vec<ReportRow>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ReportRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Right-aligned table with a header line and no index column, or
/// [`NO_TEXT`] when there are no rows.
impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str(NO_TEXT);
        }

        let cells: Vec<[String; 6]> = self.rows.iter().map(ReportRow::cells).collect();
        let mut widths = HEADERS.map(|h| h.chars().count());
        for row in &cells {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        write_line(f, &HEADERS, &widths)?;
        for row in &cells {
            f.write_str("\n")?;
            write_line(f, row, &widths)?;
        }
        Ok(())
    }
}

fn write_line<S: AsRef<str>>(f: &mut fmt::Formatter<'_>, cells: &[S], widths: &[usize]) -> fmt::Result {
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        let cell = cell.as_ref();
        let pad = width.saturating_sub(cell.chars().count());
        write!(f, "{:pad$}{}", "", cell, pad = pad)?;
    }
    Ok(())
}
