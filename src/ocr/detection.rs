#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<(u32, u32)> for Point {
    fn from(p: (u32, u32)) -> Self {
        Self::new(p.0 as f32, p.1 as f32)
    }
}

/// One engine result: a quadrilateral region, its text and a confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub region: [Point; 4],
    pub text: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(region: [Point; 4], text: impl Into<String>, confidence: f32) -> Self {
        Self {
            region,
            text: text.into(),
            confidence,
        }
    }

    /// Axis-aligned box around the region. Coordinates are truncated toward zero.
    pub fn bounding_box(&self) -> BoundingBox {
        let (x_min, y_min, x_max, y_max) = self.region.iter().fold(
            (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
            |acc, p| {
                (
                    acc.0.min(p.x),
                    acc.1.min(p.y),
                    acc.2.max(p.x),
                    acc.3.max(p.y),
                )
            },
        );
        BoundingBox {
            x_min: x_min as i32,
            y_min: y_min as i32,
            x_max: x_max as i32,
            y_max: y_max as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    /// Width in pixels, counting both edges.
    pub fn width(&self) -> u32 {
        (self.x_max - self.x_min).max(0) as u32 + 1
    }

    pub fn height(&self) -> u32 {
        (self.y_max - self.y_min).max(0) as u32 + 1
    }
}
