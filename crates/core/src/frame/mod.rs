use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle, `x`/`y` being its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Row-major grid of packed RGB565 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
    width: usize,
    height: usize,
    pixels: Vec<u16>,
}

impl PixelFrame {
    /// Creates a black frame.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    /// Wraps existing pixels. Returns `None` when the length does not match.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u16>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u16] {
        &mut self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.pixels[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: u16) {
        self.pixels[y * self.width + x] = value;
    }

    pub fn row(&self, y: usize) -> &[u16] {
        let start = y * self.width;
        &self.pixels[start..start + self.width]
    }

    pub fn fill(&mut self, value: u16) {
        self.pixels.fill(value);
    }

    /// Overwrites this frame with `other`. Both must share the same geometry.
    pub fn copy_from(&mut self, other: &PixelFrame) {
        self.pixels.copy_from_slice(&other.pixels);
    }

    /// Smallest rectangle spanning every differing row and every differing
    /// column, or `None` when the frames are identical.
    pub fn changed_region(&self, previous: &PixelFrame) -> Option<Rect> {
        let mut rows: Option<(usize, usize)> = None;
        let mut cols: Option<(usize, usize)> = None;

        for y in 0..self.height {
            let current = self.row(y);
            let before = previous.row(y);
            let Some(first) = current.iter().zip(before).position(|(a, b)| a != b) else {
                continue;
            };
            let last = current
                .iter()
                .zip(before)
                .rposition(|(a, b)| a != b)
                .unwrap_or(first);

            rows = Some(rows.map_or((y, y), |(top, _)| (top, y)));
            cols = Some(cols.map_or((first, last), |(left, right)| {
                (left.min(first), right.max(last))
            }));
        }

        let ((top, bottom), (left, right)) = (rows?, cols?);
        Some(Rect {
            x: left,
            y: top,
            width: right - left + 1,
            height: bottom - top + 1,
        })
    }
}
