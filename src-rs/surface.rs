use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};

use crate::geometry::{Affine, Rect, Rotation};

pub const GLYPH_SIZE: u32 = 8;

#[derive(Debug, Clone)]
pub struct OverlaySurface {
    image: RgbaImage,
    transform: Affine,
    saved: Vec<Affine>,
}

impl Default for OverlaySurface {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl OverlaySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            transform: Affine::IDENTITY,
            saved: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Reallocates the buffer. Like assigning a canvas size, this also
    /// drops any pending transform state.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
        self.transform = Affine::IDENTITY;
        self.saved.clear();
    }

    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    pub fn save(&mut self) {
        self.saved.push(self.transform);
    }

    pub fn restore(&mut self) {
        if let Some(previous) = self.saved.pop() {
            self.transform = previous;
        }
    }

    pub fn rotate_about_center(&mut self, rotation: Rotation) {
        let cx = f64::from(self.width()) / 2.0;
        let cy = f64::from(self.height()) / 2.0;
        self.transform = self
            .transform
            .then(Affine::rotate_about(rotation, cx, cy));
    }

    /// Runs `draw` with the surface rotated about its center, then restores
    /// the previous transform. No save/restore happens for `Deg0`.
    pub fn with_rotation<F>(&mut self, rotation: Rotation, draw: F)
    where
        F: FnOnce(&mut Self),
    {
        if rotation == Rotation::Deg0 {
            draw(self);
            return;
        }
        self.save();
        self.rotate_about_center(rotation);
        draw(self);
        self.restore();
    }

    /// Blends `color` over every pixel whose center falls inside the
    /// transformed rectangle. Out-of-bounds parts are dropped silently.
    pub fn fill_rect(&mut self, rect: &Rect, color: Rgba<u8>) {
        let (x0, y0, x1, y1) = self.transform.map_rect(rect).edges();
        let (w, h) = (i64::from(self.width()), i64::from(self.height()));
        let min_x = (x0.round() as i64).clamp(0, w);
        let max_x = (x1.round() as i64).clamp(0, w);
        let min_y = (y0.round() as i64).clamp(0, h);
        let max_y = (y1.round() as i64).clamp(0, h);
        for y in min_y..max_y {
            for x in min_x..max_x {
                let (px, py) = (x as u32, y as u32);
                let dst = *self.image.get_pixel(px, py);
                self.image.put_pixel(px, py, blend_pixel(dst, color));
            }
        }
    }

    /// Draws `text` with 8x8 glyphs, each glyph pixel a `scale`-sized cell.
    /// `(x, y)` is the top-left of the first glyph.
    pub fn draw_text(&mut self, x: f64, y: f64, text: &str, color: Rgba<u8>, scale: u32) {
        let cell = f64::from(scale.max(1));
        let advance = cell * f64::from(GLYPH_SIZE);
        let mut cursor_x = x;
        let mut cursor_y = y;
        for ch in text.chars() {
            if ch == '\n' {
                cursor_x = x;
                cursor_y += advance;
                continue;
            }
            let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
                cursor_x += advance;
                continue;
            };
            for (row_idx, row_bits) in glyph.iter().copied().enumerate() {
                for col_idx in 0..GLYPH_SIZE {
                    if (row_bits >> col_idx) & 1 == 0 {
                        continue;
                    }
                    let cell_rect = Rect {
                        x: cursor_x + f64::from(col_idx) * cell,
                        y: cursor_y + row_idx as f64 * cell,
                        w: cell,
                        h: cell,
                    };
                    self.fill_rect(&cell_rect, color);
                }
            }
            cursor_x += advance;
        }
    }
}

pub fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| (f64::from(d) * inv + f64::from(s) * a).round().clamp(0.0, 255.0) as u8;
    let out_a = (f64::from(dst[3]) * inv + f64::from(src[3]))
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([
        mix(dst[0], src[0]),
        mix(dst[1], src[1]),
        mix(dst[2], src[2]),
        out_a,
    ])
}

pub fn text_extent(text: &str, scale: u32) -> (u32, u32) {
    let scale = scale.max(1);
    let lines: Vec<&str> = text.split('\n').collect();
    let width_chars = lines
        .iter()
        .map(|line| line.chars().count() as u32)
        .max()
        .unwrap_or(0);
    let line_count = lines.len().max(1) as u32;
    let cell = GLYPH_SIZE.saturating_mul(scale);
    (
        width_chars.saturating_mul(cell),
        line_count.saturating_mul(cell),
    )
}
