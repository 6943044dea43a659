use anyhow::{bail, Error, Result};
use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f64 = 0.2;
pub const MAX_ZOOM: f64 = 2.0;
const ZOOM_IN_STEP: f64 = 1.2;
const ZOOM_OUT_STEP: f64 = 0.8;

/// Field location in natural (source bitmap) pixels, top-left origin.
///
/// Serialized as `[x, y, w, h]`. Values are never clamped: boxes may extend
/// past the page and may carry negative sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x, y, w, h]: [f64; 4]) -> Self {
        Self { x, y, w, h }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.x, bbox.y, bbox.w, bbox.h]
    }
}

impl BoundingBox {
    pub fn scaled(&self, scale_x: f64, scale_y: f64) -> Rect {
        Rect {
            x: self.x * scale_x,
            y: self.y * scale_y,
            w: self.w * scale_x,
            h: self.h * scale_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    /// `(x0, y0, x1, y1)` with `x0 <= x1` and `y0 <= y1`.
    pub fn edges(&self) -> (f64, f64, f64, f64) {
        let (x0, x1) = (self.x.min(self.x + self.w), self.x.max(self.x + self.w));
        let (y0, y1) = (self.y.min(self.y + self.h), self.y.max(self.y + self.h));
        (x0, y0, x1, y1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl TryFrom<i32> for Rotation {
    type Error = Error;

    fn try_from(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            _ => bail!("rotation must be a multiple of 90 degrees, got {degrees}"),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    pub fn rotate_cw(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    // Exact values so quarter turns compose without drift.
    fn cos_sin(self) -> (f64, f64) {
        match self {
            Self::Deg0 => (1.0, 0.0),
            Self::Deg90 => (0.0, 1.0),
            Self::Deg180 => (-1.0, 0.0),
            Self::Deg270 => (0.0, -1.0),
        }
    }
}

/// 2D affine transform in canvas convention:
/// `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    pub fn rotate(rotation: Rotation) -> Self {
        let (cos, sin) = rotation.cos_sin();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    /// Rotation about `(cx, cy)`: translate, rotate, translate back.
    pub fn rotate_about(rotation: Rotation, cx: f64, cy: f64) -> Self {
        Self::translate(cx, cy)
            .then(Self::rotate(rotation))
            .then(Self::translate(-cx, -cy))
    }

    /// `self * next`: `next` is applied to points first, like successive
    /// canvas `translate`/`rotate` calls.
    pub fn then(self, next: Affine) -> Self {
        Self {
            a: self.a * next.a + self.c * next.b,
            b: self.b * next.a + self.d * next.b,
            c: self.a * next.c + self.c * next.d,
            d: self.b * next.c + self.d * next.d,
            e: self.a * next.e + self.c * next.f + self.e,
            f: self.b * next.e + self.d * next.f + self.f,
        }
    }

    pub fn invert(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Self {
            a,
            b,
            c,
            d,
            e: -(a * self.e + c * self.f),
            f: -(b * self.e + d * self.f),
        })
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Axis-aligned bounds of the transformed rectangle. Exact for quarter turns.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let (x0, y0, x1, y1) = rect.edges();
        let corners = [
            self.map_point(x0, y0),
            self.map_point(x1, y0),
            self.map_point(x0, y1),
            self.map_point(x1, y1),
        ];
        let min_x = corners.iter().map(|c| c.0).fold(f64::MAX, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::MIN, f64::max);
        let min_y = corners.iter().map(|c| c.1).fold(f64::MAX, f64::min);
        let max_y = corners.iter().map(|c| c.1).fold(f64::MIN, f64::max);
        Rect {
            x: min_x,
            y: min_y,
            w: max_x - min_x,
            h: max_y - min_y,
        }
    }
}

/// Scale that shows the page at native size, or shrunk to fit the container.
/// Never upscales. `None` when either width is unusable.
pub fn fit_scale(natural_width: u32, container_width: f64) -> Option<f64> {
    if natural_width == 0 || !container_width.is_finite() || container_width <= 0.0 {
        return None;
    }
    Some((container_width / f64::from(natural_width)).min(1.0))
}

pub fn zoom_in(scale: f64) -> f64 {
    (scale * ZOOM_IN_STEP).min(MAX_ZOOM)
}

pub fn zoom_out(scale: f64) -> f64 {
    (scale * ZOOM_OUT_STEP).max(MIN_ZOOM)
}

pub fn overlay_size(natural: ImageSize, scale: f64) -> (u32, u32) {
    let w = (f64::from(natural.width) * scale).round().max(0.0) as u32;
    let h = (f64::from(natural.height) * scale).round().max(0.0) as u32;
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn fit_scale_shrinks_but_never_upscales() {
        let scale = fit_scale(2550, 850.0).unwrap();
        assert!(approx(scale, 1.0 / 3.0));
        assert_eq!(fit_scale(600, 850.0), Some(1.0));
        assert_eq!(fit_scale(0, 850.0), None);
        assert_eq!(fit_scale(2550, 0.0), None);
    }

    #[test]
    fn zoom_is_bounded() {
        assert!(approx(zoom_in(1.0), 1.2));
        assert_eq!(zoom_in(1.9), MAX_ZOOM);
        assert!(approx(zoom_out(1.0), 0.8));
        assert_eq!(zoom_out(0.21), MIN_ZOOM);
    }

    #[test]
    fn overlay_size_rounds_scaled_dimensions() {
        let natural = ImageSize {
            width: 2550,
            height: 3300,
        };
        assert_eq!(overlay_size(natural, 1.0 / 3.0), (850, 1100));
        assert_eq!(overlay_size(natural, 0.266), (678, 878));
        assert_eq!(overlay_size(natural, 2.0), (5100, 6600));
    }

    #[test]
    fn rotation_parses_quarter_turns_only() {
        assert_eq!(Rotation::try_from(0).unwrap(), Rotation::Deg0);
        assert_eq!(Rotation::try_from(360).unwrap(), Rotation::Deg0);
        assert_eq!(Rotation::try_from(-90).unwrap(), Rotation::Deg270);
        assert!(Rotation::try_from(45).is_err());

        let parsed: Rotation = serde_json::from_str("180").unwrap();
        assert_eq!(parsed, Rotation::Deg180);
        assert_eq!(serde_json::to_string(&Rotation::Deg90).unwrap(), "90");
    }

    #[test]
    fn four_quarter_turns_return_to_baseline() {
        let mut rotation = Rotation::Deg0;
        let mut transform = Affine::IDENTITY;
        for _ in 0..4 {
            rotation = rotation.rotate_cw();
            transform = transform.then(Affine::rotate_about(Rotation::Deg90, 425.0, 550.0));
        }
        assert_eq!(rotation, Rotation::Deg0);
        assert!(transform.is_identity());
    }

    #[test]
    fn rotate_about_center_keeps_center_fixed() {
        let t = Affine::rotate_about(Rotation::Deg90, 50.0, 30.0);
        assert_eq!(t.map_point(50.0, 30.0), (50.0, 30.0));
        // (60, 30) is 10 right of center; a clockwise quarter turn moves it 10 down.
        assert_eq!(t.map_point(60.0, 30.0), (50.0, 40.0));
    }

    #[test]
    fn map_rect_under_half_turn_mirrors_about_center() {
        let t = Affine::rotate_about(Rotation::Deg180, 50.0, 50.0);
        let mapped = t.map_rect(&Rect {
            x: 10.0,
            y: 20.0,
            w: 30.0,
            h: 5.0,
        });
        assert_eq!(
            mapped,
            Rect {
                x: 60.0,
                y: 75.0,
                w: 30.0,
                h: 5.0
            }
        );
    }

    #[test]
    fn invert_undoes_rotation() {
        let t = Affine::rotate_about(Rotation::Deg270, 12.0, 40.0);
        let inv = t.invert().unwrap();
        let (x, y) = t.map_point(3.0, 7.0);
        let (bx, by) = inv.map_point(x, y);
        assert!(approx(bx, 3.0) && approx(by, 7.0));
    }

    #[test]
    fn bounding_box_round_trips_as_array() {
        let bbox: BoundingBox = serde_json::from_str("[163, 157, 702, 20]").unwrap();
        assert_eq!(bbox.x, 163.0);
        assert_eq!(bbox.h, 20.0);
        assert_eq!(serde_json::to_value(bbox).unwrap(), serde_json::json!([163.0, 157.0, 702.0, 20.0]));
    }

    #[test]
    fn negative_sizes_normalize_edges() {
        let rect = Rect {
            x: 10.0,
            y: 10.0,
            w: -4.0,
            h: 2.0,
        };
        assert_eq!(rect.edges(), (6.0, 10.0, 10.0, 12.0));
    }
}
