use image::{imageops, RgbaImage};
use serde::Serialize;

use crate::geometry::{overlay_size, Affine, ImageSize, Rect, Rotation};
use crate::session::{ActiveField, FormField};
use crate::style::RenderStyle;
use crate::surface::{blend_pixel, text_extent, OverlaySurface, GLYPH_SIZE};

#[derive(Debug, Clone, Copy)]
pub struct OverlayInputs<'a> {
    pub image: Option<ImageSize>,
    pub scale: f64,
    pub rotation: Rotation,
    pub page: u32,
    pub active: Option<&'a ActiveField>,
    pub fields: &'a [FormField],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawnValue {
    pub name: String,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: u32,
    pub height: u32,
    pub glyph_scale: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub width: u32,
    pub height: u32,
    pub scale_x: f64,
    pub scale_y: f64,
    pub rotation: Rotation,
    pub page: u32,
    pub highlight: Option<Rect>,
    pub values: Vec<DrawnValue>,
}

impl FrameReport {
    fn blank(width: u32, height: u32, inputs: &OverlayInputs<'_>) -> Self {
        Self {
            width,
            height,
            scale_x: 0.0,
            scale_y: 0.0,
            rotation: inputs.rotation,
            page: inputs.page,
            highlight: None,
            values: Vec::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.highlight.is_none() && self.values.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HighlightRenderer {
    surface: OverlaySurface,
    style: RenderStyle,
}

impl HighlightRenderer {
    pub fn new(style: RenderStyle) -> Self {
        Self {
            surface: OverlaySurface::default(),
            style,
        }
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    pub fn surface(&self) -> &OverlaySurface {
        &self.surface
    }

    pub fn repaint(&mut self, inputs: &OverlayInputs<'_>) -> FrameReport {
        let Some(natural) = inputs.image else {
            self.surface.clear();
            return FrameReport::blank(self.surface.width(), self.surface.height(), inputs);
        };

        let (width, height) = overlay_size(natural, inputs.scale);
        if (width, height) == (self.surface.width(), self.surface.height()) {
            self.surface.clear();
        } else {
            self.surface.resize(width, height);
        }

        let active = inputs.active.filter(|field| field.page == inputs.page);
        let values: Vec<&FormField> = inputs
            .fields
            .iter()
            .filter(|field| field.filled && field.page == inputs.page)
            .collect();
        if active.is_none() && values.is_empty() {
            return FrameReport::blank(width, height, inputs);
        }

        // Kept separate so a non-uniform fit cannot silently distort boxes.
        let scale_x = f64::from(width) / f64::from(natural.width.max(1));
        let scale_y = f64::from(height) / f64::from(natural.height.max(1));

        let mut report = FrameReport::blank(width, height, inputs);
        report.scale_x = scale_x;
        report.scale_y = scale_y;

        if let Some(field) = active {
            let mut rect = field.bounding_box.scaled(scale_x, scale_y);
            rect.h += self.style.height_pad;
            let color = self.style.highlight;
            self.surface
                .with_rotation(inputs.rotation, |surface| surface.fill_rect(&rect, color));
            report.highlight = Some(rect);
        }

        let glyph_scale = ((self.style.value_size * scale_x) / f64::from(GLYPH_SIZE))
            .round()
            .max(1.0) as u32;
        let offset = self.style.value_offset;
        let color = self.style.value_color;
        let mut drawn = Vec::with_capacity(values.len());
        self.surface.with_rotation(inputs.rotation, |surface| {
            for field in &values {
                let text = field.value.clone().unwrap_or_default();
                let x = (field.bounding_box.x + offset) * scale_x;
                let y = (field.bounding_box.y + offset) * scale_y;
                surface.draw_text(x, y, &text, color, glyph_scale);
                let (width, height) = text_extent(&text, glyph_scale);
                drawn.push(DrawnValue {
                    name: field.name.clone(),
                    text,
                    x,
                    y,
                    width,
                    height,
                    glyph_scale,
                });
            }
        });
        report.values = drawn;

        tracing::debug!(
            width,
            height,
            scale_x,
            scale_y,
            rotation = inputs.rotation.degrees(),
            highlighted = report.highlight.is_some(),
            values = report.values.len(),
            "overlay repainted"
        );
        report
    }
}

/// Places the page bitmap under the overlay the way the viewer displays it:
/// resized to the overlay and rotated about its center.
pub fn compose_page(page: &RgbaImage, overlay: &RgbaImage, rotation: Rotation) -> RgbaImage {
    let (width, height) = overlay.dimensions();
    let mut out = RgbaImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }
    let resized = imageops::resize(page, width, height, imageops::FilterType::Triangle);
    let to_page = Affine::rotate_about(rotation, f64::from(width) / 2.0, f64::from(height) / 2.0)
        .invert()
        .unwrap_or(Affine::IDENTITY);

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let (sx, sy) = to_page.map_point(f64::from(x) + 0.5, f64::from(y) + 0.5);
        if sx < 0.0 || sy < 0.0 {
            continue;
        }
        let (sx, sy) = (sx.floor() as u32, sy.floor() as u32);
        if sx < width && sy < height {
            *pixel = *resized.get_pixel(sx, sy);
        }
    }
    for (x, y, pixel) in overlay.enumerate_pixels() {
        let dst = *out.get_pixel(x, y);
        out.put_pixel(x, y, blend_pixel(dst, *pixel));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{active, field};
    use image::Rgba;

    const LETTER: ImageSize = ImageSize {
        width: 2550,
        height: 3300,
    };

    fn filled(name: &str, value: &str, bbox: [f64; 4]) -> FormField {
        let mut f = field(name, 1, bbox);
        f.filled = true;
        f.value = Some(value.to_string());
        f
    }

    fn inputs<'a>(
        scale: f64,
        rotation: Rotation,
        active: Option<&'a ActiveField>,
        fields: &'a [FormField],
    ) -> OverlayInputs<'a> {
        OverlayInputs {
            image: Some(LETTER),
            scale,
            rotation,
            page: 1,
            active,
            fields,
        }
    }

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn letter_page_in_850px_container_scales_field_box() {
        let scale = crate::geometry::fit_scale(LETTER.width, 850.0).unwrap();
        assert!(approx(scale, 0.333, 0.001));

        let field = active("First name", 1, [163.0, 157.0, 702.0, 20.0]);
        let mut renderer = HighlightRenderer::default();
        let report = renderer.repaint(&inputs(scale, Rotation::Deg0, Some(&field), &[]));

        assert_eq!((report.width, report.height), (850, 1100));
        let rect = report.highlight.unwrap();
        assert!(approx(rect.x, 54.33, 0.01));
        assert!(approx(rect.y, 52.33, 0.01));
        assert!(approx(rect.w, 234.0, 0.01));
        assert!(approx(rect.h, 20.0 / 3.0 + 15.0, 0.01));

        let img = renderer.surface().image();
        assert!(img.get_pixel(60, 55)[3] > 0);
        assert_eq!(img.get_pixel(40, 55)[3], 0);
    }

    #[test]
    fn overlay_matches_rounded_display_size() {
        let field = active("A", 1, [0.0, 0.0, 10.0, 10.0]);
        let mut renderer = HighlightRenderer::default();
        for scale in [0.2, 0.266, 0.5, 1.0, 1.44, 2.0] {
            let mut frame = inputs(scale, Rotation::Deg0, Some(&field), &[]);
            frame.image = Some(ImageSize {
                width: 255,
                height: 331,
            });
            let report = renderer.repaint(&frame);
            let expected = (
                (255.0 * scale).round() as u32,
                (331.0 * scale).round() as u32,
            );
            assert_eq!((report.width, report.height), expected);
            assert_eq!(renderer.surface().width(), expected.0);
            assert_eq!(renderer.surface().height(), expected.1);
        }
    }

    #[test]
    fn drawn_rect_is_linear_in_scale_regardless_of_rotation() {
        let field = active("A", 1, [300.0, 400.0, 120.0, 30.0]);
        let mut renderer = HighlightRenderer::default();
        for rotation in [
            Rotation::Deg0,
            Rotation::Deg90,
            Rotation::Deg180,
            Rotation::Deg270,
        ] {
            let report = renderer.repaint(&inputs(0.5, rotation, Some(&field), &[]));
            let rect = report.highlight.unwrap();
            assert!(approx(rect.x, 150.0, 1e-9));
            assert!(approx(rect.y, 200.0, 1e-9));
            assert!(approx(rect.w, 60.0, 1e-9));
            assert!(approx(rect.h, 15.0 + 15.0, 1e-9));
            assert!(renderer.surface().transform().is_identity());
        }
    }

    #[test]
    fn rotation_moves_pixels_about_center() {
        // 1275x1650 overlay; a box in the top-left corner ends up bottom-right at 180.
        let field = active("A", 1, [0.0, 0.0, 100.0, 100.0]);
        let mut renderer = HighlightRenderer::default();
        renderer.repaint(&inputs(0.5, Rotation::Deg180, Some(&field), &[]));
        let img = renderer.surface().image();
        assert_eq!(img.get_pixel(10, 10)[3], 0);
        assert!(img.get_pixel(1270, 1645)[3] > 0);
    }

    #[test]
    fn repaint_is_idempotent() {
        let field = active("A", 1, [163.0, 157.0, 702.0, 20.0]);
        let fields = vec![filled("B", "Jane", [163.0, 300.0, 702.0, 20.0])];
        let mut renderer = HighlightRenderer::default();
        let first = renderer.repaint(&inputs(0.4, Rotation::Deg90, Some(&field), &fields));
        let first_pixels = renderer.surface().image().clone();
        let second = renderer.repaint(&inputs(0.4, Rotation::Deg90, Some(&field), &fields));
        assert_eq!(first, second);
        assert_eq!(&first_pixels, renderer.surface().image());
    }

    #[test]
    fn no_active_field_means_no_highlight() {
        let fields = vec![filled("B", "Jane", [100.0, 100.0, 400.0, 20.0])];
        let mut renderer = HighlightRenderer::default();
        let report = renderer.repaint(&inputs(0.5, Rotation::Deg0, None, &fields));
        assert!(report.highlight.is_none());
        assert_eq!(report.values.len(), 1);

        let green = renderer.style().highlight;
        let has_green = renderer
            .surface()
            .image()
            .pixels()
            .any(|p| p[0] == green[0] && p[1] == green[1] && p[3] > 0);
        assert!(!has_green);
    }

    #[test]
    fn highlight_and_values_share_a_frame() {
        let field = active("C", 1, [100.0, 1000.0, 400.0, 20.0]);
        let fields = vec![
            filled("A", "Jane", [100.0, 100.0, 400.0, 20.0]),
            filled("B", "Doe", [100.0, 300.0, 400.0, 20.0]),
        ];
        let mut renderer = HighlightRenderer::default();
        let report = renderer.repaint(&inputs(0.5, Rotation::Deg0, Some(&field), &fields));
        assert!(report.highlight.is_some());
        let texts: Vec<&str> = report.values.iter().map(|v| v.text.as_str()).collect();
        assert_eq!(texts, vec!["Jane", "Doe"]);

        let img = renderer.surface().image();
        assert!(img.get_pixel(75, 505)[3] > 0);
        let value = &report.values[0];
        assert_eq!((value.x, value.y), (55.0, 55.0));
        assert_eq!(value.glyph_scale, 2);
        assert_eq!((value.width, value.height), (64, 16));
        let ink = (55..55 + value.width)
            .flat_map(|x| (55..55 + value.height).map(move |y| (x, y)))
            .any(|(x, y)| img.get_pixel(x, y)[3] > 0);
        assert!(ink);
    }

    #[test]
    fn missing_image_or_nothing_to_draw_leaves_blank_overlay() {
        let field = active("A", 1, [0.0, 0.0, 50.0, 50.0]);
        let mut renderer = HighlightRenderer::default();
        renderer.repaint(&inputs(0.1, Rotation::Deg0, Some(&field), &[]));
        assert!(renderer.surface().image().pixels().any(|p| p[3] > 0));

        let mut unloaded = inputs(0.1, Rotation::Deg0, Some(&field), &[]);
        unloaded.image = None;
        let report = renderer.repaint(&unloaded);
        assert!(report.is_blank());
        assert!(renderer.surface().image().pixels().all(|p| p[3] == 0));

        let report = renderer.repaint(&inputs(0.1, Rotation::Deg0, None, &[]));
        assert!(report.is_blank());
        assert_eq!((report.width, report.height), (255, 330));
    }

    #[test]
    fn fields_on_other_pages_are_skipped() {
        let field = active("A", 2, [0.0, 0.0, 50.0, 50.0]);
        let mut other = filled("B", "x", [0.0, 0.0, 50.0, 50.0]);
        other.page = 2;
        let fields = vec![other];
        let mut renderer = HighlightRenderer::default();
        let report = renderer.repaint(&inputs(0.5, Rotation::Deg0, Some(&field), &fields));
        assert!(report.is_blank());
    }

    #[test]
    fn oversized_value_text_is_clipped_to_the_overlay() {
        let overrides: crate::style::StyleOverrides =
            serde_json::from_str(r#"{"value_size": 1e10}"#).unwrap();
        let style = RenderStyle::default().with_overrides(&overrides).unwrap();
        let fields = vec![filled("A", "Jane", [100.0, 100.0, 400.0, 20.0])];
        let mut renderer = HighlightRenderer::new(style);
        let report = renderer.repaint(&inputs(0.5, Rotation::Deg0, None, &fields));

        let value = &report.values[0];
        assert_eq!(value.glyph_scale, 63);
        assert_eq!((value.width, value.height), (2016, 504));
        assert_eq!((report.width, report.height), (1275, 1650));
    }

    #[test]
    fn zero_sized_box_still_reports_a_highlight() {
        let field = active("A", 1, [10.0, 10.0, 0.0, 0.0]);
        let mut renderer = HighlightRenderer::new(RenderStyle {
            height_pad: 0.0,
            ..RenderStyle::default()
        });
        let report = renderer.repaint(&inputs(0.5, Rotation::Deg0, Some(&field), &[]));
        assert_eq!(
            report.highlight,
            Some(Rect {
                x: 5.0,
                y: 5.0,
                w: 0.0,
                h: 0.0
            })
        );
    }

    #[test]
    fn offscreen_box_is_clipped_silently() {
        let field = active("A", 1, [5000.0, 9000.0, 100.0, 100.0]);
        let mut renderer = HighlightRenderer::default();
        let report = renderer.repaint(&inputs(0.5, Rotation::Deg0, Some(&field), &[]));
        assert!(report.highlight.is_some());
        assert!(renderer.surface().image().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn compose_places_overlay_on_resized_page() {
        let page = RgbaImage::from_pixel(20, 10, Rgba([255, 255, 255, 255]));
        let mut overlay = RgbaImage::new(10, 5);
        overlay.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let out = compose_page(&page, &overlay, Rotation::Deg0);
        assert_eq!(out.dimensions(), (10, 5));
        assert_eq!(*out.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert!(out.get_pixel(5, 2)[0] >= 254);
        assert_eq!(out.get_pixel(5, 2)[3], 255);
    }

    #[test]
    fn compose_rotates_page_under_overlay() {
        let mut page = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        page.put_pixel(0, 0, Rgba([0, 0, 255, 255]));
        let overlay = RgbaImage::new(4, 4);
        let out = compose_page(&page, &overlay, Rotation::Deg180);
        assert_eq!(*out.get_pixel(3, 3), Rgba([0, 0, 255, 255]));
        assert_eq!(*out.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }
}
