use serde::{Serialize, Deserialize};
use kurbo::{Affine, Point, Vec2};
use tiny_skia::Pixmap;
use crate::objects::{ObjectData, SceneObject};
use crate::raster::{draw_stretched, new_pixmap, stroke_polyline};
use crate::types::Rgba8;
use crate::error::Result;

pub const MIN_BRUSH_SIZE: f64 = 10.0;
pub const MAX_BRUSH_SIZE: f64 = 200.0;
pub const DEFAULT_BRUSH_SIZE: f64 = 40.0;
const BRUSH_REFERENCE_SIZE: f64 = 512.0;

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Stroke {
    pub size: f64,
    pub pts: Vec<Point>,
}

pub type LineGroup = Vec<Stroke>;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct BrushSettings {
    base_size: f64,
    size_scale: f64,
}

impl Default for BrushSettings {
    fn default() -> Self {
        BrushSettings { base_size: DEFAULT_BRUSH_SIZE, size_scale: 1.0 }
    }
}

impl BrushSettings {
    pub fn base_size(&self) -> f64 {
        self.base_size
    }

    pub fn size_scale(&self) -> f64 {
        self.size_scale
    }

    /// Stroke width actually drawn.
    pub fn width(&self) -> f64 {
        self.base_size * self.size_scale
    }

    pub fn set_base_size(&mut self, size: f64) {
        self.base_size = if size.is_nan() { DEFAULT_BRUSH_SIZE } else { size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE) };
    }

    /// Keeps perceived thickness proportional to the working image size.
    pub fn set_image_size(&mut self, width: u32, height: u32) {
        self.size_scale = (width.min(height) as f64).max(BRUSH_REFERENCE_SIZE) / BRUSH_REFERENCE_SIZE;
    }
}

/// The stroke being drawn. Finished strokes leave the buffer and live on as
/// path objects in the scene.
#[derive(Clone, Debug, Default)]
pub struct MaskStrokes {
    open: Option<Stroke>,
}

impl MaskStrokes {
    pub fn new() -> Self {
        MaskStrokes::default()
    }

    /// Starts a stroke, dropping any stroke that was never ended.
    pub fn begin_stroke(&mut self, width: f64) -> &Stroke {
        self.open.insert(Stroke { size: width, pts: Vec::new() })
    }

    /// No-op when no stroke is open.
    pub fn extend_stroke(&mut self, point: Point) {
        if let Some(stroke) = self.open.as_mut() {
            stroke.pts.push(point);
        }
    }

    /// Closes the open stroke. Strokes without points are discarded.
    pub fn end_stroke(&mut self) -> Option<Stroke> {
        self.open.take().filter(|s| !s.pts.is_empty())
    }

    pub fn open_stroke(&self) -> Option<&Stroke> {
        self.open.as_ref()
    }

    pub fn clear(&mut self) {
        self.open = None;
    }
}

/// Visible path objects as one line group in scene space shifted by
/// `-offset`. Stroke widths follow the object's mean scale.
pub fn line_group_from_paths(objects: &[SceneObject], offset: Vec2) -> LineGroup {
    objects
        .iter()
        .filter(|o| o.visible)
        .filter_map(|o| match &o.data {
            ObjectData::Path { points, stroke_width, .. } => {
                let to_scene = o.transform();
                let pts = points.iter().map(|p| to_scene * *p - offset).collect();
                let scale = (o.scale_x.abs() + o.scale_y.abs()) / 2.0;
                Some(Stroke { size: stroke_width * scale, pts })
            }
            _ => None,
        })
        .collect()
}

/// Extra masks first (stretched to the canvas), then every stroke in order.
pub fn rasterize_mask(
    width: u32,
    height: u32,
    line_groups: &[LineGroup],
    extra_masks: &[Pixmap],
    color: Rgba8,
) -> Result<Pixmap> {
    let mut canvas = new_pixmap(width, height)?;
    for mask in extra_masks {
        draw_stretched(&mut canvas, mask);
    }
    for group in line_groups {
        for stroke in group {
            stroke_polyline(&mut canvas, &stroke.pts, stroke.size, color, 1.0, Affine::IDENTITY);
        }
    }
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::alpha_at;

    fn line(size: f64, a: (f64, f64), b: (f64, f64)) -> Stroke {
        Stroke { size, pts: vec![Point::new(a.0, a.1), Point::new(b.0, b.1)] }
    }

    #[test]
    fn brush_size_is_clamped() {
        let mut brush = BrushSettings::default();
        brush.set_base_size(MAX_BRUSH_SIZE + 500.0);
        assert_eq!(brush.base_size(), MAX_BRUSH_SIZE);
        brush.set_base_size(0.5);
        assert_eq!(brush.base_size(), MIN_BRUSH_SIZE);
        brush.set_base_size(64.0);
        assert_eq!(brush.base_size(), 64.0);
    }

    #[test]
    fn brush_scale_follows_image_size() {
        let mut brush = BrushSettings::default();
        brush.set_image_size(300, 200);
        assert_eq!(brush.size_scale(), 1.0);
        brush.set_image_size(2048, 1024);
        assert_eq!(brush.size_scale(), 2.0);
        assert_eq!(brush.width(), DEFAULT_BRUSH_SIZE * 2.0);
    }

    #[test]
    fn extend_without_open_stroke_is_a_no_op() {
        let mut strokes = MaskStrokes::new();
        strokes.extend_stroke(Point::new(1.0, 1.0));
        assert!(strokes.open_stroke().is_none());
        strokes.begin_stroke(12.0);
        strokes.extend_stroke(Point::new(1.0, 1.0));
        strokes.extend_stroke(Point::new(2.0, 3.0));
        let done = strokes.end_stroke().unwrap();
        assert_eq!(done.pts.len(), 2);
        strokes.extend_stroke(Point::new(9.0, 9.0));
        assert!(strokes.open_stroke().is_none());
    }

    #[test]
    fn empty_strokes_are_dropped() {
        let mut strokes = MaskStrokes::new();
        strokes.begin_stroke(5.0);
        assert!(strokes.end_stroke().is_none());
        assert!(strokes.end_stroke().is_none());
    }

    #[test]
    fn path_objects_become_shifted_strokes() {
        let pts = [Point::new(100.0, 50.0), Point::new(140.0, 50.0)];
        let path = SceneObject::path_from_points(1, &pts, "#fff", 8.0);
        let mut hidden = SceneObject::path_from_points(2, &pts, "#fff", 8.0);
        hidden.visible = false;
        let group = line_group_from_paths(&[path, hidden], Vec2::new(100.0, 0.0));
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].size, 8.0);
        assert!((group[0].pts[0] - Point::new(0.0, 50.0)).hypot() < 1e-9);
        assert!((group[0].pts[1] - Point::new(40.0, 50.0)).hypot() < 1e-9);
    }

    fn strip(cols: [[u8; 4]; 4]) -> Pixmap {
        let mut m = new_pixmap(4, 1).unwrap();
        for (px, c) in m.pixels_mut().iter_mut().zip(cols) {
            *px = tiny_skia::PremultipliedColorU8::from_rgba(c[0], c[1], c[2], c[3]).unwrap();
        }
        m
    }

    #[test]
    fn draw_order_matters_only_where_layers_overlap() {
        let clear = [0, 0, 0, 0];
        let blue = [0, 0, 255, 255];
        let red = [255, 0, 0, 255];
        let left = strip([blue, blue, clear, clear]);
        let right = strip([clear, red, red, clear]);

        let ab = rasterize_mask(40, 10, &[], &[left.clone(), right.clone()], Rgba8::WHITE).unwrap();
        let ba = rasterize_mask(40, 10, &[], &[right, left], Rgba8::WHITE).unwrap();
        // overlap
        assert_ne!(ab.pixel(15, 5), ba.pixel(15, 5));
        // outside
        assert_eq!(ab.pixel(3, 5), ba.pixel(3, 5));
        assert_eq!(ab.pixel(25, 5), ba.pixel(25, 5));
        assert_eq!(alpha_at(&ab, 38, 5), 0);
    }

    #[test]
    fn strokes_draw_over_extra_masks() {
        let stroke = vec![line(6.0, (5.0, 5.0), (35.0, 5.0))];
        let extra = strip([[0, 0, 255, 255]; 4]);
        let mask = rasterize_mask(40, 10, &[stroke], &[extra], Rgba8::WHITE).unwrap();
        let on_stroke = mask.pixel(20, 5).unwrap();
        assert_eq!((on_stroke.red(), on_stroke.blue()), (255, 255));
        let off_stroke = mask.pixel(20, 9).unwrap();
        assert_eq!((off_stroke.red(), off_stroke.blue()), (0, 255));
    }

    #[test]
    fn same_color_groups_commute() {
        // strokes share one color, so their order shows only against extra
        // masks of another color; among themselves any order gives the same mask
        let green = Rgba8 { r: 0, g: 255, b: 0, a: 255 };
        let thin = vec![line(4.0, (0.0, 10.0), (20.0, 10.0))];
        let wide = vec![line(12.0, (10.0, 0.0), (10.0, 20.0))];
        let a = rasterize_mask(20, 20, &[thin.clone(), wide.clone()], &[], green).unwrap();
        let b = rasterize_mask(20, 20, &[wide, thin], &[], green).unwrap();
        for (x, y) in [(10, 10), (14, 2), (2, 10), (2, 2)] {
            assert_eq!(a.pixel(x, y), b.pixel(x, y));
        }
        assert_eq!(alpha_at(&a, 10, 10), 255);
        assert_eq!(alpha_at(&a, 14, 2), 255);
        assert_eq!(alpha_at(&a, 2, 2), 0);
    }
}
