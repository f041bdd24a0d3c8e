use serde::Serialize;
use kurbo::{Affine, Vec2};
use tiny_skia::{Pixmap, PixmapPaint, Transform};
use crate::history::Snapshot;
use crate::objects::SceneObject;
use crate::raster::{draw_object, encode_png, new_pixmap};
use crate::geometry::clip_offset;
use crate::types::{AspectRatio, Rgba8};
use crate::error::{EngineError, Result};

/// Rasterized request layers, still as pixmaps.
#[derive(Debug)]
pub struct ExtractedLayers {
    pub width: u32,
    pub height: u32,
    /// Offset that was subtracted from every object.
    pub clip: Vec2,
    pub mask: Pixmap,
    pub movable: Pixmap,
    pub fixed: Pixmap,
}

impl ExtractedLayers {
    /// Fixed layer with the movable layer drawn over it.
    pub fn composite(&self) -> Pixmap {
        let mut out = self.fixed.clone();
        out.draw_pixmap(0, 0, self.movable.as_ref(), &PixmapPaint::default(), Transform::identity(), None);
        out
    }

    pub fn encode(&self) -> Result<Artifacts> {
        Ok(Artifacts {
            width: self.width,
            height: self.height,
            mask: encode_png(&self.mask)?,
            movable_image: encode_png(&self.movable)?,
            fixed_image: encode_png(&self.fixed)?,
        })
    }
}

/// PNG-encoded request layers.
#[derive(Serialize, Clone, Debug)]
pub struct Artifacts {
    pub width: u32,
    pub height: u32,
    pub mask: Vec<u8>,
    pub movable_image: Vec<u8>,
    pub fixed_image: Vec<u8>,
}

#[derive(Default)]
struct Accumulators {
    mask: Vec<SceneObject>,
    movable: Vec<SceneObject>,
    fixed: Vec<SceneObject>,
}

impl Accumulators {
    fn route(&mut self, obj: SceneObject) {
        if obj.is_path() {
            self.mask.push(obj);
        } else if obj.is_image() {
            if obj.view_mode.is_fixed() { self.fixed.push(obj); } else { self.movable.push(obj); }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Extractor {
    /// Painted under the fixed layer so the backend can tell composited
    /// regions from empty ones.
    pub fixed_background: Rgba8,
}

impl Default for Extractor {
    fn default() -> Self {
        Extractor { fixed_background: Rgba8::WHITE }
    }
}

impl Extractor {
    pub fn new(fixed_background: Rgba8) -> Self {
        Extractor { fixed_background }
    }

    pub fn extract(&self, snapshot: &Snapshot, aspect_ratio: &str, viewport_width: f64, viewport_height: f64) -> Result<Artifacts> {
        self.extract_layers(snapshot, aspect_ratio, viewport_width, viewport_height)?.encode()
    }

    /// Uses the viewport recorded with the snapshot rather than the current one.
    pub fn extract_snapshot(&self, snapshot: &Snapshot, aspect_ratio: &str) -> Result<ExtractedLayers> {
        self.extract_layers(snapshot, aspect_ratio, snapshot.frame.width, snapshot.frame.height)
    }

    pub fn extract_layers(&self, snapshot: &Snapshot, aspect_ratio: &str, viewport_width: f64, viewport_height: f64) -> Result<ExtractedLayers> {
        let ratio = AspectRatio::lookup(aspect_ratio)
            .ok_or_else(|| EngineError::InvalidAspectRatio(aspect_ratio.to_string()))?;
        let (width, height) = ratio.output_size();
        let clip = clip_offset(viewport_width, viewport_height, width, height);

        let offscreen = snapshot.restore()?;
        if !offscreen.objects().iter().any(|o| o.is_image()) {
            return Err(EngineError::MissingBaseImage);
        }

        let mut acc = Accumulators::default();
        for obj in offscreen.objects() {
            let mut copy = obj.clone();
            copy.translate(-clip);
            acc.route(copy);
        }
        tracing::debug!(
            ratio = aspect_ratio, mask = acc.mask.len(), movable = acc.movable.len(), fixed = acc.fixed.len(),
            "extracting request layers"
        );

        let mask = render_layer(width, height, &acc.mask, None)?;
        let movable = render_layer(width, height, &acc.movable, None)?;
        let fixed = render_layer(width, height, &acc.fixed, Some(self.fixed_background))?;
        Ok(ExtractedLayers { width, height, clip, mask, movable, fixed })
    }
}

fn render_layer(width: u32, height: u32, objects: &[SceneObject], background: Option<Rgba8>) -> Result<Pixmap> {
    let mut canvas = new_pixmap(width, height)?;
    if let Some(bg) = background {
        canvas.fill(bg.to_skia());
    }
    for obj in objects {
        draw_object(&mut canvas, obj, Affine::IDENTITY)?;
    }
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;
    use crate::objects::ObjectData;
    use crate::raster::{alpha_at, decode_image, is_transparent};
    use crate::raster::test_support::solid_png_data_url;
    use crate::scene::Scene;
    use crate::types::{ViewMode, ViewportFrame};

    const VW: f64 = 1200.0;
    const VH: f64 = 1100.0;

    fn snapshot_of(scene: &Scene) -> Snapshot {
        Snapshot::of(scene, ViewportFrame { width: VW, height: VH }).unwrap()
    }

    fn fixed_image_and_stroke() -> Scene {
        let mut scene = Scene::new();
        let mut img = SceneObject::image(0, solid_png_data_url(8, 8, [0, 200, 0, 255]), VW / 2.0, VH / 2.0, 200.0, 200.0);
        img.view_mode = ViewMode::Fixed;
        scene.add(img);
        let stroke = [Point::new(100.0, 100.0), Point::new(300.0, 100.0)];
        scene.add(SceneObject::path_from_points(0, &stroke, "#ffffff", 20.0));
        scene
    }

    #[test]
    fn splits_fixed_image_and_mask() {
        let snapshot = snapshot_of(&fixed_image_and_stroke());
        let artifacts = Extractor::default().extract(&snapshot, "1:1", VW, VH).unwrap();
        assert_eq!((artifacts.width, artifacts.height), (1024, 1024));

        let movable = decode_image(&artifacts.movable_image).unwrap();
        assert!(is_transparent(&movable));

        let fixed = decode_image(&artifacts.fixed_image).unwrap();
        let center = fixed.pixel(512, 512).unwrap().demultiply();
        assert_eq!((center.red(), center.green(), center.alpha()), (0, 200, 255));
        let corner = fixed.pixel(2, 2).unwrap().demultiply();
        assert_eq!((corner.red(), corner.green(), corner.blue()), (255, 255, 255));

        // clip = (88, 38): the stroke lands on y = 62
        let mask = decode_image(&artifacts.mask).unwrap();
        assert_eq!(alpha_at(&mask, 112, 62), 255);
        assert_eq!(alpha_at(&mask, 512, 512), 0);
    }

    #[test]
    fn unknown_ratio_is_rejected() {
        let snapshot = snapshot_of(&fixed_image_and_stroke());
        let err = Extractor::default().extract(&snapshot, "7:11", VW, VH).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAspectRatio(name) if name == "7:11"));
    }

    #[test]
    fn scene_without_image_fails() {
        let mut scene = Scene::new();
        scene.add(SceneObject::path_from_points(0, &[Point::new(1.0, 1.0)], "#fff", 4.0));
        let err = Extractor::default().extract(&snapshot_of(&scene), "1:1", VW, VH).unwrap_err();
        assert!(matches!(err, EngineError::MissingBaseImage));
    }

    #[test]
    fn other_variants_are_dropped() {
        let mut scene = Scene::new();
        scene.add(SceneObject::image(0, solid_png_data_url(4, 4, [9, 9, 9, 255]), VW / 2.0, VH / 2.0, 50.0, 50.0));
        scene.add(SceneObject::rect(0, kurbo::Rect::new(0.0, 0.0, VW, VH), "#ff0000", "#ff0000"));
        scene.add(SceneObject::new(0, ObjectData::Text { text: "hi".into(), font_size: 40.0, fill: "#000".into() }, 600.0, 550.0, 100.0, 40.0));
        let layers = Extractor::default().extract_snapshot(&snapshot_of(&scene), "1:1").unwrap();
        assert!(is_transparent(&layers.mask));
        assert_eq!(alpha_at(&layers.movable, 512, 512), 255);
        assert_eq!(alpha_at(&layers.movable, 10, 10), 0);
        let bg = layers.fixed.pixel(10, 10).unwrap();
        assert_eq!((bg.red(), bg.green(), bg.blue()), (255, 255, 255));
    }

    #[test]
    fn composite_puts_movable_over_fixed() {
        let mut scene = fixed_image_and_stroke();
        scene.add(SceneObject::image(0, solid_png_data_url(4, 4, [255, 0, 0, 255]), VW / 2.0, VH / 2.0, 20.0, 20.0));
        let layers = Extractor::default().extract_snapshot(&snapshot_of(&scene), "1:1").unwrap();
        let px = layers.composite().pixel(512, 512).unwrap();
        assert_eq!((px.red(), px.green()), (255, 0));
    }
}
