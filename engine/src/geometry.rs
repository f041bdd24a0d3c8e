use kurbo::{Affine, Point, Rect, Vec2};
use serde::{Serialize, Deserialize};

pub const MIN_ZOOM: f64 = 0.01;
pub const MAX_ZOOM: f64 = 20.0;
/// Share of the viewport the export frame may occupy after a fit.
pub const FIT_MARGIN: f64 = 0.9;

/// Screen-space pan/zoom of the live canvas. Scene point `p` lands on screen
/// at `p * zoom + pan`.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Viewport { width, height, zoom: 1.0, pan_x: 0.0, pan_y: 0.0 }
    }

    pub fn transform(&self) -> Affine {
        Affine::new([self.zoom, 0.0, 0.0, self.zoom, self.pan_x, self.pan_y])
    }

    pub fn scene_to_screen(&self, p: Point) -> Point {
        self.transform() * p
    }

    pub fn screen_to_scene(&self, p: Point) -> Point {
        self.transform().inverse() * p
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan_x += delta.x;
        self.pan_y += delta.y;
    }
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_nan() { return 1.0; }
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

/// Zoom so that the scene point under `screen_point` stays under it.
pub fn zoom_to_point(viewport: &mut Viewport, screen_point: Point, new_zoom: f64) {
    let new_zoom = clamp_zoom(new_zoom);
    let anchor = viewport.screen_to_scene(screen_point);
    viewport.zoom = new_zoom;
    viewport.pan_x = screen_point.x - anchor.x * new_zoom;
    viewport.pan_y = screen_point.y - anchor.y * new_zoom;
}

pub fn wheel_zoom(zoom: f64, delta_y: f64) -> f64 {
    clamp_zoom(zoom * 0.999_f64.powf(delta_y))
}

/// Offset between the centered live coordinate space and the export frame.
pub fn clip_offset(viewport_width: f64, viewport_height: f64, output_width: u32, output_height: u32) -> Vec2 {
    Vec2::new(
        (viewport_width - output_width as f64) / 2.0,
        (viewport_height - output_height as f64) / 2.0,
    )
}

/// The export frame in scene coordinates.
pub fn frame_rect(viewport_width: f64, viewport_height: f64, output_width: u32, output_height: u32) -> Rect {
    let clip = clip_offset(viewport_width, viewport_height, output_width, output_height);
    Rect::new(clip.x, clip.y, clip.x + output_width as f64, clip.y + output_height as f64)
}

pub fn fit_zoom(viewport_width: f64, viewport_height: f64, output_width: u32, output_height: u32) -> f64 {
    if output_width == 0 || output_height == 0 { return 1.0; }
    let zx = viewport_width / output_width as f64;
    let zy = viewport_height / output_height as f64;
    clamp_zoom(zx.min(zy) * FIT_MARGIN)
}

/// Axis-aligned bounds of a `width x height` box centered on the local
/// origin, after `transform`.
pub fn transformed_bounds(transform: Affine, width: f64, height: f64) -> Rect {
    let hw = width / 2.0;
    let hh = height / 2.0;
    let corners = [
        Point::new(-hw, -hh), Point::new(hw, -hh), Point::new(hw, hh), Point::new(-hw, hh),
    ];
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for c in corners {
        let p = transform * c;
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Rect::new(min_x, min_y, max_x, max_y)
}

pub fn clamp_point(p: Point, window: Rect) -> Point {
    Point::new(p.x.clamp(window.x0, window.x1), p.y.clamp(window.y0, window.y1))
}

/// Uniform scale that makes a `width x height` box fit inside `target`.
pub fn scale_to_fit(width: f64, height: f64, target_width: f64, target_height: f64) -> f64 {
    if width <= 0.0 || height <= 0.0 { return 1.0; }
    (target_width / width).min(target_height / height)
}
