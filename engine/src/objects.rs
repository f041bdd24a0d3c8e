use serde::{Serialize, Deserialize};
use kurbo::{Affine, Point, Rect, Vec2};
use crate::types::{ShapeType, ViewMode};
use crate::geometry::transformed_bounds;

pub type ObjectId = u32;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(default)]
pub struct TransformLocks {
    pub lock_movement_x: bool,
    pub lock_movement_y: bool,
    pub lock_scaling_x: bool,
    pub lock_scaling_y: bool,
    pub lock_rotation: bool,
}

impl TransformLocks {
    pub fn all() -> Self {
        TransformLocks { lock_movement_x: true, lock_movement_y: true, lock_scaling_x: true, lock_scaling_y: true, lock_rotation: true }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectData {
    Image {
        /// `data:` URL holding the encoded pixels.
        src: String,
    },
    Path {
        /// Points relative to the object's center.
        points: Vec<Point>,
        stroke: String,
        stroke_width: f64,
    },
    Group {
        children: Vec<SceneObject>,
    },
    Rect {
        fill: String,
        stroke: String,
        stroke_width: f64,
    },
    Text {
        text: String,
        font_size: f64,
        fill: String,
    },
}

/// Serialized form of a scene object. `left`/`top` locate the object's
/// center; `width`/`height` are its unscaled local size.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct SceneObject {
    pub id: ObjectId,
    pub name: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Degrees, clockwise.
    pub angle: f64,
    pub opacity: f64,
    pub visible: bool,
    pub selectable: bool,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(flatten)]
    pub locks: TransformLocks,
    #[serde(flatten)]
    pub data: ObjectData,
}

impl SceneObject {
    pub fn new(id: ObjectId, data: ObjectData, left: f64, top: f64, width: f64, height: f64) -> Self {
        let shape_type = shape_type_of(&data);
        SceneObject {
            id,
            name: format!("{:?} {}", shape_type, id),
            left,
            top,
            width,
            height,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
            opacity: 1.0,
            visible: true,
            selectable: true,
            view_mode: ViewMode::Unset,
            locks: TransformLocks::default(),
            data,
        }
    }

    pub fn image(id: ObjectId, src: String, left: f64, top: f64, width: f64, height: f64) -> Self {
        SceneObject::new(id, ObjectData::Image { src }, left, top, width, height)
    }

    /// Builds a path object from absolute scene points, centering it on the
    /// points' bounding box.
    pub fn path_from_points(id: ObjectId, points: &[Point], stroke: &str, stroke_width: f64) -> Self {
        let bbox = points_bounds(points);
        let center = bbox.center();
        let local: Vec<Point> = points.iter().map(|p| Point::new(p.x - center.x, p.y - center.y)).collect();
        let data = ObjectData::Path { points: local, stroke: stroke.to_string(), stroke_width };
        SceneObject::new(id, data, center.x, center.y, bbox.width().max(1.0), bbox.height().max(1.0))
    }

    pub fn rect(id: ObjectId, bounds: Rect, fill: &str, stroke: &str) -> Self {
        let center = bounds.center();
        let data = ObjectData::Rect { fill: fill.to_string(), stroke: stroke.to_string(), stroke_width: 1.0 };
        SceneObject::new(id, data, center.x, center.y, bounds.width(), bounds.height())
    }

    pub fn shape_type(&self) -> ShapeType {
        shape_type_of(&self.data)
    }

    pub fn is_image(&self) -> bool {
        matches!(self.data, ObjectData::Image { .. })
    }

    pub fn is_path(&self) -> bool {
        matches!(self.data, ObjectData::Path { .. })
    }

    /// Local (centered) to scene coordinates.
    pub fn transform(&self) -> Affine {
        Affine::translate((self.left, self.top))
            * Affine::rotate(self.angle.to_radians())
            * Affine::scale_non_uniform(self.scale_x, self.scale_y)
    }

    pub fn bounds(&self) -> Rect {
        transformed_bounds(self.transform(), self.width, self.height)
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.left += delta.x;
        self.top += delta.y;
    }

    /// Applies a transform reported by the live canvas, honoring lock flags.
    pub fn apply_transform(&mut self, update: &TransformUpdate) {
        if let Some(v) = update.left { if !self.locks.lock_movement_x { self.left = v; } }
        if let Some(v) = update.top { if !self.locks.lock_movement_y { self.top = v; } }
        if let Some(v) = update.scale_x { if !self.locks.lock_scaling_x { self.scale_x = v; } }
        if let Some(v) = update.scale_y { if !self.locks.lock_scaling_y { self.scale_y = v; } }
        if let Some(v) = update.angle { if !self.locks.lock_rotation { self.angle = v; } }
        if let Some(v) = update.opacity { self.opacity = v.clamp(0.0, 1.0); }
        if let Some(v) = update.visible { self.visible = v; }
    }
}

/// Partial transform carried by `object:modified`.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug, Default)]
pub struct TransformUpdate {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub scale_x: Option<f64>,
    pub scale_y: Option<f64>,
    pub angle: Option<f64>,
    pub opacity: Option<f64>,
    pub visible: Option<bool>,
}

fn shape_type_of(data: &ObjectData) -> ShapeType {
    match data {
        ObjectData::Image { .. } => ShapeType::Image,
        ObjectData::Path { .. } => ShapeType::Path,
        ObjectData::Group { .. } => ShapeType::Group,
        ObjectData::Rect { .. } => ShapeType::Rect,
        ObjectData::Text { .. } => ShapeType::Text,
    }
}

pub fn points_bounds(points: &[Point]) -> Rect {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        if p.x < min_x { min_x = p.x; }
        if p.x > max_x { max_x = p.x; }
        if p.y < min_y { min_y = p.y; }
        if p.y > max_y { max_y = p.y; }
    }
    if points.is_empty() { return Rect::ZERO; }
    Rect::new(min_x, min_y, max_x, max_y)
}
