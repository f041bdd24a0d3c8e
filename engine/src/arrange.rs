use kurbo::{Affine, Rect};
use crate::engine::{Editor, Interaction};
use crate::objects::{ObjectId, SceneObject, TransformLocks};
use crate::raster::{draw_object, encode_png, new_pixmap, png_data_url};
use crate::runs::RESULT_STACK_OFFSET;
use crate::scene::LayerMove;
use crate::error::{EngineError, Result};

const CROP_FILL: &str = "#ffffff33";
const CROP_STROKE: &str = "#ffffff";

impl Editor {
    /// Restacks the selected object and drops the selection. Returns false
    /// when nothing is selected or the object is already in place.
    pub fn move_selected(&mut self, to: LayerMove) -> Result<bool> {
        let Some(id) = self.selection.take() else { return Ok(false); };
        let moved = self.scene.move_layer(id, to);
        if moved {
            tracing::debug!(id, ?to, "layer moved");
            self.capture()?;
        }
        Ok(moved)
    }

    pub fn duplicate_selected(&mut self) -> Result<ObjectId> {
        let id = self.selection.filter(|id| self.crop_rect() != Some(*id)).ok_or(EngineError::NoSelection)?;
        let copy = self.scene.duplicate(id, RESULT_STACK_OFFSET)?;
        self.selection = Some(copy);
        self.capture()?;
        Ok(copy)
    }

    /// First crop phase: lays a rectangle over the selected object, aligned
    /// with its rotation.
    pub fn begin_crop(&mut self) -> Result<ObjectId> {
        if let Interaction::Cropping { rect_id, .. } = self.interaction {
            return Ok(rect_id);
        }
        let target_id = self.selection.ok_or(EngineError::NoSelection)?;
        let target = self.scene.get(target_id).ok_or(EngineError::ObjectNotFound(target_id))?;

        let size = (target.width * target.scale_x.abs(), target.height * target.scale_y.abs());
        let mut rect = SceneObject::rect(0, Rect::from_center_size((target.left, target.top), size), CROP_FILL, CROP_STROKE);
        rect.angle = target.angle;
        rect.name = "Crop".to_string();
        rect.locks = TransformLocks { lock_rotation: true, ..TransformLocks::default() };

        let rect_id = self.scene.add(rect);
        self.interaction = Interaction::Cropping { rect_id, target_id };
        self.selection = Some(rect_id);
        Ok(rect_id)
    }

    /// Second crop phase: rasterizes the part of the target under the
    /// rectangle, in the target's own frame, and swaps the target for it.
    pub fn apply_crop(&mut self) -> Result<ObjectId> {
        let Interaction::Cropping { rect_id, target_id } = self.interaction else {
            return Err(EngineError::NoSelection);
        };
        let rect = self.scene.get(rect_id).cloned().ok_or(EngineError::ObjectNotFound(rect_id))?;
        let target = self.scene.get(target_id).cloned().ok_or(EngineError::ObjectNotFound(target_id))?;

        let sx = nonzero(target.scale_x);
        let sy = nonzero(target.scale_y);
        let pw = (rect.width * rect.scale_x.abs() / sx.abs()).round().max(1.0);
        let ph = (rect.height * rect.scale_y.abs() / sy.abs()).round().max(1.0);

        // crop pixel space -> scene
        let placement = Affine::translate((rect.left, rect.top))
            * Affine::rotate(target.angle.to_radians())
            * Affine::scale_non_uniform(sx, sy)
            * Affine::translate((-pw / 2.0, -ph / 2.0));

        let mut canvas = new_pixmap(pw as u32, ph as u32)?;
        let mut opaque = target.clone();
        opaque.opacity = 1.0;
        opaque.visible = true;
        draw_object(&mut canvas, &opaque, placement.inverse())?;

        let src = png_data_url(&encode_png(&canvas)?);
        let mut cropped = SceneObject::image(0, src, rect.left, rect.top, pw, ph);
        cropped.name = target.name.clone();
        cropped.scale_x = sx;
        cropped.scale_y = sy;
        cropped.angle = target.angle;
        cropped.opacity = target.opacity;
        cropped.visible = target.visible;
        cropped.view_mode = target.view_mode;
        cropped.locks = target.locks;

        self.scene.remove(rect_id);
        let new_id = self.scene.replace(target_id, cropped)?;
        self.interaction = Interaction::Idle;
        self.selection = Some(new_id);
        tracing::info!(target = target_id, width = pw, height = ph, "crop applied");
        self.capture()?;
        Ok(new_id)
    }

    pub fn cancel_crop(&mut self) {
        if let Interaction::Cropping { rect_id, target_id } = self.interaction {
            self.scene.remove(rect_id);
            self.interaction = Interaction::Idle;
            self.selection = Some(target_id).filter(|id| self.scene.get(*id).is_some());
        }
    }
}

fn nonzero(scale: f64) -> f64 {
    if scale.abs() < f64::EPSILON { 1.0 } else { scale }
}
