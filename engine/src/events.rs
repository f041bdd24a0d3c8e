use kurbo::Point;
use serde::Deserialize;
use crate::backend::RunAction;
use crate::brush::Stroke;
use crate::engine::{Editor, Interaction, Tool};
use crate::geometry::wheel_zoom;
use crate::objects::{ObjectId, SceneObject, TransformUpdate};
use crate::error::{EngineError, Result};

/// Events forwarded by the on-screen canvas. Pointer coordinates are in
/// screen space; `path:created` points are already in scene space.
#[derive(Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "type")]
pub enum CanvasEvent {
    #[serde(rename = "object:modified")]
    ObjectModified { id: ObjectId, update: TransformUpdate },
    #[serde(rename = "selection:created")]
    SelectionCreated { id: ObjectId },
    #[serde(rename = "selection:updated")]
    SelectionUpdated { id: ObjectId },
    #[serde(rename = "selection:cleared")]
    SelectionCleared,
    #[serde(rename = "path:created")]
    PathCreated { points: Vec<Point>, width: Option<f64> },
    #[serde(rename = "mouse:wheel")]
    MouseWheel { x: f64, y: f64, delta_y: f64 },
    #[serde(rename = "mouse:down")]
    MouseDown {
        x: f64,
        y: f64,
        /// Space or alt held.
        #[serde(default)]
        pan: bool,
    },
    #[serde(rename = "mouse:move")]
    MouseMove { x: f64, y: f64 },
    #[serde(rename = "mouse:up")]
    MouseUp { x: f64, y: f64 },
}

impl Editor {
    pub fn handle_event(&mut self, event: CanvasEvent) -> Result<()> {
        match event {
            CanvasEvent::ObjectModified { id, update } => self.on_object_modified(id, &update),
            CanvasEvent::SelectionCreated { id } | CanvasEvent::SelectionUpdated { id } => {
                self.select(Some(id));
                Ok(())
            }
            CanvasEvent::SelectionCleared => {
                self.select(None);
                Ok(())
            }
            CanvasEvent::PathCreated { points, width } => {
                let width = width.unwrap_or_else(|| self.brush.width());
                self.strokes.begin_stroke(width);
                for p in points {
                    self.strokes.extend_stroke(p);
                }
                match self.strokes.end_stroke() {
                    Some(stroke) => self.commit_stroke(stroke),
                    None => Ok(()),
                }
            }
            CanvasEvent::MouseWheel { x, y, delta_y } => {
                let zoom = wheel_zoom(self.viewport.zoom, delta_y);
                self.zoom_at(Point::new(x, y), zoom);
                Ok(())
            }
            CanvasEvent::MouseDown { x, y, pan } => {
                self.pointer_down(Point::new(x, y), pan);
                Ok(())
            }
            CanvasEvent::MouseMove { x, y } => {
                self.pointer_move(Point::new(x, y));
                Ok(())
            }
            CanvasEvent::MouseUp { x, y } => self.pointer_up(Point::new(x, y)),
        }
    }

    fn on_object_modified(&mut self, id: ObjectId, update: &TransformUpdate) -> Result<()> {
        let obj = self.scene.get_mut(id).ok_or(EngineError::ObjectNotFound(id))?;
        obj.apply_transform(update);
        // crop rectangle edits are transient
        if let Interaction::Cropping { rect_id, .. } = self.interaction {
            if rect_id == id { return Ok(()); }
        }
        self.capture()
    }

    fn pointer_down(&mut self, screen: Point, pan: bool) {
        if self.interaction != Interaction::Idle { return; }
        if pan || self.tool == Tool::Pan {
            self.interaction = Interaction::Panning { last: screen };
        } else if self.tool == Tool::Draw {
            let scene_point = self.viewport.screen_to_scene(screen);
            self.strokes.begin_stroke(self.brush.width());
            self.strokes.extend_stroke(scene_point);
            self.interaction = Interaction::Drawing;
        }
    }

    fn pointer_move(&mut self, screen: Point) {
        match self.interaction {
            Interaction::Drawing => {
                let scene_point = self.viewport.screen_to_scene(screen);
                self.strokes.extend_stroke(scene_point);
            }
            Interaction::Panning { last } => {
                self.viewport.pan_by(screen - last);
                self.interaction = Interaction::Panning { last: screen };
            }
            _ => {}
        }
    }

    fn pointer_up(&mut self, screen: Point) -> Result<()> {
        match self.interaction {
            Interaction::Drawing => {
                self.strokes.extend_stroke(self.viewport.screen_to_scene(screen));
                self.interaction = Interaction::Idle;
                match self.strokes.end_stroke() {
                    Some(stroke) => self.commit_stroke(stroke),
                    None => Ok(()),
                }
            }
            Interaction::Panning { .. } => {
                self.interaction = Interaction::Idle;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Finished strokes become path objects so they take part in extraction.
    fn commit_stroke(&mut self, stroke: Stroke) -> Result<()> {
        let color = self.app.settings.mask_color.clone();
        let path = SceneObject::path_from_points(0, &stroke.pts, &color, stroke.size);
        let id = self.scene.add(path);
        tracing::debug!(id, points = stroke.pts.len(), width = stroke.size, "stroke committed");
        self.capture()?;
        if !self.app.settings.run_manually {
            self.queue_auto_inpaint();
        }
        Ok(())
    }

    /// Starts an inpaint right after a stroke. Failures are already reported
    /// to the user, and the stroke stays committed either way.
    fn queue_auto_inpaint(&mut self) {
        match self.begin_run(RunAction::Inpaint) {
            Ok(Some(request)) => self.queued_run = Some(request),
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "automatic inpaint not started"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Vec2;
    use crate::app_state::{AppAction, AppState};
    use crate::objects::ObjectData;
    use crate::raster::test_support::solid_png_data_url;
    use crate::settings::MemoryStore;

    fn editor() -> Editor {
        Editor::with_state(AppState::default(), Box::new(MemoryStore::default()), 1000.0, 1000.0)
    }

    fn event(json: &str) -> CanvasEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn drawing_creates_a_path_and_captures() {
        let mut ed = editor();
        ed.set_tool(Tool::Draw);
        ed.handle_event(event(r#"{"type":"mouse:down","x":100,"y":100}"#)).unwrap();
        assert_eq!(ed.interaction(), Interaction::Drawing);
        ed.handle_event(event(r#"{"type":"mouse:move","x":150,"y":120}"#)).unwrap();
        ed.handle_event(event(r#"{"type":"mouse:up","x":200,"y":140}"#)).unwrap();
        assert_eq!(ed.interaction(), Interaction::Idle);
        assert_eq!(ed.scene().len(), 1);
        assert!(ed.scene().objects()[0].is_path());
        assert!(ed.can_undo());
        assert!(ed.strokes().open_stroke().is_none());
        match &ed.scene().objects()[0].data {
            ObjectData::Path { points, .. } => assert_eq!(points.len(), 3),
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[test]
    fn pan_gesture_moves_viewport_only() {
        let mut ed = editor();
        let before = *ed.viewport();
        ed.handle_event(event(r#"{"type":"mouse:down","x":10,"y":10,"pan":true}"#)).unwrap();
        ed.handle_event(event(r#"{"type":"mouse:move","x":40,"y":5}"#)).unwrap();
        ed.handle_event(event(r#"{"type":"mouse:up","x":40,"y":5}"#)).unwrap();
        assert!((ed.viewport().pan_x - before.pan_x - 30.0).abs() < 1e-9);
        assert!((ed.viewport().pan_y - before.pan_y + 5.0).abs() < 1e-9);
        assert!(ed.scene().is_empty());
        assert!(!ed.can_undo());
    }

    #[test]
    fn wheel_zoom_keeps_point_under_cursor() {
        let mut ed = editor();
        let cursor = Point::new(320.0, 240.0);
        let anchor = ed.viewport().screen_to_scene(cursor);
        ed.handle_event(CanvasEvent::MouseWheel { x: cursor.x, y: cursor.y, delta_y: -200.0 }).unwrap();
        let after = ed.viewport().scene_to_screen(anchor);
        assert!((after - cursor).hypot() < 1e-6);
        assert!(ed.viewport().zoom > 0.9);
    }

    #[test]
    fn modified_object_is_captured_and_locks_hold() {
        let mut ed = editor();
        let id = ed.scene.add(SceneObject::rect(0, kurbo::Rect::new(0.0, 0.0, 10.0, 10.0), "#000", "#000"));
        ed.scene.get_mut(id).unwrap().locks.lock_movement_x = true;
        let update = TransformUpdate { left: Some(99.0), top: Some(42.0), ..TransformUpdate::default() };
        ed.handle_event(CanvasEvent::ObjectModified { id, update }).unwrap();
        let obj = ed.scene().get(id).unwrap();
        assert_eq!((obj.left, obj.top), (5.0, 42.0));
        assert!(ed.can_undo());

        let err = ed.handle_event(CanvasEvent::ObjectModified { id: 77, update }).unwrap_err();
        assert!(matches!(err, EngineError::ObjectNotFound(77)));
    }

    #[test]
    fn selection_events_drive_anchor() {
        let mut ed = editor();
        let id = ed.scene.add(SceneObject::rect(0, kurbo::Rect::new(100.0, 100.0, 200.0, 150.0), "#000", "#000"));
        ed.handle_event(event(&format!(r#"{{"type":"selection:created","id":{}}}"#, id))).unwrap();
        let anchor = ed.menu_anchor().unwrap();
        let expected = ed.viewport().scene_to_screen(Point::new(200.0, 100.0));
        assert!((anchor - expected).hypot() < 1e-6);

        let update = TransformUpdate { left: Some(250.0), ..TransformUpdate::default() };
        ed.handle_event(CanvasEvent::ObjectModified { id, update }).unwrap();
        let moved = ed.menu_anchor().unwrap() - anchor;
        assert!((moved - Vec2::new(100.0 * ed.viewport().zoom, 0.0)).hypot() < 1e-6);

        ed.handle_event(event(r#"{"type":"selection:cleared"}"#)).unwrap();
        assert!(ed.menu_anchor().is_none());
    }

    #[test]
    fn host_created_path_records_stroke() {
        let mut ed = editor();
        ed.handle_event(event(r#"{"type":"path:created","points":[{"x":1,"y":1},{"x":9,"y":4}],"width":12}"#)).unwrap();
        match &ed.scene().objects()[0].data {
            ObjectData::Path { stroke_width, .. } => assert_eq!(*stroke_width, 12.0),
            other => panic!("expected a path, got {:?}", other),
        }
        assert!(ed.take_queued_run().is_none());
    }

    #[test]
    fn stroke_end_starts_inpaint_when_not_manual() {
        let mut ed = editor();
        ed.load_image(&solid_png_data_url(16, 16, [10, 10, 10, 255])).unwrap();
        ed.dispatch(AppAction::SetRunManually { enabled: false });
        let c = ed.frame_rect().center();
        let points = vec![Point::new(c.x - 40.0, c.y), Point::new(c.x + 40.0, c.y)];
        ed.handle_event(CanvasEvent::PathCreated { points, width: Some(16.0) }).unwrap();

        let queued = ed.take_queued_run().expect("inpaint should be queued");
        assert_eq!(queued.action, RunAction::Inpaint);
        assert!(ed.is_processing());
        assert!(ed.take_queued_run().is_none());
        assert_eq!(ed.scene().objects().iter().filter(|o| o.is_path()).count(), 1);
    }
}
