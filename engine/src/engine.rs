use wasm_bindgen::prelude::*;
use kurbo::{Point, Rect, Vec2};
use serde::Serialize;
use tiny_skia::Pixmap;
use crate::animation::Animator;
use crate::app_state::{AppAction, AppState, Notification, NotificationLevel};
use crate::brush::{BrushSettings, MaskStrokes};
use crate::geometry::{clamp_point, fit_zoom, frame_rect, scale_to_fit, transformed_bounds, zoom_to_point, Viewport};
use crate::history::{Reload, Snapshot, SnapshotStore};
use crate::objects::{ObjectId, SceneObject, TransformLocks};
use crate::raster::decode_data_url;
use crate::runs::{PendingRun, RunRequest};
use crate::scene::Scene;
use crate::settings::{KeyValueStore, PersistedState};
use crate::types::{AspectRatio, ViewMode, ViewportFrame, ASPECT_RATIOS};
use crate::error::{EngineError, Result};

/// What the pointer is currently doing on the canvas.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub enum Interaction {
    #[default]
    Idle,
    Drawing,
    Panning { last: Point },
    Cropping { rect_id: ObjectId, target_id: ObjectId },
}

#[derive(Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Select,
    Draw,
    Pan,
}

/// Read-only view handed to the host after each command.
#[derive(Serialize, Debug)]
pub struct EditorView {
    pub can_undo: bool,
    pub can_redo: bool,
    pub is_processing: bool,
    pub progress: Option<(u32, u32)>,
    pub tool: Tool,
    pub zoom: f64,
    pub pan: Vec2,
    pub aspect_ratio: String,
    pub frame_overlay: Rect,
    pub selection: Option<ObjectId>,
    pub menu_anchor: Option<Point>,
    pub brush_width: f64,
    pub render_count: usize,
    pub history: Vec<String>,
}

#[wasm_bindgen]
pub struct Editor {
    pub(crate) scene: Scene,
    pub(crate) viewport: Viewport,
    pub(crate) history: SnapshotStore,
    pub(crate) brush: BrushSettings,
    pub(crate) strokes: MaskStrokes,
    pub(crate) extra_masks: Vec<Pixmap>,
    pub(crate) renders: Vec<String>,
    pub(crate) app: AppState,
    pub(crate) store: Box<dyn KeyValueStore>,
    pub(crate) interaction: Interaction,
    pub(crate) tool: Tool,
    pub(crate) selection: Option<ObjectId>,
    pub(crate) pending: Option<PendingRun>,
    /// Request started on the editor's own initiative, waiting for the host.
    pub(crate) queued_run: Option<RunRequest>,
    pub(crate) next_ticket: u64,
    pub(crate) animator: Animator,
}

#[wasm_bindgen]
impl Editor {
    #[wasm_bindgen(constructor)]
    pub fn new(viewport_width: f64, viewport_height: f64) -> Editor {
        console_error_panic_hook::set_once();

        #[cfg(target_arch = "wasm32")]
        let store: Box<dyn KeyValueStore> = {
            crate::logging::init_logging(cfg!(debug_assertions));
            Box::new(crate::settings::LocalStorage)
        };
        #[cfg(not(target_arch = "wasm32"))]
        let store: Box<dyn KeyValueStore> = Box::new(crate::settings::MemoryStore::default());

        let app = AppState::from_persisted(PersistedState::load(store.as_ref()));
        Editor::with_state(app, store, viewport_width, viewport_height)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn is_processing(&self) -> bool {
        self.app.is_processing
    }

    pub fn get_scene_json(&self) -> String {
        self.scene.serialize().unwrap_or_else(|_| "{}".to_string())
    }

    pub fn get_history(&self) -> String {
        serde_json::to_string(&self.history.history()).unwrap_or_else(|_| "[]".to_string())
    }

    /// Same content as `get_state`, as a structured JS object.
    pub fn view_state(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.view()).unwrap_or(JsValue::NULL)
    }
}

impl Editor {
    pub fn with_state(app: AppState, store: Box<dyn KeyValueStore>, viewport_width: f64, viewport_height: f64) -> Editor {
        let mut brush = BrushSettings::default();
        brush.set_base_size(app.settings.brush_size);
        let mut editor = Editor {
            scene: Scene::new(),
            viewport: Viewport::new(viewport_width, viewport_height),
            history: SnapshotStore::new(),
            brush,
            strokes: MaskStrokes::new(),
            extra_masks: Vec::new(),
            renders: Vec::new(),
            app,
            store,
            interaction: Interaction::Idle,
            tool: Tool::Select,
            selection: None,
            pending: None,
            queued_run: None,
            next_ticket: 1,
            animator: Animator::new(),
        };
        editor.fit_to_frame();
        editor
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn app_state(&self) -> &AppState {
        &self.app
    }

    pub fn brush(&self) -> &BrushSettings {
        &self.brush
    }

    pub fn strokes(&self) -> &MaskStrokes {
        &self.strokes
    }

    pub fn renders(&self) -> &[String] {
        &self.renders
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    pub fn selection(&self) -> Option<ObjectId> {
        self.selection
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn frame(&self) -> ViewportFrame {
        ViewportFrame { width: self.viewport.width, height: self.viewport.height }
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        AspectRatio::lookup(&self.app.settings.aspect_ratio).unwrap_or(ASPECT_RATIOS[0])
    }

    /// Export window in scene coordinates.
    pub fn frame_rect(&self) -> Rect {
        let (w, h) = self.aspect_ratio().output_size();
        frame_rect(self.viewport.width, self.viewport.height, w, h)
    }

    /// Export window in screen coordinates, for the overlay.
    pub fn frame_overlay(&self) -> Rect {
        self.viewport.transform().transform_rect_bbox(self.frame_rect())
    }

    pub fn view(&self) -> EditorView {
        EditorView {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            is_processing: self.app.is_processing,
            progress: self.app.progress,
            tool: self.tool,
            zoom: self.viewport.zoom,
            pan: Vec2::new(self.viewport.pan_x, self.viewport.pan_y),
            aspect_ratio: self.app.settings.aspect_ratio.clone(),
            frame_overlay: self.frame_overlay(),
            selection: self.selection,
            menu_anchor: self.menu_anchor(),
            brush_width: self.brush.width(),
            render_count: self.renders.len(),
            history: self.history.history(),
        }
    }

    /// Top-right corner of the selected object on screen, kept inside the
    /// viewport. Computed from the current transforms on every call.
    pub fn menu_anchor(&self) -> Option<Point> {
        let obj = self.scene.get(self.selection?)?;
        let bounds = transformed_bounds(self.viewport.transform() * obj.transform(), obj.width, obj.height);
        let screen = Rect::new(0.0, 0.0, self.viewport.width, self.viewport.height);
        Some(clamp_point(Point::new(bounds.x1, bounds.y0), screen))
    }

    // ---- state ----

    pub fn dispatch(&mut self, action: AppAction) {
        let persist = AppState::is_persisted_action(&action);
        let refit = matches!(action, AppAction::SetAspectRatio { .. });
        if let AppAction::SetBrushSize { size } = action {
            self.brush.set_base_size(size);
        }
        self.app = std::mem::take(&mut self.app).reduce(action);
        if refit {
            self.fit_to_frame();
        }
        if persist {
            if let Err(e) = self.app.persisted().save(self.store.as_mut()) {
                tracing::warn!(error = %e, "failed to persist settings");
            }
        }
    }

    pub fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        let notification = Notification { level, message: message.into() };
        self.dispatch(AppAction::Notify { notification });
    }

    pub(crate) fn notify_error(&mut self, err: &EngineError) {
        tracing::warn!(error = %err, "editor error");
        self.notify(NotificationLevel::Error, err.to_string());
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        let out = self.app.notifications.clone();
        self.dispatch(AppAction::DismissNotifications);
        out
    }

    pub fn set_brush_size(&mut self, size: f64) {
        self.dispatch(AppAction::SetBrushSize { size });
    }

    // ---- history ----

    /// Records the live scene. The crop rectangle is never part of a
    /// snapshot.
    pub(crate) fn capture(&mut self) -> Result<()> {
        let frame = self.frame();
        match self.crop_rect() {
            Some(rect_id) => {
                let mut scene = self.scene.clone();
                scene.remove(rect_id);
                self.history.capture(&scene, frame)?;
            }
            None => {
                self.history.capture(&self.scene, frame)?;
            }
        }
        Ok(())
    }

    pub(crate) fn crop_rect(&self) -> Option<ObjectId> {
        match self.interaction {
            Interaction::Cropping { rect_id, .. } => Some(rect_id),
            _ => None,
        }
    }

    /// Hands over a run the editor started itself, such as the inpaint
    /// fired on stroke end.
    pub fn take_queued_run(&mut self) -> Option<RunRequest> {
        self.queued_run.take()
    }

    /// Returns false when there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        match self.history.undo() {
            Some(reload) => {
                self.reload(reload)?;
                tracing::debug!(remaining = self.history.undo_len(), "undo");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn redo(&mut self) -> Result<bool> {
        match self.history.redo() {
            Some(reload) => {
                self.reload(reload)?;
                tracing::debug!(remaining = self.history.redo_len(), "redo");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replaces the live object list wholesale.
    fn reload(&mut self, reload: Reload) -> Result<()> {
        self.scene = match reload {
            Reload::Snapshot(snapshot) | Reload::Base(Some(snapshot)) => snapshot.restore()?,
            Reload::Base(None) => Scene::new(),
        };
        if self.selection.map_or(false, |id| self.scene.get(id).is_none()) {
            self.selection = None;
        }
        if let Interaction::Cropping { .. } = self.interaction {
            self.interaction = Interaction::Idle;
        }
        Ok(())
    }

    /// Scene the next request is built from: the undo top, else the base,
    /// else the live scene.
    pub(crate) fn latest_snapshot(&self) -> Result<Snapshot> {
        match self.history.latest().or_else(|| self.history.base()) {
            Some(snapshot) => Ok(snapshot.clone()),
            None => Snapshot::of(&self.scene, self.frame()),
        }
    }

    // ---- viewport ----

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport.width = width.max(1.0);
        self.viewport.height = height.max(1.0);
        self.fit_to_frame();
    }

    /// Zooms so the export frame fills the viewport, centered.
    pub fn fit_to_frame(&mut self) {
        let (w, h) = self.aspect_ratio().output_size();
        let zoom = fit_zoom(self.viewport.width, self.viewport.height, w, h);
        self.viewport.zoom = 1.0;
        self.viewport.pan_x = 0.0;
        self.viewport.pan_y = 0.0;
        let center = self.viewport.center();
        zoom_to_point(&mut self.viewport, center, zoom);
    }

    pub fn zoom_at(&mut self, screen_point: Point, zoom: f64) {
        zoom_to_point(&mut self.viewport, screen_point, zoom);
    }

    /// Switches the export window. Objects stay where they are.
    pub fn set_aspect_ratio(&mut self, name: &str) -> Result<()> {
        if AspectRatio::lookup(name).is_none() {
            return Err(EngineError::InvalidAspectRatio(name.to_string()));
        }
        self.dispatch(AppAction::SetAspectRatio { name: name.to_string() });
        tracing::debug!(ratio = name, "aspect ratio changed");
        Ok(())
    }

    // ---- scene operations ----

    /// Starts a new document from `src`: clears the scene and all history,
    /// and records the loaded photo as the undo floor.
    pub fn load_image(&mut self, src: &str) -> Result<ObjectId> {
        if self.app.is_processing {
            tracing::debug!("load ignored while processing");
            return Err(EngineError::Busy);
        }
        let pixmap = decode_data_url(src)?;
        let (w, h) = (pixmap.width(), pixmap.height());

        self.scene.clear();
        self.selection = None;
        self.interaction = Interaction::Idle;
        self.strokes.clear();
        self.extra_masks.clear();
        self.renders.clear();
        for (id, _) in self.animator.cancel_all() {
            tracing::debug!(id, "pulse dropped on load");
        }

        let mut base = self.fitted_image(src, w, h);
        base.view_mode = ViewMode::Fixed;
        base.locks = TransformLocks::all();
        base.name = "Background".to_string();
        let id = self.scene.add(base);

        self.brush.set_image_size(w, h);
        let snapshot = Snapshot::of(&self.scene, self.frame())?;
        self.history.reset(Some(snapshot));
        tracing::info!(width = w, height = h, "base image loaded");
        Ok(id)
    }

    /// Adds an image layer at the frame center, shrunk to fit if needed.
    pub fn add_image(&mut self, src: &str) -> Result<ObjectId> {
        let pixmap = decode_data_url(src)?;
        let obj = self.fitted_image(src, pixmap.width(), pixmap.height());
        let id = self.scene.add(obj);
        self.capture()?;
        Ok(id)
    }

    /// Extra mask image composed under the drawn strokes on the next inpaint.
    pub fn add_mask_image(&mut self, src: &str) -> Result<()> {
        self.extra_masks.push(decode_data_url(src)?);
        Ok(())
    }

    fn fitted_image(&self, src: &str, width: u32, height: u32) -> SceneObject {
        let frame = self.frame_rect();
        let center = frame.center();
        let mut obj = SceneObject::image(0, src.to_string(), center.x, center.y, width as f64, height as f64);
        let scale = scale_to_fit(width as f64, height as f64, frame.width(), frame.height()).min(1.0);
        obj.scale_x = scale;
        obj.scale_y = scale;
        obj
    }

    /// Refused while a request is in flight.
    pub fn delete_selected(&mut self) -> Result<bool> {
        if self.app.is_processing {
            tracing::debug!("delete ignored while processing");
            return Ok(false);
        }
        let Some(id) = self.selection else { return Ok(false); };
        if self.crop_rect() == Some(id) {
            self.cancel_crop();
            return Ok(true);
        }
        if self.scene.remove(id).is_none() {
            return Err(EngineError::ObjectNotFound(id));
        }
        self.selection = None;
        self.capture()?;
        Ok(true)
    }

    /// Fixed objects are composited into the request background and locked
    /// in place; modify objects move freely.
    pub fn set_view_mode(&mut self, id: ObjectId, mode: ViewMode) -> Result<()> {
        let obj = self.scene.get_mut(id).ok_or(EngineError::ObjectNotFound(id))?;
        if obj.view_mode == mode {
            return Ok(());
        }
        obj.view_mode = mode;
        obj.locks = if mode.is_fixed() { TransformLocks::all() } else { TransformLocks::default() };
        self.capture()
    }

    pub fn select(&mut self, id: Option<ObjectId>) {
        self.selection = id.filter(|id| self.scene.get(*id).is_some());
    }
}
