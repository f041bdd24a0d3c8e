use serde::{Serialize, Deserialize};
use crate::scene::Scene;
use crate::types::ViewportFrame;
use crate::error::Result;

pub const MAX_HISTORY: usize = 100;

/// Full serialized scene plus the viewport it was captured under.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Snapshot {
    pub id: String,
    pub data: String,
    pub frame: ViewportFrame,
}

impl Snapshot {
    pub fn of(scene: &Scene, frame: ViewportFrame) -> Result<Snapshot> {
        Ok(Snapshot { id: snapshot_id(), data: scene.serialize()?, frame })
    }

    pub fn restore(&self) -> Result<Scene> {
        Scene::deserialize(&self.data)
    }
}

/// What the caller has to load after an undo or redo.
#[derive(Clone, PartialEq, Debug)]
pub enum Reload {
    Snapshot(Snapshot),
    /// History ran out: load the base scene (empty if none was recorded).
    Base(Option<Snapshot>),
}

#[derive(Clone, Debug, Default)]
pub struct SnapshotStore {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    base: Option<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        SnapshotStore::default()
    }

    /// Drops all history and records the scene that undo falls back to.
    pub fn reset(&mut self, base: Option<Snapshot>) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.base = base;
    }

    pub fn capture(&mut self, scene: &Scene, frame: ViewportFrame) -> Result<&Snapshot> {
        let snapshot = Snapshot::of(scene, frame)?;
        tracing::debug!(id = %snapshot.id, objects = scene.len(), "captured snapshot");
        self.undo_stack.push(snapshot);
        if self.undo_stack.len() > MAX_HISTORY {
            let dropped = self.undo_stack.remove(0);
            self.base = Some(dropped);
        }
        self.redo_stack.clear();
        Ok(&self.undo_stack[self.undo_stack.len() - 1])
    }

    /// `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<Reload> {
        let top = self.undo_stack.pop()?;
        self.redo_stack.push(top);
        Some(match self.undo_stack.last() {
            Some(prev) => Reload::Snapshot(prev.clone()),
            None => Reload::Base(self.base.clone()),
        })
    }

    pub fn redo(&mut self) -> Option<Reload> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push(next.clone());
        Some(Reload::Snapshot(next))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.undo_stack.last()
    }

    pub fn base(&self) -> Option<&Snapshot> {
        self.base.as_ref()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn history(&self) -> Vec<String> {
        self.undo_stack.iter().map(|s| s.id.clone()).collect()
    }
}

pub fn snapshot_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now_millis() as u64, &suffix[..8])
}

#[cfg(target_arch = "wasm32")]
pub fn now_millis() -> f64 {
    js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
pub fn now_millis() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::SceneObject;
    use kurbo::Rect;

    fn frame() -> ViewportFrame {
        ViewportFrame { width: 800.0, height: 600.0 }
    }

    fn mutate(scene: &mut Scene, i: usize) {
        scene.add(SceneObject::rect(0, Rect::new(0.0, 0.0, 5.0 + i as f64, 5.0), "#000", "#000"));
    }

    fn load(reload: Reload) -> Scene {
        match reload {
            Reload::Snapshot(s) => s.restore().unwrap(),
            Reload::Base(Some(s)) => s.restore().unwrap(),
            Reload::Base(None) => Scene::new(),
        }
    }

    #[test]
    fn fresh_store_cannot_undo() {
        let mut store = SnapshotStore::new();
        assert!(!store.can_undo());
        assert!(!store.can_redo());
        assert!(store.undo().is_none());
        assert!(store.redo().is_none());
        store.capture(&Scene::new(), frame()).unwrap();
        assert!(store.can_undo());
    }

    #[test]
    fn n_captures_then_n_undos_restore_base() {
        let mut scene = Scene::new();
        mutate(&mut scene, 0);
        let mut store = SnapshotStore::new();
        store.reset(Some(Snapshot::of(&scene, frame()).unwrap()));
        let before = scene.clone();

        for i in 1..=4 {
            mutate(&mut scene, i);
            store.capture(&scene, frame()).unwrap();
        }
        for _ in 0..4 {
            scene = load(store.undo().unwrap());
        }
        assert_eq!(scene, before);
        assert!(!store.can_undo());
        assert_eq!(store.redo_len(), 4);
    }

    #[test]
    fn undo_then_redo_is_symmetric() {
        let mut scene = Scene::new();
        let mut store = SnapshotStore::new();
        for i in 0..3 {
            mutate(&mut scene, i);
            store.capture(&scene, frame()).unwrap();
        }
        let before = scene.clone();
        let _ = load(store.undo().unwrap());
        let after = load(store.redo().unwrap());
        assert_eq!(after, before);
    }

    #[test]
    fn capture_after_undo_clears_redo() {
        let mut scene = Scene::new();
        let mut store = SnapshotStore::new();
        store.capture(&scene, frame()).unwrap();
        store.undo();
        assert!(store.can_redo());
        mutate(&mut scene, 1);
        store.capture(&scene, frame()).unwrap();
        assert!(!store.can_redo());
        assert_eq!(store.undo_len(), 1);
    }

    #[test]
    fn history_is_capped() {
        let scene = Scene::new();
        let mut store = SnapshotStore::new();
        for _ in 0..(MAX_HISTORY + 5) {
            store.capture(&scene, frame()).unwrap();
        }
        assert_eq!(store.undo_len(), MAX_HISTORY);
        assert!(store.base().is_some());
    }

    #[test]
    fn snapshot_ids_differ() {
        assert_ne!(snapshot_id(), snapshot_id());
        let s = Snapshot::of(&Scene::new(), frame()).unwrap();
        assert_eq!(s.frame, frame());
    }
}
