use serde::{Serialize, Deserialize};
use kurbo::Vec2;
use crate::objects::{ObjectId, SceneObject};
use crate::error::{EngineError, Result};

const DOCUMENT_VERSION: u32 = 1;

/// Layer-order moves, applied to a single object.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum LayerMove {
    ToFront,
    ToBack,
    ToForward,
    ToBackward,
}

#[derive(Serialize, Deserialize)]
struct SceneDocument {
    version: u32,
    next_id: ObjectId,
    objects: Vec<SceneObject>,
}

/// Ordered object list, bottom-most first.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    pub(crate) objects: Vec<SceneObject>,
    pub(crate) next_id: ObjectId,
}

impl Default for Scene {
    fn default() -> Self {
        Scene::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Scene { objects: Vec::new(), next_id: 1 }
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn allocate_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Adds on top of the stack. The object's id is replaced with a fresh one.
    pub fn add(&mut self, mut obj: SceneObject) -> ObjectId {
        obj.id = self.allocate_id();
        let id = obj.id;
        self.objects.push(obj);
        id
    }

    pub fn insert_at(&mut self, index: usize, mut obj: SceneObject) -> ObjectId {
        obj.id = self.allocate_id();
        let id = obj.id;
        let index = index.min(self.objects.len());
        self.objects.insert(index, obj);
        id
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        let pos = self.index_of(id)?;
        Some(self.objects.remove(pos))
    }

    /// Swaps `id` for `replacement` in place, keeping its stacking position.
    pub fn replace(&mut self, id: ObjectId, replacement: SceneObject) -> Result<ObjectId> {
        let pos = self.index_of(id).ok_or(EngineError::ObjectNotFound(id))?;
        self.objects.remove(pos);
        Ok(self.insert_at(pos, replacement))
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    pub fn index_of(&self, id: ObjectId) -> Option<usize> {
        self.objects.iter().position(|o| o.id == id)
    }

    /// Independent copy placed right above the original.
    pub fn duplicate(&mut self, id: ObjectId, offset: Vec2) -> Result<ObjectId> {
        let pos = self.index_of(id).ok_or(EngineError::ObjectNotFound(id))?;
        let mut copy = self.objects[pos].clone();
        copy.translate(offset);
        copy.name = format!("{} copy", copy.name);
        Ok(self.insert_at(pos + 1, copy))
    }

    /// Returns false when the object is missing or already in place.
    pub fn move_layer(&mut self, id: ObjectId, to: LayerMove) -> bool {
        let Some(pos) = self.index_of(id) else { return false; };
        let last = self.objects.len() - 1;
        match to {
            LayerMove::ToFront => {
                if pos == last { return false; }
                let obj = self.objects.remove(pos);
                self.objects.push(obj);
            }
            LayerMove::ToBack => {
                if pos == 0 { return false; }
                let obj = self.objects.remove(pos);
                self.objects.insert(0, obj);
            }
            LayerMove::ToForward => {
                if pos == last { return false; }
                self.objects.swap(pos, pos + 1);
            }
            LayerMove::ToBackward => {
                if pos == 0 { return false; }
                self.objects.swap(pos, pos - 1);
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn serialize(&self) -> Result<String> {
        let doc = SceneDocument { version: DOCUMENT_VERSION, next_id: self.next_id, objects: self.objects.clone() };
        Ok(serde_json::to_string(&doc)?)
    }

    pub fn deserialize(data: &str) -> Result<Scene> {
        let doc: SceneDocument = serde_json::from_str(data)?;
        let max_id = doc.objects.iter().map(|o| o.id).max().unwrap_or(0);
        Ok(Scene { objects: doc.objects, next_id: doc.next_id.max(max_id + 1) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Rect;

    fn scene_with(n: usize) -> (Scene, Vec<ObjectId>) {
        let mut scene = Scene::new();
        let ids = (0..n)
            .map(|i| scene.add(SceneObject::rect(0, Rect::new(0.0, 0.0, 10.0, 10.0 + i as f64), "#000", "#000")))
            .collect();
        (scene, ids)
    }

    fn order(scene: &Scene) -> Vec<ObjectId> {
        scene.objects().iter().map(|o| o.id).collect()
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let (scene, ids) = scene_with(3);
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(scene.len(), 3);
    }

    #[test]
    fn layer_moves() {
        let (mut scene, ids) = scene_with(3);
        assert!(scene.move_layer(ids[0], LayerMove::ToFront));
        assert_eq!(order(&scene), vec![2, 3, 1]);
        assert!(!scene.move_layer(ids[0], LayerMove::ToForward));
        assert!(scene.move_layer(ids[0], LayerMove::ToBackward));
        assert_eq!(order(&scene), vec![2, 1, 3]);
        assert!(scene.move_layer(ids[2], LayerMove::ToBack));
        assert_eq!(order(&scene), vec![3, 2, 1]);
        assert!(!scene.move_layer(99, LayerMove::ToBack));
    }

    #[test]
    fn serialize_round_trip_is_idempotent() {
        let (mut scene, ids) = scene_with(2);
        scene.remove(ids[0]);
        let data = scene.serialize().unwrap();
        let restored = Scene::deserialize(&data).unwrap();
        assert_eq!(restored, scene);
        assert_eq!(restored.serialize().unwrap(), data);
        let mut restored = restored;
        assert_eq!(restored.allocate_id(), 3);
    }

    #[test]
    fn replace_keeps_position() {
        let (mut scene, ids) = scene_with(3);
        let replacement = SceneObject::rect(0, Rect::new(0.0, 0.0, 1.0, 1.0), "#fff", "#fff");
        let new_id = scene.replace(ids[1], replacement).unwrap();
        assert_eq!(order(&scene), vec![1, new_id, 3]);
        assert!(scene.replace(42, SceneObject::rect(0, Rect::ZERO, "#000", "#000")).is_err());
    }

    #[test]
    fn duplicate_is_independent() {
        let (mut scene, ids) = scene_with(1);
        let copy = scene.duplicate(ids[0], Vec2::new(10.0, 10.0)).unwrap();
        scene.get_mut(copy).unwrap().angle = 45.0;
        assert_eq!(scene.get(ids[0]).unwrap().angle, 0.0);
        assert_eq!(scene.get(copy).unwrap().left, scene.get(ids[0]).unwrap().left + 10.0);
    }
}
