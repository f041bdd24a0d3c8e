use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use crate::backend::Lighting;
use crate::brush::DEFAULT_BRUSH_SIZE;
use crate::types::DEFAULT_ASPECT_RATIO;
use crate::error::Result;

/// Key under which the persisted slices live.
pub const STORAGE_KEY: &str = "photo-editor-state";

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(default)]
pub struct Settings {
    pub model: String,
    pub sampler: String,
    pub steps: u32,
    /// Negative means "let the backend pick".
    pub seed: i64,
    pub prompt_positive: String,
    pub prompt_negative: String,
    pub lighting: Lighting,
    pub brush_size: f64,
    pub aspect_ratio: String,
    pub mask_color: String,
    pub fixed_background: String,
    pub background_removal_model: String,
    /// When cleared, every finished stroke starts an inpaint that the host
    /// picks up with `Editor::take_queued_run`.
    pub run_manually: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            model: "lama".to_string(),
            sampler: "ddim".to_string(),
            steps: 30,
            seed: -1,
            prompt_positive: String::new(),
            prompt_negative: String::new(),
            lighting: Lighting::default(),
            brush_size: DEFAULT_BRUSH_SIZE,
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            mask_color: "#ffffff".to_string(),
            fixed_background: "#ffffff".to_string(),
            background_removal_model: "u2net".to_string(),
            run_manually: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Ctime,
    Mtime,
    Name,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Descending,
    Ascending,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(default)]
pub struct FileManagerState {
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub layout: String,
    pub search_text: String,
}

impl Default for FileManagerState {
    fn default() -> Self {
        FileManagerState { sort_by: SortBy::default(), sort_order: SortOrder::default(), layout: "masonry".to_string(), search_text: String::new() }
    }
}

/// The only slices that survive a page reload.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(default)]
pub struct PersistedState {
    pub settings: Settings,
    pub file_manager_state: FileManagerState,
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }
}

/// `window.localStorage`; silently unavailable in private modes.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default)]
pub struct LocalStorage;

#[cfg(target_arch = "wasm32")]
impl LocalStorage {
    fn storage() -> Option<web_sys::Storage> {
        web_sys::window()?.local_storage().ok().flatten()
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for LocalStorage {
    fn get(&self, key: &str) -> Option<String> {
        Self::storage()?.get_item(key).ok().flatten()
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Some(storage) = Self::storage() {
            if storage.set_item(key, value).is_err() {
                tracing::warn!(key, "localStorage write rejected");
            }
        }
    }
}

impl PersistedState {
    /// Falls back to defaults when nothing was stored or the entry is corrupt.
    pub fn load(store: &dyn KeyValueStore) -> PersistedState {
        let Some(raw) = store.get(STORAGE_KEY) else { return PersistedState::default(); };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable persisted state");
                PersistedState::default()
            }
        }
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        store.set(STORAGE_KEY, &serde_json::to_string(self)?);
        Ok(())
    }
}
