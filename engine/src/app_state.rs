use serde::{Serialize, Deserialize};
use crate::backend::Lighting;
use crate::brush::{MAX_BRUSH_SIZE, MIN_BRUSH_SIZE};
use crate::settings::{FileManagerState, PersistedState, Settings, SortBy, SortOrder};
use crate::types::AspectRatio;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Application-wide state. Handed to the editor at construction and only
/// changed through [`AppState::reduce`].
#[derive(Serialize, Clone, PartialEq, Debug, Default)]
pub struct AppState {
    pub settings: Settings,
    pub file_manager_state: FileManagerState,
    pub is_processing: bool,
    pub progress: Option<(u32, u32)>,
    pub notifications: Vec<Notification>,
}

#[derive(Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppAction {
    SetBrushSize { size: f64 },
    SetAspectRatio { name: String },
    SetPrompt { positive: String, negative: Option<String> },
    SetModel { model: String },
    SetSampler { sampler: String },
    SetSteps { steps: u32 },
    SetSeed { seed: i64 },
    SetLighting { lighting: Lighting },
    SetMaskColor { color: String },
    SetRunManually { enabled: bool },
    SetFileSort { sort_by: SortBy, sort_order: SortOrder },
    SetFileLayout { layout: String },
    SetSearchText { text: String },
    ProcessingStarted,
    ProcessingFinished,
    Progress { step: u32, total: u32 },
    Notify { notification: Notification },
    DismissNotifications,
}

impl AppState {
    pub fn from_persisted(persisted: PersistedState) -> Self {
        AppState { settings: persisted.settings, file_manager_state: persisted.file_manager_state, ..AppState::default() }
    }

    pub fn persisted(&self) -> PersistedState {
        PersistedState { settings: self.settings.clone(), file_manager_state: self.file_manager_state.clone() }
    }

    pub fn reduce(mut self, action: AppAction) -> AppState {
        match action {
            AppAction::SetBrushSize { size } => {
                if !size.is_nan() { self.settings.brush_size = size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE); }
            }
            AppAction::SetAspectRatio { name } => {
                if AspectRatio::lookup(&name).is_some() { self.settings.aspect_ratio = name; }
            }
            AppAction::SetPrompt { positive, negative } => {
                self.settings.prompt_positive = positive;
                if let Some(negative) = negative { self.settings.prompt_negative = negative; }
            }
            AppAction::SetModel { model } => self.settings.model = model,
            AppAction::SetSampler { sampler } => self.settings.sampler = sampler,
            AppAction::SetSteps { steps } => self.settings.steps = steps.max(1),
            AppAction::SetSeed { seed } => self.settings.seed = seed,
            AppAction::SetLighting { lighting } => self.settings.lighting = lighting,
            AppAction::SetMaskColor { color } => self.settings.mask_color = color,
            AppAction::SetRunManually { enabled } => self.settings.run_manually = enabled,
            AppAction::SetFileSort { sort_by, sort_order } => {
                self.file_manager_state.sort_by = sort_by;
                self.file_manager_state.sort_order = sort_order;
            }
            AppAction::SetFileLayout { layout } => self.file_manager_state.layout = layout,
            AppAction::SetSearchText { text } => self.file_manager_state.search_text = text,
            AppAction::ProcessingStarted => {
                self.is_processing = true;
                self.progress = None;
            }
            AppAction::ProcessingFinished => {
                self.is_processing = false;
                self.progress = None;
            }
            AppAction::Progress { step, total } => self.progress = Some((step, total)),
            AppAction::Notify { notification } => self.notifications.push(notification),
            AppAction::DismissNotifications => self.notifications.clear(),
        }
        self
    }

    /// True when the action touches a persisted slice.
    pub fn is_persisted_action(action: &AppAction) -> bool {
        !matches!(
            action,
            AppAction::ProcessingStarted | AppAction::ProcessingFinished | AppAction::Progress { .. }
                | AppAction::Notify { .. } | AppAction::DismissNotifications
        )
    }
}
