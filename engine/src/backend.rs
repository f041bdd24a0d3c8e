use serde::{Serialize, Deserialize};
use crate::error::{EngineError, Result};

pub const POLL_INTERVAL_MS: u32 = 1000;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[serde(rename_all = "snake_case")]
pub enum RunAction {
    Inpaint,
    RemoveBackground,
    Render,
    DescribeImage,
}

impl RunAction {
    pub fn endpoint(self) -> &'static str {
        match self {
            RunAction::Inpaint => "/inpaint",
            RunAction::RemoveBackground => "/remove_background",
            RunAction::Render => "/render",
            RunAction::DescribeImage => "/describe",
        }
    }

    /// Inpainting answers synchronously; the rest go through job polling.
    pub fn is_polled(self) -> bool {
        self != RunAction::Inpaint
    }

    pub fn parse(name: &str) -> Option<RunAction> {
        match name {
            "inpaint" => Some(RunAction::Inpaint),
            "remove_background" => Some(RunAction::RemoveBackground),
            "render" => Some(RunAction::Render),
            "describe_image" | "describe" => Some(RunAction::DescribeImage),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Serialize, Clone, Debug)]
pub struct InpaintRequest {
    pub image: String,
    pub mask: String,
    pub model: String,
    pub sampler: String,
    pub steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_rect: Option<CropRect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extender_rect: Option<CropRect>,
    pub seed: i64,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct Lighting {
    pub direction: f64,
    pub intensity: f64,
}

impl Default for Lighting {
    fn default() -> Self {
        Lighting { direction: 0.0, intensity: 1.0 }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct RenderRequest {
    pub image: String,
    pub image_objects: String,
    pub prompt_positive: String,
    pub prompt_negative: String,
    pub width: u32,
    pub height: u32,
    pub lighting: Lighting,
}

#[derive(Serialize, Clone, Debug)]
pub struct RemoveBackgroundRequest {
    pub image: String,
    pub model: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct DescribeRequest {
    pub image: String,
}

#[derive(Serialize, Clone, Debug)]
#[serde(untagged)]
pub enum RequestBody {
    Inpaint(InpaintRequest),
    Render(RenderRequest),
    RemoveBackground(RemoveBackgroundRequest),
    Describe(DescribeRequest),
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    InQueue,
    InProgress,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct JobSubmitted {
    pub id: String,
    pub status: JobState,
}

#[derive(Deserialize, Clone, Debug)]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

/// Payload of a finished job or of the synchronous inpaint endpoint.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
pub struct RunOutput {
    #[serde(default)]
    pub result: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl RunOutput {
    pub fn images(&self) -> Vec<String> {
        let mut all: Vec<String> = self.image.iter().cloned().collect();
        all.extend(self.result.iter().cloned());
        all
    }
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Progress {
    pub step: u32,
    pub total: u32,
}

/// Finds `Progress <n>/<m>` anywhere in `text`.
pub fn parse_progress(text: &str) -> Option<Progress> {
    let idx = text.find("Progress ")?;
    let rest = &text[idx + "Progress ".len()..];
    let (step, rest) = rest.split_once('/')?;
    let total: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    Some(Progress { step: step.trim().parse().ok()?, total: total.parse().ok()? })
}

#[derive(Serialize, Clone, PartialEq, Debug)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PollStep {
    /// Ask again after `interval_ms`.
    Continue { interval_ms: u32, progress: Option<Progress> },
    Done { output: RunOutput },
    /// The poller already saw a terminal state; do not poll again.
    Stopped,
}

/// Status-polling loop for one job. Stops for good at the first terminal
/// status.
#[derive(Clone, Debug)]
pub struct JobPoller {
    pub job_id: String,
    pub interval_ms: u32,
    finished: bool,
    last_progress: Option<Progress>,
}

impl JobPoller {
    pub fn new(job_id: impl Into<String>) -> Self {
        JobPoller { job_id: job_id.into(), interval_ms: POLL_INTERVAL_MS, finished: false, last_progress: None }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn last_progress(&self) -> Option<Progress> {
        self.last_progress
    }

    pub fn on_status(&mut self, status: JobStatus) -> Result<PollStep> {
        if self.finished { return Ok(PollStep::Stopped); }
        match status.status {
            JobState::InQueue | JobState::InProgress => {
                if let Some(text) = status.output.as_str() {
                    if let Some(p) = parse_progress(text) { self.last_progress = Some(p); }
                }
                Ok(PollStep::Continue { interval_ms: self.interval_ms, progress: self.last_progress })
            }
            JobState::Completed => {
                self.finished = true;
                let output = if status.output.is_null() { RunOutput::default() } else { serde_json::from_value(status.output)? };
                Ok(PollStep::Done { output })
            }
            JobState::Failed => {
                self.finished = true;
                let reason = status.error
                    .or_else(|| status.output.as_str().map(str::to_string))
                    .unwrap_or_else(|| format!("job {} failed", self.job_id));
                Err(EngineError::BackendTaskFailed(reason))
            }
        }
    }
}
