use kurbo::Vec2;
use serde::Serialize;
use crate::app_state::{AppAction, NotificationLevel};
use crate::backend::{
    DescribeRequest, InpaintRequest, JobPoller, JobStatus, JobSubmitted, PollStep, RemoveBackgroundRequest,
    RenderRequest, RequestBody, RunAction, RunOutput,
};
use crate::brush::{line_group_from_paths, rasterize_mask};
use crate::engine::{Editor, Interaction};
use crate::extract::{ExtractedLayers, Extractor};
use crate::history::now_millis;
use crate::objects::{ObjectData, ObjectId, SceneObject};
use crate::raster::{decode_data_url, encode_base64, encode_png, is_transparent};
use crate::scene::Scene;
use crate::types::Rgba8;
use crate::error::{EngineError, Result};

/// Spacing between result layers dropped on the frame center.
pub const RESULT_STACK_OFFSET: Vec2 = Vec2::new(24.0, 24.0);

/// Request the host must send. `ticket` identifies the run in every later
/// call.
#[derive(Serialize, Clone, Debug)]
pub struct RunRequest {
    pub ticket: u64,
    pub action: RunAction,
    pub endpoint: &'static str,
    pub polled: bool,
    pub body: RequestBody,
}

#[derive(Clone, Debug)]
pub struct PendingRun {
    pub ticket: u64,
    pub action: RunAction,
    /// Layer pulsing while the run is out.
    pub target: Option<ObjectId>,
    pub poller: Option<JobPoller>,
    /// What an inpaint request was built from, removed once it succeeds.
    pub consumed: ConsumedMask,
}

/// Mask sources sent with an inpaint. Anything added after the request was
/// built stays in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConsumedMask {
    pub paths: Vec<ObjectId>,
    pub extra_masks: usize,
}

impl Editor {
    pub fn pending_run(&self) -> Option<&PendingRun> {
        self.pending.as_ref()
    }

    /// Builds the request for `action` and enters the processing state.
    /// Returns `Ok(None)` without touching anything when a run is already
    /// out or a gesture is in progress.
    pub fn begin_run(&mut self, action: RunAction) -> Result<Option<RunRequest>> {
        if self.app.is_processing || self.pending.is_some() {
            tracing::debug!(?action, "run rejected: already processing");
            return Ok(None);
        }
        if self.interaction != Interaction::Idle {
            tracing::debug!(?action, interaction = ?self.interaction, "run rejected: canvas busy");
            return Ok(None);
        }

        let (body, consumed) = match self.build_request(action) {
            Ok(built) => built,
            Err(e) => {
                self.notify_error(&e);
                return Err(e);
            }
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let target = self.pulse_target();
        if let Some(id) = target {
            let rest = self.scene.get(id).map_or(1.0, |o| o.opacity);
            self.animator.start_pulse(id, now_millis(), rest);
        }
        self.pending = Some(PendingRun { ticket, action, target, poller: None, consumed });
        self.dispatch(AppAction::ProcessingStarted);
        tracing::info!(ticket, ?action, "run started");

        Ok(Some(RunRequest { ticket, action, endpoint: action.endpoint(), polled: action.is_polled(), body }))
    }

    /// Records the job id the backend answered a polled submission with.
    pub fn job_submitted(&mut self, ticket: u64, job: JobSubmitted) -> Result<()> {
        let pending = self.pending_mut(ticket)?;
        tracing::debug!(ticket, job = %job.id, status = ?job.status, "job submitted");
        pending.poller = Some(JobPoller::new(job.id));
        Ok(())
    }

    /// Feeds one status response through the run's poller. Statuses for
    /// finished or unknown runs are ignored.
    pub fn poll_status(&mut self, ticket: u64, status: JobStatus) -> Result<PollStep> {
        let Some(pending) = self.pending.as_mut().filter(|p| p.ticket == ticket) else {
            return Ok(PollStep::Stopped);
        };
        let poller = pending.poller.get_or_insert_with(|| JobPoller::new(format!("run-{}", ticket)));
        match poller.on_status(status) {
            Ok(PollStep::Continue { interval_ms, progress }) => {
                if let Some(p) = progress {
                    self.dispatch(AppAction::Progress { step: p.step, total: p.total });
                }
                Ok(PollStep::Continue { interval_ms, progress })
            }
            Ok(PollStep::Done { output }) => {
                self.complete_run(ticket, output.clone())?;
                Ok(PollStep::Done { output })
            }
            Ok(PollStep::Stopped) => Ok(PollStep::Stopped),
            Err(e) => {
                self.fail_run(ticket, &e)?;
                Err(e)
            }
        }
    }

    /// Merges a successful result. Image results become new layers stacked on
    /// the frame center; a description replaces the positive prompt.
    pub fn complete_run(&mut self, ticket: u64, output: RunOutput) -> Result<Vec<ObjectId>> {
        let pending = self.finish_pending(ticket)?;

        if pending.action == RunAction::DescribeImage {
            let Some(text) = output.images().into_iter().next() else {
                let err = EngineError::BackendTaskFailed("empty description".into());
                self.notify_error(&err);
                return Err(err);
            };
            self.dispatch(AppAction::SetPrompt { positive: text, negative: None });
            self.notify(NotificationLevel::Info, "Prompt updated from image");
            tracing::info!(ticket, "prompt updated from description");
            return Ok(Vec::new());
        }

        match self.merge_results(&pending, &output) {
            Ok(ids) => {
                tracing::info!(ticket, layers = ids.len(), "run completed");
                Ok(ids)
            }
            Err(e) => {
                self.notify_error(&e);
                Err(e)
            }
        }
    }

    /// Abandons the run: the user is told, the scene stays as it was and no
    /// snapshot is taken.
    pub fn fail_run(&mut self, ticket: u64, err: &EngineError) -> Result<()> {
        self.finish_pending(ticket)?;
        tracing::warn!(ticket, error = %err, "run failed");
        self.notify_error(err);
        Ok(())
    }

    /// Opacity of every pulsing layer at `now`, for the host to draw.
    pub fn tick(&mut self, now: f64) -> Vec<(ObjectId, f64)> {
        self.animator.tick(now)
    }

    fn pending_mut(&mut self, ticket: u64) -> Result<&mut PendingRun> {
        self.pending.as_mut().filter(|p| p.ticket == ticket).ok_or(EngineError::StaleRun(ticket))
    }

    /// Leaves the processing state. Runs on every exit path of a run.
    fn finish_pending(&mut self, ticket: u64) -> Result<PendingRun> {
        if self.pending.as_ref().map_or(true, |p| p.ticket != ticket) {
            return Err(EngineError::StaleRun(ticket));
        }
        let pending = self.pending.take().ok_or(EngineError::StaleRun(ticket))?;
        if self.queued_run.as_ref().map_or(false, |r| r.ticket == ticket) {
            self.queued_run = None;
        }
        if let Some(id) = pending.target {
            self.animator.cancel(id);
        }
        self.dispatch(AppAction::ProcessingFinished);
        Ok(pending)
    }

    fn merge_results(&mut self, pending: &PendingRun, output: &RunOutput) -> Result<Vec<ObjectId>> {
        let action = pending.action;
        let sources = output.images();
        if sources.is_empty() {
            return Err(EngineError::BackendTaskFailed("response carried no image".into()));
        }
        // all payloads decode before the scene is touched
        let mut layers = Vec::with_capacity(sources.len());
        for src in &sources {
            let src = as_data_url(src);
            let pixmap = decode_data_url(&src)?;
            layers.push((src, pixmap.width(), pixmap.height()));
        }

        for id in &pending.consumed.paths {
            self.scene.remove(*id);
        }
        let used = pending.consumed.extra_masks.min(self.extra_masks.len());
        self.extra_masks.drain(..used);

        let center = self.frame_rect().center();
        let mut ids = Vec::with_capacity(layers.len());
        for (i, (src, w, h)) in layers.into_iter().enumerate() {
            let at = center + RESULT_STACK_OFFSET * i as f64;
            let mut obj = SceneObject::image(0, src.clone(), at.x, at.y, w as f64, h as f64);
            obj.name = format!("{} result {}", action.endpoint().trim_start_matches('/'), self.renders.len() + 1);
            ids.push(self.scene.add(obj));
            self.renders.push(src);
        }
        if self.selection.map_or(false, |id| self.scene.get(id).is_none()) {
            self.selection = None;
        }
        self.capture()?;
        Ok(ids)
    }

    /// The selected layer, else the top-most image.
    fn pulse_target(&self) -> Option<ObjectId> {
        self.selection
            .filter(|id| self.scene.get(*id).is_some())
            .or_else(|| self.scene.objects().iter().rev().find(|o| o.is_image()).map(|o| o.id))
    }

    /// Request layers plus the scene they were rebuilt from.
    fn extract_with_scene(&self) -> Result<(ExtractedLayers, Scene)> {
        let snapshot = self.latest_snapshot()?;
        let extractor = Extractor::new(Rgba8::parse(&self.app.settings.fixed_background));
        let layers = extractor.extract_snapshot(&snapshot, &self.app.settings.aspect_ratio)?;
        Ok((layers, snapshot.restore()?))
    }

    fn extract_layers(&self) -> Result<ExtractedLayers> {
        Ok(self.extract_with_scene()?.0)
    }

    fn build_request(&self, action: RunAction) -> Result<(RequestBody, ConsumedMask)> {
        let settings = &self.app.settings;
        let body = match action {
            RunAction::Inpaint => {
                let (layers, scene) = self.extract_with_scene()?;
                let paths: Vec<SceneObject> = scene.objects().iter().filter(|o| o.is_path() && o.visible).cloned().collect();
                let group = line_group_from_paths(&paths, layers.clip);
                let color = Rgba8::parse(&settings.mask_color);
                let mask = rasterize_mask(layers.width, layers.height, &[group], &self.extra_masks, color)?;
                if is_transparent(&mask) {
                    return Err(EngineError::EmptyMaskSubmission);
                }
                let consumed = ConsumedMask { paths: paths.iter().map(|o| o.id).collect(), extra_masks: self.extra_masks.len() };
                let request = InpaintRequest {
                    image: encode_base64(&encode_png(&layers.composite())?),
                    mask: encode_base64(&encode_png(&mask)?),
                    model: settings.model.clone(),
                    sampler: settings.sampler.clone(),
                    steps: settings.steps,
                    crop_rect: None,
                    extender_rect: None,
                    seed: settings.seed,
                };
                return Ok((RequestBody::Inpaint(request), consumed));
            }
            RunAction::Render => {
                let layers = self.extract_layers()?;
                RequestBody::Render(RenderRequest {
                    image: encode_base64(&encode_png(&layers.movable)?),
                    image_objects: encode_base64(&encode_png(&layers.fixed)?),
                    prompt_positive: settings.prompt_positive.clone(),
                    prompt_negative: settings.prompt_negative.clone(),
                    width: layers.width,
                    height: layers.height,
                    lighting: settings.lighting,
                })
            }
            RunAction::RemoveBackground => {
                let image = match self.selected_image_src() {
                    Some(src) => encode_base64(&encode_png(&decode_data_url(src)?)?),
                    None => encode_base64(&encode_png(&self.extract_layers()?.composite())?),
                };
                RequestBody::RemoveBackground(RemoveBackgroundRequest {
                    image,
                    model: settings.background_removal_model.clone(),
                })
            }
            RunAction::DescribeImage => {
                let layers = self.extract_layers()?;
                RequestBody::Describe(DescribeRequest { image: encode_base64(&encode_png(&layers.composite())?) })
            }
        };
        Ok((body, ConsumedMask::default()))
    }

    fn selected_image_src(&self) -> Option<&str> {
        let obj = self.scene.get(self.selection?)?;
        match &obj.data {
            ObjectData::Image { src } => Some(src),
            _ => None,
        }
    }

    /// Convenience for hosts that report transport errors as text.
    pub fn fail_run_unreachable(&mut self, ticket: u64, message: &str) -> Result<()> {
        self.fail_run(ticket, &EngineError::BackendUnreachable(message.to_string()))
    }
}

fn as_data_url(payload: &str) -> String {
    if payload.starts_with("data:") {
        payload.to_string()
    } else {
        format!("data:image/png;base64,{}", payload.trim())
    }
}
