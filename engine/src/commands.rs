use wasm_bindgen::prelude::*;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use kurbo::Point;
use crate::app_state::AppAction;
use crate::backend::{JobStatus, JobSubmitted, RunAction, RunOutput};
use crate::engine::{Editor, Tool};
use crate::events::CanvasEvent;
use crate::objects::ObjectId;
use crate::scene::LayerMove;
use crate::types::{ViewMode, ASPECT_RATIOS};
use crate::error::{EngineError, Result};

#[derive(Deserialize)]
struct Command {
    action: String,
    #[serde(default)]
    params: Value,
}

#[derive(Deserialize)]
struct Source {
    src: String,
}

#[derive(Deserialize)]
struct Ticket {
    ticket: u64,
}

#[derive(Deserialize)]
struct ViewModeParams {
    id: ObjectId,
    mode: String,
}

fn params<T: DeserializeOwned>(value: &Value) -> Result<T> {
    Ok(serde_json::from_value(value.clone())?)
}

#[wasm_bindgen]
impl Editor {
    /// JSON command entry point for the host. Every reply is a JSON object;
    /// failures come back as `{"error": "..."}`.
    pub fn execute_command(&mut self, cmd_json: &str) -> String {
        let cmd: Command = match serde_json::from_str(cmd_json) {
            Ok(c) => c,
            Err(e) => return json!({ "error": format!("Invalid JSON: {}", e) }).to_string(),
        };
        match self.run_command(&cmd.action, &cmd.params) {
            Ok(reply) => reply.to_string(),
            Err(e) => {
                tracing::debug!(action = %cmd.action, error = %e, "command failed");
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }
}

impl Editor {
    fn run_command(&mut self, action: &str, p: &Value) -> Result<Value> {
        match action {
            "load_image" => {
                let Source { src } = params(p)?;
                let id = self.load_image(&src)?;
                Ok(json!({ "success": true, "id": id }))
            }
            "add_image" => {
                let Source { src } = params(p)?;
                let id = self.add_image(&src)?;
                Ok(json!({ "success": true, "id": id }))
            }
            "add_mask" => {
                let Source { src } = params(p)?;
                self.add_mask_image(&src)?;
                Ok(json!({ "success": true }))
            }
            "event" => {
                let event: CanvasEvent = params(p)?;
                self.handle_event(event)?;
                Ok(json!({ "success": true, "menu_anchor": self.menu_anchor(), "run": self.take_queued_run() }))
            }
            "undo" => Ok(json!({ "success": self.undo()? })),
            "redo" => Ok(json!({ "success": self.redo()? })),
            "delete" => Ok(json!({ "success": self.delete_selected()? })),
            "select" => {
                let id = p["id"].as_u64().map(|v| v as ObjectId);
                self.select(id);
                Ok(json!({ "success": true, "selection": self.selection() }))
            }
            "move_layer" => {
                let to: LayerMove = serde_json::from_value(p["to"].clone())?;
                Ok(json!({ "success": self.move_selected(to)? }))
            }
            "duplicate" => Ok(json!({ "success": true, "id": self.duplicate_selected()? })),
            "begin_crop" => Ok(json!({ "success": true, "id": self.begin_crop()? })),
            "apply_crop" => Ok(json!({ "success": true, "id": self.apply_crop()? })),
            "cancel_crop" => {
                self.cancel_crop();
                Ok(json!({ "success": true }))
            }
            "set_view_mode" => {
                let ViewModeParams { id, mode } = params(p)?;
                let mode = ViewMode::parse(&mode).ok_or_else(|| EngineError::UnknownCommand(format!("view mode {}", mode)))?;
                self.set_view_mode(id, mode)?;
                Ok(json!({ "success": true }))
            }
            "set_aspect_ratio" => {
                let name = p["name"].as_str().unwrap_or_default();
                self.set_aspect_ratio(name)?;
                Ok(json!({ "success": true, "frame": self.frame_overlay() }))
            }
            "get_aspect_ratios" => Ok(serde_json::to_value(ASPECT_RATIOS)?),
            "set_tool" => {
                let tool: Tool = serde_json::from_value(p["tool"].clone())?;
                self.set_tool(tool);
                Ok(json!({ "success": true }))
            }
            "set_brush_size" => {
                let size = p["size"].as_f64().unwrap_or(self.brush().base_size());
                self.set_brush_size(size);
                Ok(json!({ "success": true, "width": self.brush().width() }))
            }
            "resize" => {
                let width = p["width"].as_f64().unwrap_or(self.viewport.width);
                let height = p["height"].as_f64().unwrap_or(self.viewport.height);
                self.resize(width, height);
                Ok(json!({ "success": true }))
            }
            "zoom" => {
                let center = self.viewport.center();
                let at = Point::new(p["x"].as_f64().unwrap_or(center.x), p["y"].as_f64().unwrap_or(center.y));
                let zoom = p["zoom"].as_f64().unwrap_or(self.viewport.zoom);
                self.zoom_at(at, zoom);
                Ok(json!({ "success": true, "zoom": self.viewport.zoom }))
            }
            "fit" => {
                self.fit_to_frame();
                Ok(json!({ "success": true, "zoom": self.viewport.zoom }))
            }
            "dispatch" => {
                let app_action: AppAction = params(p)?;
                self.dispatch(app_action);
                Ok(json!({ "success": true }))
            }
            "begin_run" => {
                let name = p["action"].as_str().unwrap_or_default();
                let run = RunAction::parse(name)
                    .ok_or_else(|| EngineError::UnknownCommand(format!("run action {}", name)))?;
                match self.begin_run(run)? {
                    Some(request) => Ok(serde_json::to_value(request)?),
                    None => Ok(json!({ "success": false, "busy": true })),
                }
            }
            "job_submitted" => {
                let Ticket { ticket } = params(p)?;
                let job: JobSubmitted = serde_json::from_value(p["job"].clone())?;
                self.job_submitted(ticket, job)?;
                Ok(json!({ "success": true }))
            }
            "poll_status" => {
                let Ticket { ticket } = params(p)?;
                let status: JobStatus = serde_json::from_value(p["status"].clone())?;
                Ok(serde_json::to_value(self.poll_status(ticket, status)?)?)
            }
            "complete_run" => {
                let Ticket { ticket } = params(p)?;
                let output: RunOutput = serde_json::from_value(p["output"].clone())?;
                let ids = self.complete_run(ticket, output)?;
                Ok(json!({ "success": true, "ids": ids }))
            }
            "fail_run" => {
                let Ticket { ticket } = params(p)?;
                let message = p["message"].as_str().unwrap_or("request failed");
                let err = if p["unreachable"].as_bool().unwrap_or(false) {
                    EngineError::BackendUnreachable(message.to_string())
                } else {
                    EngineError::BackendTaskFailed(message.to_string())
                };
                self.fail_run(ticket, &err)?;
                Ok(json!({ "success": true }))
            }
            "tick" => {
                let now = p["now"].as_f64().unwrap_or_else(crate::history::now_millis);
                let frames: Vec<Value> = self.tick(now).into_iter().map(|(id, opacity)| json!({ "id": id, "opacity": opacity })).collect();
                Ok(Value::Array(frames))
            }
            "take_notifications" => Ok(serde_json::to_value(self.take_notifications())?),
            "get_state" => Ok(serde_json::to_value(self.view())?),
            "get_settings" => Ok(serde_json::to_value(&self.app.settings)?),
            "get_scene" => Ok(serde_json::to_value(self.scene.objects())?),
            "get_history" => Ok(serde_json::to_value(self.history.history())?),
            other => Err(EngineError::UnknownCommand(other.to_string())),
        }
    }
}
