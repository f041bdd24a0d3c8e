pub mod types;
pub mod error;
pub mod geometry;
pub mod objects;
pub mod scene;
pub mod history;
pub mod raster;
pub mod brush;
pub mod extract;
pub mod backend;
pub mod settings;
pub mod app_state;
pub mod animation;
pub mod logging;
pub mod engine;
pub mod events;
pub mod arrange;
pub mod runs;
pub mod commands;

pub use engine::{Editor, Interaction, Tool};
pub use error::{EngineError, Result};
pub use types::*;
pub use objects::*;
