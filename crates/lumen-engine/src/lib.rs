pub mod codec;
pub mod controller;
pub mod error;
pub mod filters;
pub mod model;
pub mod prompts;

pub use controller::{LoadOutcome, ModelEvent, SessionController, SessionState};
pub use error::{Result, StudioError};
pub use model::{model_for_name, DryrunModel, GeminiModel, ModelRequest, VisionModel};
