//! Component lifecycle: readiness signalling and ordered start/stop

mod component;
mod orchestrator;
mod readiness;

pub use component::Component;
pub use orchestrator::{Orchestrator, RunState};
pub use readiness::Readiness;
