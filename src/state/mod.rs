// Publish bookkeeping shared by the sync loop and the command dispatcher

mod engine;
mod gate;

pub use engine::Engine;
pub use gate::{ChangeGate, PublishState};
