mod client;
mod mock;
mod response;
pub mod wire;

pub use client::{EvaluationClient, TriggerBackend};
pub use mock::MockBackend;
pub use response::ApiError;
