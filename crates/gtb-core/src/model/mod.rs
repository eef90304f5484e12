//! Model port: the boundary between the pipeline and the AI service.

pub mod client;
pub mod types;
