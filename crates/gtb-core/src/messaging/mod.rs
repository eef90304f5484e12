//! Messaging port: the boundary between the pipeline and the chat platform.

pub mod port;
pub mod types;
