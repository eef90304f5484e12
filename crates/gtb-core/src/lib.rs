//! Core domain + application logic for the Gemini Telegram Bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the Gemini
//! HTTP API live behind ports (traits) implemented in adapter crates.

pub mod chunker;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod followup;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod personality;
pub mod pipeline;
pub mod security;
pub mod usage;

pub use errors::{Error, Result};
