//! ideastream - Authenticated SSE relay for streamed LLM completions
//!
//! This library provides the core functionality for the ideastream server:
//! configuration, bearer token verification, the completion provider client
//! and the streaming relay that turns provider fragments into SSE events.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod provider;
pub mod relay;

pub use config::Config;
pub use error::{Error, Result};
