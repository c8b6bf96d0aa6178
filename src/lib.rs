pub mod cli;
pub mod config;
pub mod engine;
pub mod executor;
pub mod explain;
pub mod parser;
pub mod server;
pub mod types;

// Common entry points
pub use crate::config::Config;
pub use crate::engine::Engine;
pub use crate::types::*;
