//! Tabmind: coordination layer for an on-device page assistant
//!
//! Tracks live client connections, supervises per-page content agents, manages
//! the local model's availability and download, runs cancellable streaming
//! generation sessions, and caches page question suggestions.

pub mod agent;
pub mod channel;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod suggestions;
pub mod types;
