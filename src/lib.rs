//! CareHub core - session lifecycle and guardian permissions
//!
//! This library provides token issuance and revocation, device-scoped
//! refresh sessions, the guardian invitation state machine and the
//! permission checks that gate every care-subject operation.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod guardian;
pub mod handlers;
pub mod notification;
pub mod security;
pub mod security_logger;
pub mod storage;

// Re-export main components
pub use app_state::AppState;
pub use config::ServerConfig;
pub use error::{CareHubError, Result};
