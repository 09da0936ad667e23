//! # Configuration
//!
//! Controller and server settings loaded from environment variables.
//!
//! - `controller`: reconcile, backoff, watch and cluster settings
//! - `server`: metrics and health server settings

mod controller;
mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Controller configuration shared between the watch loop and error policy
pub type SharedControllerConfig = Arc<RwLock<ControllerConfig>>;

/// Server configuration shared between initialization and the HTTP server
pub type SharedServerConfig = Arc<RwLock<ServerConfig>>;

/// Load both configurations from the environment and wrap them for sharing
#[must_use]
pub fn create_shared_config() -> (SharedControllerConfig, SharedServerConfig) {
    (
        Arc::new(RwLock::new(ControllerConfig::from_env())),
        Arc::new(RwLock::new(ServerConfig::from_env())),
    )
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
pub(crate) fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |v| parse_bool(&v))
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Read a comma-separated environment variable, dropping empty entries
pub(crate) fn env_var_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| parse_list(&v))
        .unwrap_or_default()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
