//! # Controller Configuration
//!
//! Reporter identity, member clusters and the retry timings of the watch
//! loop, read from the process environment.

use super::{env_var_list, env_var_or_default, env_var_or_default_bool, env_var_or_default_str};
use std::time::Duration;

/// Settings for the FailoverScheme watch loop and the engine behind it.
///
/// Every field falls back to the defaults in `constants.rs` when its
/// variable is unset or unparsable.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace the controller runs in; doubles as the status reporter identity
    pub controller_namespace: String,
    /// Cluster name the local cluster is registered under
    pub local_cluster_name: String,
    /// Kubeconfig holding one context per remote cluster (unset = local cluster only)
    pub remote_kubeconfig: Option<String>,
    /// Contexts in `remote_kubeconfig` to register; each context name becomes a cluster name
    pub remote_cluster_contexts: Vec<String>,
    /// Register clusters from `solo.io/kubeconfig` Secrets in `controller_namespace`
    pub watch_cluster_secrets: bool,
    /// Watch stream backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Watch stream backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Pause before resuming after an unclassified watch error (seconds)
    pub watch_restart_delay_secs: u64,
    /// Pause before restarting a controller stream that ended (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Fibonacci requeue floor for FAILED schemes (minutes)
    pub failed_requeue_min_minutes: u64,
    /// Fibonacci requeue ceiling for FAILED schemes (minutes)
    pub failed_requeue_max_minutes: u64,
    /// `json` (default) or `text`
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            local_cluster_name: DEFAULT_LOCAL_CLUSTER_NAME.to_string(),
            remote_kubeconfig: None,
            remote_cluster_contexts: Vec::new(),
            watch_cluster_secrets: false,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            failed_requeue_min_minutes: DEFAULT_FAILED_REQUEUE_MIN_MINUTES,
            failed_requeue_max_minutes: DEFAULT_FAILED_REQUEUE_MAX_MINUTES,
            log_format: "json".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Read every setting from the environment
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            controller_namespace: env_var_or_default_str(
                "POD_NAMESPACE",
                DEFAULT_CONTROLLER_NAMESPACE,
            ),
            local_cluster_name: env_var_or_default_str(
                "LOCAL_CLUSTER_NAME",
                DEFAULT_LOCAL_CLUSTER_NAME,
            ),
            remote_kubeconfig: std::env::var("REMOTE_KUBECONFIG")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            remote_cluster_contexts: env_var_list("REMOTE_CLUSTER_CONTEXTS"),
            watch_cluster_secrets: env_var_or_default_bool("WATCH_CLUSTER_SECRETS", false),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            failed_requeue_min_minutes: env_var_or_default(
                "FAILED_REQUEUE_MIN_MINUTES",
                DEFAULT_FAILED_REQUEUE_MIN_MINUTES,
            ),
            failed_requeue_max_minutes: env_var_or_default(
                "FAILED_REQUEUE_MAX_MINUTES",
                DEFAULT_FAILED_REQUEUE_MAX_MINUTES,
            ),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
        }
    }

    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Whether remote clusters come from a kubeconfig rather than the local cluster alone
    pub fn has_remote_clusters(&self) -> bool {
        self.remote_kubeconfig.is_some() && !self.remote_cluster_contexts.is_empty()
    }
}
