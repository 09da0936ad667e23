//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health checks
pub const DEFAULT_METRICS_PORT: u16 = 9091;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default exponential backoff starting value for watch stream errors (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch stream errors (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Fibonacci backoff floor for FAILED schemes and reconcile errors (minutes)
pub const DEFAULT_FAILED_REQUEUE_MIN_MINUTES: u64 = 1;

/// Fibonacci backoff ceiling for FAILED schemes and reconcile errors (minutes)
pub const DEFAULT_FAILED_REQUEUE_MAX_MINUTES: u64 = 10;

/// Namespace used as reporter identity when `POD_NAMESPACE` is not set
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "gloo-system";

/// Cluster name the local cluster is registered under when no remote kubeconfig is given
pub const DEFAULT_LOCAL_CLUSTER_NAME: &str = "local";

/// Secret type of the kubeconfig Secrets that register member clusters
pub const KUBECONFIG_SECRET_TYPE: &str = "solo.io/kubeconfig";

/// Data key holding the kubeconfig in a cluster Secret
pub const KUBECONFIG_SECRET_KEY: &str = "kubeconfig";

/// Finalizer held on every FailoverScheme until its failover config is removed
pub const FAILOVER_SCHEME_FINALIZER: &str = "fed.solo.io/failover-scheme-cleanup";

/// Field manager name used for patches issued by this controller
pub const FIELD_MANAGER: &str = "failover-scheme-controller";

/// Name of the ingress port a gateway proxy exposes for cross-cluster failover traffic
pub const FAILOVER_PORT_NAME: &str = "failover";

/// Conventional port number behind [`FAILOVER_PORT_NAME`]
pub const FAILOVER_PORT_NUMBER: u32 = 15443;

/// TLS secret (in the owning instance's write namespace) used for upstream mTLS
pub const UPSTREAM_SECRET_NAME: &str = "failover-upstream";

/// Preferred admin proxy name inside a gloo install namespace
pub const DEFAULT_GATEWAY_PROXY_NAME: &str = "gateway-proxy";

/// Default gloo install namespace, used by the write namespace heuristic
pub const GLOO_SYSTEM_NAMESPACE: &str = "gloo-system";

/// Message written with the PENDING dirty bit
pub const DEPENDENCY_UPDATED_MESSAGE: &str =
    "A dependent resource was modified; the failover scheme will be re-processed";
