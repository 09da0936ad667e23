//! # Error Policy
//!
//! Requeue decisions for failed reconciles and classification of watch
//! stream errors.

use crate::controller::failover::ReconcilerError;
use crate::crd::FailoverScheme;
use crate::observability;
use crate::runtime::watch_loop::ControllerContext;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

/// Requeue a scheme whose reconcile returned an error, with per-scheme
/// Fibonacci backoff
pub fn handle_reconciliation_error(
    scheme: Arc<FailoverScheme>,
    error: &ReconcilerError,
    ctx: Arc<ControllerContext>,
) -> Action {
    let error_span = tracing::error_span!(
        "controller.watch.reconciliation_error",
        resource.name = scheme.metadata.name.as_deref().unwrap_or("unknown"),
        resource.namespace = scheme.metadata.namespace.as_deref().unwrap_or("default"),
        error = %error,
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error: {:?}", error);
    observability::metrics::increment_reconciliation_errors();

    let (delay, error_count) = ctx.requeue.backoffs.next(&scheme.key());
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::minutes(1));
    info!(
        error_count,
        next_retry = %next_trigger_time.to_rfc3339(),
        "Retrying in {}s (trigger source: error-backoff)",
        delay.as_secs()
    );

    observability::metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}

/// Watch stream error classes, each with its own restart behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 404: a CRD is missing or the object went away; the stream continues
    NotFound,
    /// 401: credentials or RBAC revoked
    Unauthorized,
    /// 410: resource version expired
    Expired,
    /// 429: API server storage is reinitializing
    TooManyRequests,
    Other,
}

impl WatchErrorKind {
    /// Classify a stringified controller/watcher error.
    ///
    /// 404 is checked before 401 because a plain-text 404 body surfaces as a
    /// deserialization error that also mentions `WatchFailed`.
    #[must_use]
    pub fn classify(error: &str) -> Self {
        let is_not_found = error.contains("ObjectNotFound")
            || error.contains("404")
            || error.contains("not found");
        if is_not_found {
            return Self::NotFound;
        }
        if error.contains("401") || error.contains("Unauthorized") {
            return Self::Unauthorized;
        }
        if error.contains("410")
            || error.contains("too old resource version")
            || error.contains("Expired")
            || error.contains("Gone")
        {
            return Self::Expired;
        }
        if error.contains("429")
            || error.contains("storage is (re)initializing")
            || error.contains("TooManyRequests")
        {
            return Self::TooManyRequests;
        }
        Self::Other
    }
}

/// Handle one watch stream error.
///
/// Returns `true` when the event should stay in the stream and `false`
/// when it is dropped so the stream can end and restart.
pub async fn handle_watch_stream_error(
    error: &str,
    backoff_ms: &AtomicU64,
    max_backoff_ms: u64,
    restart_delay: Duration,
) -> bool {
    let error_span = tracing::warn_span!("controller.watch.error", error = %error);
    react_to_watch_error(error, backoff_ms, max_backoff_ms, restart_delay)
        .instrument(error_span)
        .await
}

async fn react_to_watch_error(
    error: &str,
    backoff_ms: &AtomicU64,
    max_backoff_ms: u64,
    restart_delay: Duration,
) -> bool {
    match WatchErrorKind::classify(error) {
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404) during watch, the FailoverScheme CRD may be missing: {}",
                error
            );
            true
        }
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401 Unauthorized), RBAC may have been revoked or the token expired");
            error!("Check that the controller ServiceAccount can list and watch failoverschemes.fed.solo.io cluster-wide");
            warn!("Waiting {}s before retrying watch", restart_delay.as_secs());
            tokio::time::sleep(restart_delay).await;
            false
        }
        WatchErrorKind::Expired => {
            warn!(error_type = "410", "Watch resource version expired, watch will restart");
            false
        }
        WatchErrorKind::TooManyRequests => {
            let current = backoff_ms.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms before restart",
                current
            );
            tokio::time::sleep(Duration::from_millis(current)).await;
            backoff_ms.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
            false
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error);
            tokio::time::sleep(restart_delay).await;
            false
        }
    }
}
