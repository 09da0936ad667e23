//! # Watch Loop
//!
//! Runs the FailoverScheme controller: every scheme is reconciled behind the
//! cleanup finalizer, FAILED schemes are requeued with Fibonacci backoff and
//! the controller stream is restarted whenever it ends.

use crate::config::SharedControllerConfig;
use crate::constants::FAILOVER_SCHEME_FINALIZER;
use crate::controller::backoff::RequeueBackoffs;
use crate::controller::failover::{
    FailoverSchemeReconciler, ReconcileOutcome, ReconcilerError, StatusManager,
};
use crate::controller::server::ServerState;
use crate::crd::{FailoverScheme, FailoverSchemeState};
use crate::observability;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube::Client;
use kube_runtime::controller::Action;
use kube_runtime::finalizer::{finalizer, Event as Finalizer};
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Requeue decisions for reconciled FailoverSchemes
#[derive(Debug)]
pub struct RequeuePolicy {
    pub status_manager: Arc<StatusManager>,
    pub backoffs: RequeueBackoffs,
}

impl RequeuePolicy {
    #[must_use]
    pub fn new(status_manager: Arc<StatusManager>, backoffs: RequeueBackoffs) -> Self {
        Self {
            status_manager,
            backoffs,
        }
    }

    /// Map a reconcile outcome to the controller action.
    ///
    /// FAILED is requeued with backoff; everything else waits for the next
    /// change and clears the scheme's backoff.
    pub fn action_for(&self, key: &str, outcome: ReconcileOutcome) -> Action {
        match outcome {
            ReconcileOutcome::Failed => {
                let (delay, error_count) = self.backoffs.next(key);
                info!(
                    resource.key = key,
                    error_count,
                    "FailoverScheme FAILED, retrying in {}s",
                    delay.as_secs()
                );
                observability::metrics::increment_requeues("failed-state");
                Action::requeue(delay)
            }
            ReconcileOutcome::Skipped | ReconcileOutcome::Accepted | ReconcileOutcome::Invalid => {
                self.backoffs.reset(key);
                Action::await_change()
            }
        }
    }

    /// Delay left before a FAILED scheme at its current generation may be
    /// processed again. Watch events caused by our own FAILED status write
    /// land here instead of reprocessing immediately.
    pub fn failed_retry_pending(&self, scheme: &FailoverScheme) -> Option<Duration> {
        self.failed_retry_pending_at(scheme, Instant::now())
    }

    fn failed_retry_pending_at(&self, scheme: &FailoverScheme, now: Instant) -> Option<Duration> {
        let status = self.status_manager.get_status(scheme)?;
        if status.state != FailoverSchemeState::Failed
            || status.observed_generation != scheme.generation()
        {
            return None;
        }
        self.backoffs.remaining_at(&scheme.key(), now)
    }
}

/// State shared by every reconcile the controller runs
pub struct ControllerContext {
    pub client: Client,
    pub reconciler: Arc<FailoverSchemeReconciler>,
    pub requeue: RequeuePolicy,
}

impl std::fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("requeue", &self.requeue)
            .finish_non_exhaustive()
    }
}

async fn reconcile(
    scheme: Arc<FailoverScheme>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    observability::metrics::increment_reconciliations();

    let key = scheme.key();
    let namespace = scheme.metadata.namespace.as_deref().unwrap_or("default");
    let schemes: Api<FailoverScheme> = Api::namespaced(ctx.client.clone(), namespace);

    let result = finalizer(
        &schemes,
        FAILOVER_SCHEME_FINALIZER,
        Arc::clone(&scheme),
        |event| async {
            match event {
                Finalizer::Apply(scheme) => {
                    if let Some(left) = ctx.requeue.failed_retry_pending(&scheme) {
                        debug!(resource.key = key.as_str(), "FAILED retry not due yet");
                        return Ok::<_, ReconcilerError>(Action::requeue(left));
                    }
                    let outcome = ctx.reconciler.reconcile(&scheme).await?;
                    Ok(ctx.requeue.action_for(&key, outcome))
                }
                Finalizer::Cleanup(scheme) => {
                    ctx.reconciler.finalize(&scheme).await?;
                    ctx.requeue.backoffs.reset(&key);
                    Ok(Action::await_change())
                }
            }
        },
    )
    .await
    .map_err(|e| ReconcilerError::Finalizer(Box::new(e)));

    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    result
}

/// Run the controller until a shutdown signal is received
pub async fn run_watch_loop(
    schemes: Api<FailoverScheme>,
    ctx: Arc<ControllerContext>,
    server_state: Arc<ServerState>,
    controller_config: SharedControllerConfig,
) -> Result<(), anyhow::Error> {
    let backoff_start_ms = controller_config.read().await.backoff_start_ms;
    let backoff_duration_ms = Arc::new(AtomicU64::new(backoff_start_ms));

    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal, initiating graceful shutdown...");
        shutdown_state.set_ready(false);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff = Arc::clone(&backoff_duration_ms);
        let config = Arc::clone(&controller_config);
        info!("Starting FailoverScheme controller...");
        Controller::new(schemes.clone(), watcher::Config::default().any_semantic())
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&ctx))
            .filter_map(move |result| {
                let backoff = Arc::clone(&backoff);
                let config = Arc::clone(&config);
                async move {
                    match &result {
                        Ok((object, _)) => {
                            debug!(resource.name = object.name.as_str(), "watch.event.reconciled");
                            let start = config.read().await.backoff_start_ms;
                            backoff.store(start, Ordering::Relaxed);
                            Some(result)
                        }
                        Err(e) => {
                            let (max_backoff, restart_delay) = {
                                let config = config.read().await;
                                (config.backoff_max_ms, config.watch_restart_delay_duration())
                            };
                            let keep = handle_watch_stream_error(
                                &format!("{e:?}"),
                                &backoff,
                                max_backoff,
                                restart_delay,
                            )
                            .await;
                            keep.then_some(result)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .await;

        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = controller_config
            .read()
            .await
            .watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::InMemoryFailoverSchemeClient;
    use crate::clients::FailoverSchemeClient;
    use crate::controller::failover::StatusBuilder;
    use crate::crd::FailoverSchemeSpec;

    const REPORTER: &str = "gloo-system";

    fn policy() -> RequeuePolicy {
        let schemes = Arc::new(InMemoryFailoverSchemeClient::new()) as Arc<dyn FailoverSchemeClient>;
        RequeuePolicy::new(
            Arc::new(StatusManager::new(schemes, REPORTER)),
            RequeueBackoffs::new(1, 10),
        )
    }

    fn scheme(generation: i64, status: impl FnOnce(StatusBuilder) -> StatusBuilder) -> FailoverScheme {
        let mut scheme = FailoverScheme::new("scheme", FailoverSchemeSpec::default());
        scheme.metadata.namespace = Some("fed".to_string());
        scheme.metadata.generation = Some(generation);
        status(StatusBuilder::new(&scheme, REPORTER)).build()
    }

    #[test]
    fn test_failed_outcome_requeues_with_growing_backoff() {
        let policy = policy();
        assert_eq!(
            policy.action_for("fed/scheme", ReconcileOutcome::Failed),
            Action::requeue(Duration::from_secs(60))
        );
        policy.action_for("fed/scheme", ReconcileOutcome::Failed);
        assert_eq!(
            policy.action_for("fed/scheme", ReconcileOutcome::Failed),
            Action::requeue(Duration::from_secs(120))
        );
        assert_eq!(policy.backoffs.error_count("fed/scheme"), 3);
    }

    #[test]
    fn test_settled_outcomes_await_change_and_reset_backoff() {
        let policy = policy();
        for outcome in [
            ReconcileOutcome::Accepted,
            ReconcileOutcome::Invalid,
            ReconcileOutcome::Skipped,
        ] {
            policy.action_for("fed/scheme", ReconcileOutcome::Failed);
            assert_eq!(policy.action_for("fed/scheme", outcome), Action::await_change());
            assert_eq!(policy.backoffs.error_count("fed/scheme"), 0);
        }
    }

    #[test]
    fn test_failed_scheme_waits_for_its_retry() {
        let policy = policy();
        let failed = scheme(1, |status| status.fail("cluster c9 is not registered"));
        policy.action_for("fed/scheme", ReconcileOutcome::Failed);

        let left = policy.failed_retry_pending(&failed).unwrap();
        assert!(left <= Duration::from_secs(60));

        // once the deadline passed the scheme is processed again
        let later = Instant::now() + Duration::from_secs(61);
        assert!(policy.failed_retry_pending_at(&failed, later).is_none());
    }

    #[test]
    fn test_pending_and_new_generation_bypass_retry_wait() {
        let policy = policy();
        policy.action_for("fed/scheme", ReconcileOutcome::Failed);

        let pending = scheme(1, |status| status.pending("dependency changed"));
        assert!(policy.failed_retry_pending(&pending).is_none());

        let mut edited = scheme(1, |status| status.fail("cluster c9 is not registered"));
        edited.metadata.generation = Some(2);
        assert!(policy.failed_retry_pending(&edited).is_none());
    }

    #[test]
    fn test_failed_scheme_without_scheduled_retry_is_processed() {
        let policy = policy();
        let failed = scheme(1, |status| status.fail("cluster c9 is not registered"));
        assert!(policy.failed_retry_pending(&failed).is_none());
    }
}
