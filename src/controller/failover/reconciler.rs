//! # FailoverScheme Reconciler
//!
//! Skip logic, processing, upstream writes and status persistence for one
//! FailoverScheme, plus cleanup when the scheme is deleted.

use super::errors::ReconcilerError;
use super::processor::{FailoverProcessor, ProcessOutcome};
use super::status::StatusManager;
use crate::clients::{ClientError, MulticlusterUpstreamClientset};
use crate::crd::{FailoverScheme, FailoverSchemeState, Upstream};
use crate::observability;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// What a reconcile did; drives the requeue decision in the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// ACCEPTED or INVALID at the current generation, nothing to do
    Skipped,
    Accepted,
    Invalid,
    /// FAILED was recorded; the scheme should be retried
    Failed,
}

impl ReconcileOutcome {
    fn from_state(state: FailoverSchemeState) -> Self {
        match state {
            FailoverSchemeState::Accepted => Self::Accepted,
            FailoverSchemeState::Invalid => Self::Invalid,
            _ => Self::Failed,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "SKIPPED",
            Self::Accepted => "ACCEPTED",
            Self::Invalid => "INVALID",
            Self::Failed => "FAILED",
        }
    }
}

pub struct FailoverSchemeReconciler {
    processor: Arc<FailoverProcessor>,
    status_manager: Arc<StatusManager>,
    upstreams: Arc<dyn MulticlusterUpstreamClientset>,
}

impl std::fmt::Debug for FailoverSchemeReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverSchemeReconciler").finish_non_exhaustive()
    }
}

impl FailoverSchemeReconciler {
    pub fn new(
        processor: Arc<FailoverProcessor>,
        status_manager: Arc<StatusManager>,
        upstreams: Arc<dyn MulticlusterUpstreamClientset>,
    ) -> Self {
        Self {
            processor,
            status_manager,
            upstreams,
        }
    }

    pub async fn reconcile(
        &self,
        scheme: &FailoverScheme,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let span = tracing::info_span!(
            "controller.failover.reconcile",
            resource.name = scheme.metadata.name.as_deref().unwrap_or("unknown"),
            resource.namespace = scheme.metadata.namespace.as_deref().unwrap_or("default"),
            resource.generation = scheme.generation(),
        );
        self.reconcile_inner(scheme).instrument(span).await
    }

    async fn reconcile_inner(
        &self,
        scheme: &FailoverScheme,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        if let Some(status) = self.status_manager.get_status(scheme) {
            if status.is_settled_at(scheme.generation()) {
                debug!(state = %status.state, "Scheme already processed at this generation");
                observability::metrics::increment_reconcile_outcome(
                    ReconcileOutcome::Skipped.as_str(),
                );
                return Ok(ReconcileOutcome::Skipped);
            }
            if status.is_dirty() {
                info!(message = status.message.as_str(), "Re-processing scheme marked PENDING");
            }
        }

        let status = match self.processor.process_update(scheme).await {
            ProcessOutcome::Status(status) => status,
            ProcessOutcome::Upsert { cluster, upstream } => {
                let status = self.status_manager.new_status_builder(scheme);
                match self.write_upstream(&cluster, &upstream, "set").await {
                    Ok(_) => status.accept(),
                    Err(err) => {
                        warn!(cluster = cluster.as_str(), error = %err, "Failed to write primary upstream");
                        status.fail(&err)
                    }
                }
            }
        };

        let outcome = ReconcileOutcome::from_state(status.state());
        if outcome == ReconcileOutcome::Accepted {
            info!("FailoverScheme accepted");
        } else {
            info!(state = %status.state(), message = status.record().message.as_str(), "FailoverScheme not accepted");
        }
        self.status_manager
            .update_status(status)
            .await
            .map_err(ReconcilerError::StatusUpdate)?;
        observability::metrics::increment_reconcile_outcome(outcome.as_str());
        Ok(outcome)
    }

    /// Remove the compiled failover from the primary upstream.
    ///
    /// Missing upstreams count as already clean, so repeated calls succeed.
    pub async fn finalize(&self, scheme: &FailoverScheme) -> Result<(), ReconcilerError> {
        let span = tracing::info_span!(
            "controller.failover.finalize",
            resource.name = scheme.metadata.name.as_deref().unwrap_or("unknown"),
            resource.namespace = scheme.metadata.namespace.as_deref().unwrap_or("default"),
        );
        async {
            let cleared = self
                .processor
                .process_delete(scheme)
                .await
                .map_err(ReconcilerError::Cleanup)?;
            let (Some(upstream), Some(primary)) = (cleared, scheme.spec.primary.as_ref()) else {
                return Ok::<_, ReconcilerError>(());
            };
            match self.write_upstream(&primary.cluster_name, &upstream, "clear").await {
                Ok(_) => {
                    info!(upstream = %primary, "Removed failover config from primary upstream");
                    Ok(())
                }
                Err(err) if err.is_not_found() => Ok(()),
                Err(err) => Err(ReconcilerError::Cleanup(err)),
            }
        }
        .instrument(span)
        .await
    }

    async fn write_upstream(
        &self,
        cluster: &str,
        upstream: &Upstream,
        operation: &str,
    ) -> Result<Upstream, ClientError> {
        let client = self.upstreams.cluster(cluster)?;
        let written = client.upsert(upstream).await?;
        observability::metrics::increment_upstream_writes(operation, cluster);
        Ok(written)
    }
}
