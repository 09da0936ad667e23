//! # Dependent Reconciler
//!
//! Marks FailoverSchemes PENDING when an Upstream or GlooInstance they depend
//! on changes. Marking is best effort: a failed status write for one scheme
//! is logged, counted and handed to the observer, and the remaining schemes
//! are still marked. A conflicting write is retried once against a freshly
//! read copy before it counts as failed.

use super::dependency::FailoverDependencyCalculator;
use super::status::StatusManager;
use crate::clients::ClientError;
use crate::constants::DEPENDENCY_UPDATED_MESSAGE;
use crate::crd::{ClusterObjectRef, FailoverScheme, ObjectRef};
use crate::observability;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

/// A changed resource FailoverSchemes may depend on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyTrigger {
    Upstream(ClusterObjectRef),
    GlooInstance(ObjectRef),
}

impl DependencyTrigger {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "Upstream",
            Self::GlooInstance(_) => "GlooInstance",
        }
    }
}

impl fmt::Display for DependencyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream(upstream) => write!(f, "Upstream {upstream}"),
            Self::GlooInstance(instance) => write!(f, "GlooInstance {instance}"),
        }
    }
}

/// Notified for every dependent scheme that could not be marked PENDING
pub trait MarkPendingObserver: Send + Sync {
    fn mark_failed(&self, trigger: &DependencyTrigger, scheme: &ObjectRef, error: &ClientError);
}

/// Outcome of one dependency trigger
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MarkPendingReport {
    /// `namespace/name` of schemes marked PENDING
    pub marked: Vec<String>,
    /// `namespace/name` and error of schemes that could not be marked
    pub failed: Vec<(String, String)>,
}

pub struct FailoverDependentReconciler {
    calculator: FailoverDependencyCalculator,
    status_manager: Arc<StatusManager>,
    observer: Option<Arc<dyn MarkPendingObserver>>,
}

impl std::fmt::Debug for FailoverDependentReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverDependentReconciler")
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl FailoverDependentReconciler {
    pub fn new(calculator: FailoverDependencyCalculator, status_manager: Arc<StatusManager>) -> Self {
        Self {
            calculator,
            status_manager,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn MarkPendingObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Mark every scheme depending on `trigger` PENDING.
    ///
    /// Only a failure to compute the dependents is returned; per-scheme
    /// write failures (conflicts included) end up in the report.
    pub async fn reconcile(
        &self,
        trigger: &DependencyTrigger,
    ) -> Result<MarkPendingReport, ClientError> {
        let span = tracing::info_span!(
            "controller.dependents.mark_pending",
            trigger.kind = trigger.kind(),
            trigger.resource = %trigger,
        );
        async {
            let dependents = match trigger {
                DependencyTrigger::Upstream(upstream) => {
                    self.calculator.for_upstream(upstream).await?
                }
                DependencyTrigger::GlooInstance(instance) => {
                    self.calculator.for_gloo_instance(instance).await?
                }
            };
            debug!(count = dependents.len(), "Marking dependent FailoverSchemes PENDING");
            Ok::<_, ClientError>(self.mark_pending(trigger, dependents).await)
        }
        .instrument(span)
        .await
    }

    async fn mark_pending(
        &self,
        trigger: &DependencyTrigger,
        dependents: Vec<FailoverScheme>,
    ) -> MarkPendingReport {
        let mut report = MarkPendingReport::default();
        for scheme in dependents {
            let key = scheme.key();
            match self.write_pending(&scheme).await {
                Ok(_) => report.marked.push(key),
                Err(err) => {
                    warn!(
                        resource.key = key.as_str(),
                        conflict = err.is_conflict(),
                        error = %err,
                        "Failed to mark FailoverScheme PENDING, continuing with remaining dependents"
                    );
                    observability::metrics::increment_dependent_mark_errors(trigger.kind());
                    if let Some(observer) = &self.observer {
                        observer.mark_failed(trigger, &ObjectRef::from_resource(&scheme), &err);
                    }
                    report.failed.push((key, err.to_string()));
                }
            }
        }
        observability::metrics::increment_dependents_marked_pending(
            trigger.kind(),
            report.marked.len(),
        );
        report
    }

    /// Write PENDING; a conflict re-reads the scheme and tries once more
    async fn write_pending(&self, scheme: &FailoverScheme) -> Result<FailoverScheme, ClientError> {
        let status = self
            .status_manager
            .new_status_builder(scheme)
            .pending(DEPENDENCY_UPDATED_MESSAGE);
        match self.status_manager.update_status(status).await {
            Err(err) if err.is_conflict() => {
                debug!(resource.key = scheme.key().as_str(), "Status conflict, retrying on the latest copy");
                let latest = self.status_manager.refresh(scheme).await?;
                let status = self
                    .status_manager
                    .new_status_builder(&latest)
                    .pending(DEPENDENCY_UPDATED_MESSAGE);
                self.status_manager.update_status(status).await
            }
            result => result,
        }
    }
}
