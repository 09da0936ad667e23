//! # Failover
//!
//! The FailoverScheme engine.
//!
//! ## Module Structure
//!
//! - `status.rs` - StatusBuilder state machine and StatusManager
//! - `dependency.rs` - Reverse index from Upstreams/GlooInstances to schemes
//! - `processor.rs` - Validation and failover compilation
//! - `reconciler.rs` - Per-scheme reconcile and cleanup
//! - `dependent.rs` - Marks dependent schemes PENDING
//! - `errors.rs` - Error types

mod dependency;
mod dependent;
mod errors;
mod processor;
mod reconciler;
mod status;

pub use dependency::FailoverDependencyCalculator;
pub use dependent::{
    DependencyTrigger, FailoverDependentReconciler, MarkPendingObserver, MarkPendingReport,
};
pub use errors::{FailoverError, ReconcilerError};
pub use processor::{
    compute_endpoints, ensure_primary_unique, get_gloo_instances_for_upstream, FailoverProcessor,
    ProcessOutcome,
};
pub use reconciler::{FailoverSchemeReconciler, ReconcileOutcome};
pub use status::{StatusBuilder, StatusManager};
