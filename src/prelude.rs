//! # Prelude
//!
//! Commonly used types in one import:
//!
//! ```rust
//! use failover_controller::prelude::*;
//! ```

pub use crate::crd::*;

pub use crate::clients::{
    ClientError, ClusterRegistry, FailoverSchemeClient, GlooInstanceClient,
    MulticlusterUpstreamClientset, UpstreamClient,
};

pub use crate::controller::failover::{
    DependencyTrigger, FailoverDependencyCalculator, FailoverDependentReconciler, FailoverError,
    FailoverProcessor, FailoverSchemeReconciler, MarkPendingObserver, MarkPendingReport,
    ProcessOutcome, ReconcileOutcome, ReconcilerError, StatusBuilder, StatusManager,
};

pub use crate::config::{
    ControllerConfig, ServerConfig, SharedControllerConfig, SharedServerConfig,
};
