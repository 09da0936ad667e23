//! # Failover Errors

use crate::clients::ClientError;
use crate::constants::FAILOVER_PORT_NUMBER;
use crate::crd::ObjectRef;
use thiserror::Error;

/// Why a FailoverScheme could not be compiled.
///
/// [`FailoverError::is_retryable`] splits these into FAILED (environmental,
/// retried on every reconcile) and INVALID (authoring errors, retried only
/// when the scheme or a dependency changes).
#[derive(Debug, Error)]
pub enum FailoverError {
    #[error("Primary target cannot be nil")]
    MissingPrimary,

    #[error("Failover groups must contain at least one entry")]
    EmptyFailoverGroups,

    #[error(
        "Upstream {upstream} on cluster {cluster} is already the primary target on FailoverScheme {scheme}"
    )]
    PrimaryInUse {
        upstream: ObjectRef,
        cluster: String,
        scheme: ObjectRef,
    },

    #[error(
        "Expected 1 Gloo Instance found {found} which can be associated with the upstream {upstream} on cluster {cluster}"
    )]
    OwningInstance {
        found: usize,
        upstream: ObjectRef,
        cluster: String,
    },

    #[error("No proxies found on Gloo Instance located on cluster: {cluster}, in namespace: {namespace}")]
    NoAdminProxy { cluster: String, namespace: String },

    #[error(
        "No available endpoints on Gloo Instance located on cluster: {cluster}, in namespace: {namespace} for proxy {proxy}"
    )]
    NoEndpoints {
        cluster: String,
        namespace: String,
        proxy: ObjectRef,
    },

    #[error(
        "No failover port ({}) found on Gloo Instance located on cluster: {cluster}, in namespace: {namespace} for proxy {proxy}",
        FAILOVER_PORT_NUMBER
    )]
    NoFailoverPort {
        cluster: String,
        namespace: String,
        proxy: ObjectRef,
    },

    /// Reading an object the scheme refers to
    #[error(transparent)]
    Lookup(ClientError),

    /// Cluster resolution and catalog listing
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl FailoverError {
    /// FAILED (true) versus INVALID (false)
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Lookup(err) => !err.is_not_found(),
            Self::Client(_) => true,
            _ => false,
        }
    }
}

/// Errors surfaced to the controller runtime, which retries them with backoff
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Failed to persist FailoverScheme status: {0}")]
    StatusUpdate(#[source] ClientError),

    #[error("Failed to remove failover config: {0}")]
    Cleanup(#[source] ClientError),

    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube_runtime::finalizer::Error<ReconcilerError>>),
}
