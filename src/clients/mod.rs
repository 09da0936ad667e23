//! # Resource Clients
//!
//! Seams between the failover engine and the clusters it talks to.
//!
//! ## Module Structure
//!
//! - `errors.rs` - `ClientError` shared by all clients
//! - `kubernetes.rs` - Implementations over `kube::Api`
//! - `memory.rs` - In-memory implementations with write counters and injectable failures
//! - `multicluster.rs` - `ClusterRegistry`, the per-cluster upstream client provider

mod errors;
pub mod kubernetes;
pub mod memory;
mod multicluster;

pub use errors::ClientError;
pub use multicluster::ClusterRegistry;

use crate::crd::{FailoverScheme, GlooInstance, ObjectRef, Upstream};
use async_trait::async_trait;
use std::sync::Arc;

/// Access to FailoverScheme resources across all namespaces
#[async_trait]
pub trait FailoverSchemeClient: Send + Sync {
    async fn list(&self) -> Result<Vec<FailoverScheme>, ClientError>;

    async fn get(&self, scheme: &ObjectRef) -> Result<FailoverScheme, ClientError>;

    /// Persist `reporter`'s status slot of `scheme`.
    ///
    /// Only that slot is written. The write is conditional on the scheme's
    /// `resourceVersion`; a stale object yields [`ClientError::Conflict`].
    async fn update_status(
        &self,
        scheme: &FailoverScheme,
        reporter: &str,
    ) -> Result<FailoverScheme, ClientError>;
}

/// Read access to the discovered GlooInstance catalog
#[async_trait]
pub trait GlooInstanceClient: Send + Sync {
    /// List instances, restricted to `cluster` when given
    async fn list(&self, cluster: Option<&str>) -> Result<Vec<GlooInstance>, ClientError>;

    async fn get(&self, instance: &ObjectRef) -> Result<GlooInstance, ClientError>;
}

/// Upstream access on a single cluster
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn get(&self, upstream: &ObjectRef) -> Result<Upstream, ClientError>;

    /// Write `spec.failover` of `upstream` onto the live object.
    ///
    /// Every other field of the live upstream is left as is; a `None` failover
    /// clears the field.
    async fn upsert(&self, upstream: &Upstream) -> Result<Upstream, ClientError>;
}

/// Provides an [`UpstreamClient`] for a named cluster
pub trait MulticlusterUpstreamClientset: Send + Sync {
    fn cluster(&self, name: &str) -> Result<Arc<dyn UpstreamClient>, ClientError>;
}
