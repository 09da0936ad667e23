//! # Cluster Registry
//!
//! Maps cluster names to upstream clients. Clusters are registered at startup
//! and may be added or removed later as cluster membership changes.

use super::{ClientError, MulticlusterUpstreamClientset, UpstreamClient};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

#[derive(Default)]
pub struct ClusterRegistry {
    clusters: RwLock<BTreeMap<String, Arc<dyn UpstreamClient>>>,
}

impl std::fmt::Debug for ClusterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRegistry")
            .field("clusters", &self.cluster_names())
            .finish()
    }
}

impl ClusterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the client for `name`
    pub fn register(&self, name: impl Into<String>, client: Arc<dyn UpstreamClient>) {
        let name = name.into();
        info!(cluster = name.as_str(), "Registered cluster");
        self.clusters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, client);
    }

    /// Returns whether the cluster was registered
    pub fn deregister(&self, name: &str) -> bool {
        let removed = self
            .clusters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            info!(cluster = name, "Deregistered cluster");
        }
        removed
    }

    pub fn cluster_names(&self) -> Vec<String> {
        self.clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl MulticlusterUpstreamClientset for ClusterRegistry {
    fn cluster(&self, name: &str) -> Result<Arc<dyn UpstreamClient>, ClientError> {
        self.clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| ClientError::ClusterNotRegistered(name.to_string()))
    }
}
