//! # Resource References
//!
//! Plain and cluster-scoped object references used throughout the CRDs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a namespaced object; the cluster is implied by context
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Reference to an existing Kubernetes object
    pub fn from_resource<K: kube::Resource>(obj: &K) -> Self {
        use kube::ResourceExt;
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }

    /// Scope this reference to a cluster
    #[must_use]
    pub fn on_cluster(&self, cluster_name: impl Into<String>) -> ClusterObjectRef {
        ClusterObjectRef {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            cluster_name: cluster_name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.namespace)
    }
}

/// Reference to a namespaced object on a named cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterObjectRef {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub cluster_name: String,
}

impl ClusterObjectRef {
    pub fn new(
        cluster_name: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            cluster_name: cluster_name.into(),
        }
    }

    /// Drop the cluster scope
    #[must_use]
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.namespace.clone(), self.name.clone())
    }
}

impl fmt::Display for ClusterObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} on cluster {}",
            self.name, self.namespace, self.cluster_name
        )
    }
}

/// Name of the envoy cluster gloo translates an upstream into.
///
/// The failover SNI is set to this value so the remote gateway can route the
/// request with `forward_sni_cluster_name`. Dots are avoided because they break
/// prometheus stats names.
#[must_use]
pub fn upstream_to_cluster_name(upstream: &ObjectRef) -> String {
    if upstream.namespace.is_empty() {
        return upstream.name.clone();
    }
    format!("{}_{}", upstream.name, upstream.namespace)
}
