//! # Kubernetes Clients
//!
//! Client implementations backed by `kube::Api`.

use super::{ClientError, FailoverSchemeClient, GlooInstanceClient, UpstreamClient};
use crate::constants::FIELD_MANAGER;
use crate::crd::{FailoverScheme, GlooInstance, ObjectRef, Upstream};
use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use tracing::debug;

#[derive(Clone)]
pub struct KubeFailoverSchemeClient {
    client: Client,
}

impl std::fmt::Debug for KubeFailoverSchemeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeFailoverSchemeClient").finish_non_exhaustive()
    }
}

impl KubeFailoverSchemeClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FailoverSchemeClient for KubeFailoverSchemeClient {
    async fn list(&self) -> Result<Vec<FailoverScheme>, ClientError> {
        let api: Api<FailoverScheme> = Api::all(self.client.clone());
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| ClientError::from_kube(e, "FailoverScheme", "*"))
    }

    async fn get(&self, scheme: &ObjectRef) -> Result<FailoverScheme, ClientError> {
        let api: Api<FailoverScheme> = Api::namespaced(self.client.clone(), &scheme.namespace);
        api.get(&scheme.name)
            .await
            .map_err(|e| ClientError::from_kube(e, "FailoverScheme", scheme.to_string()))
    }

    async fn update_status(
        &self,
        scheme: &FailoverScheme,
        reporter: &str,
    ) -> Result<FailoverScheme, ClientError> {
        let target = ObjectRef::from_resource(scheme);
        let record = scheme
            .status
            .as_ref()
            .and_then(|status| status.namespaced_statuses.get(reporter));

        // A merge patch on the map only replaces this reporter's key
        let mut slot = serde_json::Map::new();
        slot.insert(reporter.to_string(), serde_json::to_value(record)?);
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": scheme.metadata.resource_version,
            },
            "status": {
                "namespacedStatuses": slot,
            },
        });

        debug!(
            resource.name = target.name.as_str(),
            resource.namespace = target.namespace.as_str(),
            reporter,
            "Patching FailoverScheme status"
        );

        let api: Api<FailoverScheme> = Api::namespaced(self.client.clone(), &target.namespace);
        api.patch_status(
            &target.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| ClientError::from_kube(e, "FailoverScheme", target.to_string()))
    }
}

#[derive(Clone)]
pub struct KubeGlooInstanceClient {
    client: Client,
}

impl std::fmt::Debug for KubeGlooInstanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeGlooInstanceClient").finish_non_exhaustive()
    }
}

impl KubeGlooInstanceClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GlooInstanceClient for KubeGlooInstanceClient {
    async fn list(&self, cluster: Option<&str>) -> Result<Vec<GlooInstance>, ClientError> {
        let api: Api<GlooInstance> = Api::all(self.client.clone());
        let instances = api
            .list(&ListParams::default())
            .await
            .map_err(|e| ClientError::from_kube(e, "GlooInstance", "*"))?;
        // spec.cluster is not a selectable field, filter after listing
        Ok(instances
            .items
            .into_iter()
            .filter(|gi| cluster.is_none_or(|c| gi.spec.cluster == c))
            .collect())
    }

    async fn get(&self, instance: &ObjectRef) -> Result<GlooInstance, ClientError> {
        let api: Api<GlooInstance> = Api::namespaced(self.client.clone(), &instance.namespace);
        api.get(&instance.name)
            .await
            .map_err(|e| ClientError::from_kube(e, "GlooInstance", instance.to_string()))
    }
}

/// Upstream client bound to one cluster's API server
#[derive(Clone)]
pub struct KubeUpstreamClient {
    client: Client,
    cluster: String,
}

impl std::fmt::Debug for KubeUpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeUpstreamClient")
            .field("cluster", &self.cluster)
            .finish_non_exhaustive()
    }
}

impl KubeUpstreamClient {
    #[must_use]
    pub fn new(client: Client, cluster: impl Into<String>) -> Self {
        Self {
            client,
            cluster: cluster.into(),
        }
    }

    fn describe(&self, upstream: &ObjectRef) -> String {
        format!("{upstream} on cluster {}", self.cluster)
    }
}

#[async_trait]
impl UpstreamClient for KubeUpstreamClient {
    async fn get(&self, upstream: &ObjectRef) -> Result<Upstream, ClientError> {
        let api: Api<Upstream> = Api::namespaced(self.client.clone(), &upstream.namespace);
        api.get(&upstream.name)
            .await
            .map_err(|e| ClientError::from_kube(e, "Upstream", self.describe(upstream)))
    }

    async fn upsert(&self, upstream: &Upstream) -> Result<Upstream, ClientError> {
        let target = ObjectRef::from_resource(upstream);
        // null clears the field; other writers keep the rest of the spec
        let patch = serde_json::json!({
            "spec": {
                "failover": serde_json::to_value(&upstream.spec.failover)?,
            },
        });

        debug!(
            resource.name = target.name.as_str(),
            resource.namespace = target.namespace.as_str(),
            cluster = self.cluster.as_str(),
            clear = upstream.spec.failover.is_none(),
            "Patching Upstream failover"
        );

        let api: Api<Upstream> = Api::namespaced(self.client.clone(), &target.namespace);
        api.patch(
            &target.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| ClientError::from_kube(e, "Upstream", self.describe(&target)))
    }
}
