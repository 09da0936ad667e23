//! # Cluster Secret Watch
//!
//! Registers member clusters from `solo.io/kubeconfig` Secrets in the
//! controller namespace. The Secret name is the cluster name and its
//! `kubeconfig` key holds the credentials. A new or changed Secret
//! (re-)registers the cluster and restarts its Upstream watch; a deleted
//! Secret deregisters it.

use crate::clients::kubernetes::KubeUpstreamClient;
use crate::clients::ClusterRegistry;
use crate::constants::{KUBECONFIG_SECRET_KEY, KUBECONFIG_SECRET_TYPE};
use crate::controller::failover::FailoverDependentReconciler;
use crate::runtime::dependents::spawn_upstream_watch;
use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Client, ResourceExt};
use kube_runtime::watcher::{self, watcher};
use kube_runtime::WatchStreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ClusterSecretError {
    #[error("Secret {0} has no `kubeconfig` key")]
    MissingKubeconfig(String),
    #[error("Secret {0} holds a kubeconfig that is not UTF-8")]
    NotUtf8(String),
    #[error("Invalid kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),
    #[error("Failed to create client: {0}")]
    Client(#[from] kube::Error),
}

/// Parse the kubeconfig stored in a cluster Secret
pub fn kubeconfig_from_secret(secret: &Secret) -> Result<Kubeconfig, ClusterSecretError> {
    let name = secret.name_any();
    let raw = secret
        .data
        .as_ref()
        .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
        .ok_or_else(|| ClusterSecretError::MissingKubeconfig(name.clone()))?;
    let yaml = std::str::from_utf8(&raw.0).map_err(|_| ClusterSecretError::NotUtf8(name))?;
    Ok(Kubeconfig::from_yaml(yaml)?)
}

async fn connect(secret: &Secret) -> Result<Client, ClusterSecretError> {
    let kubeconfig = kubeconfig_from_secret(secret)?;
    let config =
        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
    Ok(Client::try_from(config)?)
}

/// Clusters registered from Secrets, with the resource version they came from
#[derive(Debug, Default)]
pub struct ClusterMembership {
    known: HashMap<String, Option<String>>,
    /// Names returned by the list in progress
    listed: Option<HashSet<String>>,
}

impl ClusterMembership {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_list(&mut self) {
        self.listed = Some(HashSet::new());
    }

    /// Record a Secret; `true` when the cluster is new or its Secret changed
    pub fn observe(&mut self, name: &str, resource_version: Option<String>) -> bool {
        if let Some(listed) = self.listed.as_mut() {
            listed.insert(name.to_string());
        }
        let unchanged = resource_version.is_some()
            && self.known.get(name).is_some_and(|seen| *seen == resource_version);
        self.known.insert(name.to_string(), resource_version);
        !unchanged
    }

    /// Clusters whose Secret was missing from the finished list
    pub fn finish_list(&mut self) -> Vec<String> {
        let Some(listed) = self.listed.take() else {
            return Vec::new();
        };
        let mut gone: Vec<String> = self
            .known
            .keys()
            .filter(|name| !listed.contains(*name))
            .cloned()
            .collect();
        gone.sort();
        for name in &gone {
            self.known.remove(name);
        }
        gone
    }

    /// Returns whether the cluster was known
    pub fn forget(&mut self, name: &str) -> bool {
        self.known.remove(name).is_some()
    }
}

/// Keeps the registry and the per-cluster Upstream watches in step with the Secrets
pub struct ClusterSecretWatch {
    registry: Arc<ClusterRegistry>,
    dependents: Arc<FailoverDependentReconciler>,
    membership: ClusterMembership,
    upstream_watches: HashMap<String, JoinHandle<()>>,
}

impl std::fmt::Debug for ClusterSecretWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSecretWatch")
            .field("membership", &self.membership)
            .field("watched", &self.upstream_watches.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ClusterSecretWatch {
    #[must_use]
    pub fn new(registry: Arc<ClusterRegistry>, dependents: Arc<FailoverDependentReconciler>) -> Self {
        Self {
            registry,
            dependents,
            membership: ClusterMembership::new(),
            upstream_watches: HashMap::new(),
        }
    }

    async fn apply(&mut self, secret: &Secret) {
        let name = secret.name_any();
        if !self
            .membership
            .observe(&name, secret.metadata.resource_version.clone())
        {
            return;
        }
        match connect(secret).await {
            Ok(client) => {
                self.registry.register(
                    name.clone(),
                    Arc::new(KubeUpstreamClient::new(client.clone(), name.clone())),
                );
                if let Some(previous) = self.upstream_watches.remove(&name) {
                    previous.abort();
                }
                let watch = spawn_upstream_watch(&name, client, Arc::clone(&self.dependents));
                self.upstream_watches.insert(name, watch);
            }
            Err(e) => {
                // a later update of the Secret retries
                error!(cluster = name.as_str(), error = %e, "Failed to register cluster from Secret");
            }
        }
    }

    fn remove(&mut self, name: &str) {
        self.membership.forget(name);
        if let Some(watch) = self.upstream_watches.remove(name) {
            watch.abort();
        }
        self.registry.deregister(name);
    }

    /// Follow the cluster Secrets in `namespace` until the stream ends
    pub async fn run(mut self, client: Client, namespace: String) {
        let secrets: Api<Secret> = Api::namespaced(client, &namespace);
        let config =
            watcher::Config::default().fields(&format!("type={KUBECONFIG_SECRET_TYPE}"));
        info!(
            namespace = namespace.as_str(),
            "Watching {} Secrets for member clusters", KUBECONFIG_SECRET_TYPE
        );

        let stream = watcher(secrets, config).default_backoff();
        pin_mut!(stream);
        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Init) => self.membership.begin_list(),
                Ok(watcher::Event::InitApply(secret) | watcher::Event::Apply(secret)) => {
                    self.apply(&secret).await;
                }
                Ok(watcher::Event::InitDone) => {
                    for name in self.membership.finish_list() {
                        info!(cluster = name.as_str(), "Cluster Secret removed while re-listing");
                        self.remove(&name);
                    }
                }
                Ok(watcher::Event::Delete(secret)) => self.remove(&secret.name_any()),
                Err(e) => warn!(error = %e, "Cluster Secret watch error"),
            }
        }

        warn!("Cluster Secret watch stream ended");
        for (_, watch) in self.upstream_watches.drain() {
            watch.abort();
        }
    }
}

/// Start the cluster Secret watch in the background
pub fn spawn_cluster_secret_watch(
    client: Client,
    namespace: &str,
    registry: Arc<ClusterRegistry>,
    dependents: Arc<FailoverDependentReconciler>,
) -> JoinHandle<()> {
    let watch = ClusterSecretWatch::new(registry, dependents);
    tokio::spawn(watch.run(client, namespace.to_string()))
}
