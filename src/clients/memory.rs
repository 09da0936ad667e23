//! # In-Memory Clients
//!
//! Clients backed by process memory. Writes are counted and failures can be
//! injected per object, which makes them suitable for tests and dry runs.
//!
//! Status writes honor `resourceVersion` the way the API server does: a write
//! carrying a stale version is rejected with a conflict.

use super::{ClientError, FailoverSchemeClient, GlooInstanceClient, UpstreamClient};
use crate::crd::{FailoverScheme, FailoverSchemeSpec, GlooInstance, ObjectRef, Upstream};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Failure returned instead of performing the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    NotFound,
    Conflict,
    Unavailable,
}

impl InjectedFailure {
    fn into_error(self, kind: &'static str, name: String) -> ClientError {
        match self {
            Self::NotFound => ClientError::NotFound { kind, name },
            Self::Conflict => ClientError::Conflict {
                kind,
                name,
                message: "injected conflict".to_string(),
            },
            Self::Unavailable => ClientError::Unavailable {
                kind,
                name,
                message: "injected failure".to_string(),
            },
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct InMemoryFailoverSchemeClient {
    schemes: Mutex<BTreeMap<String, FailoverScheme>>,
    status_failures: Mutex<HashMap<String, InjectedFailure>>,
    status_failures_once: Mutex<HashMap<String, InjectedFailure>>,
    list_failure: Mutex<Option<InjectedFailure>>,
    status_writes: AtomicUsize,
    resource_version: AtomicU64,
}

impl InMemoryFailoverSchemeClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_resource_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Create or replace a scheme; generation defaults to 1
    pub fn insert(&self, mut scheme: FailoverScheme) {
        scheme.metadata.generation.get_or_insert(1);
        scheme.metadata.resource_version = Some(self.next_resource_version());
        lock(&self.schemes).insert(scheme.key(), scheme);
    }

    pub fn remove(&self, key: &str) -> Option<FailoverScheme> {
        lock(&self.schemes).remove(key)
    }

    /// Replace the spec of `key` and bump its generation. Returns the new generation.
    pub fn update_spec(&self, key: &str, spec: FailoverSchemeSpec) -> Option<i64> {
        let resource_version = self.next_resource_version();
        let mut schemes = lock(&self.schemes);
        let scheme = schemes.get_mut(key)?;
        scheme.spec = spec;
        let generation = scheme.generation() + 1;
        scheme.metadata.generation = Some(generation);
        scheme.metadata.resource_version = Some(resource_version);
        Some(generation)
    }

    /// Current stored copy of `key` (`namespace/name`)
    pub fn snapshot(&self, key: &str) -> Option<FailoverScheme> {
        lock(&self.schemes).get(key).cloned()
    }

    /// Number of successful status writes
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn fail_status_updates(&self, key: &str, failure: InjectedFailure) {
        lock(&self.status_failures).insert(key.to_string(), failure);
    }

    /// Fail only the next status write of `key`
    pub fn fail_next_status_update(&self, key: &str, failure: InjectedFailure) {
        lock(&self.status_failures_once).insert(key.to_string(), failure);
    }

    pub fn fail_list(&self, failure: Option<InjectedFailure>) {
        *lock(&self.list_failure) = failure;
    }

    pub fn clear_failures(&self) {
        lock(&self.status_failures).clear();
        lock(&self.status_failures_once).clear();
        *lock(&self.list_failure) = None;
    }
}

#[async_trait]
impl FailoverSchemeClient for InMemoryFailoverSchemeClient {
    async fn list(&self) -> Result<Vec<FailoverScheme>, ClientError> {
        if let Some(failure) = *lock(&self.list_failure) {
            return Err(failure.into_error("FailoverScheme", "*".to_string()));
        }
        Ok(lock(&self.schemes).values().cloned().collect())
    }

    async fn get(&self, scheme: &ObjectRef) -> Result<FailoverScheme, ClientError> {
        let key = format!("{}/{}", scheme.namespace, scheme.name);
        lock(&self.schemes)
            .get(&key)
            .cloned()
            .ok_or(ClientError::NotFound {
                kind: "FailoverScheme",
                name: key,
            })
    }

    async fn update_status(
        &self,
        scheme: &FailoverScheme,
        reporter: &str,
    ) -> Result<FailoverScheme, ClientError> {
        let key = scheme.key();
        let failure = lock(&self.status_failures_once)
            .remove(&key)
            .or_else(|| lock(&self.status_failures).get(&key).copied());
        if let Some(failure) = failure {
            return Err(failure.into_error("FailoverScheme", key));
        }

        let resource_version = self.next_resource_version();
        let mut schemes = lock(&self.schemes);
        let Some(stored) = schemes.get_mut(&key) else {
            return Err(ClientError::NotFound {
                kind: "FailoverScheme",
                name: key,
            });
        };
        if scheme.metadata.resource_version.is_some()
            && scheme.metadata.resource_version != stored.metadata.resource_version
        {
            return Err(ClientError::Conflict {
                kind: "FailoverScheme",
                name: key,
                message: "the object has been modified; please apply your changes to the latest version".to_string(),
            });
        }

        let record = scheme
            .status
            .as_ref()
            .and_then(|status| status.namespaced_statuses.get(reporter))
            .cloned();
        let status = stored.status.get_or_insert_with(Default::default);
        match record {
            Some(record) => {
                status
                    .namespaced_statuses
                    .insert(reporter.to_string(), record);
            }
            None => {
                status.namespaced_statuses.remove(reporter);
            }
        }
        stored.metadata.resource_version = Some(resource_version);
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGlooInstanceClient {
    instances: Mutex<Vec<GlooInstance>>,
    list_failure: Mutex<Option<InjectedFailure>>,
    get_failure: Mutex<Option<InjectedFailure>>,
}

impl InMemoryGlooInstanceClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace an instance
    pub fn insert(&self, instance: GlooInstance) {
        let target = ObjectRef::from_resource(&instance);
        let mut instances = lock(&self.instances);
        instances.retain(|gi| ObjectRef::from_resource(gi) != target);
        instances.push(instance);
    }

    pub fn remove(&self, instance: &ObjectRef) -> bool {
        let mut instances = lock(&self.instances);
        let before = instances.len();
        instances.retain(|gi| &ObjectRef::from_resource(gi) != instance);
        instances.len() != before
    }

    pub fn fail_list(&self, failure: Option<InjectedFailure>) {
        *lock(&self.list_failure) = failure;
    }

    pub fn fail_get(&self, failure: Option<InjectedFailure>) {
        *lock(&self.get_failure) = failure;
    }
}

#[async_trait]
impl GlooInstanceClient for InMemoryGlooInstanceClient {
    async fn list(&self, cluster: Option<&str>) -> Result<Vec<GlooInstance>, ClientError> {
        if let Some(failure) = *lock(&self.list_failure) {
            return Err(failure.into_error("GlooInstance", "*".to_string()));
        }
        Ok(lock(&self.instances)
            .iter()
            .filter(|gi| cluster.is_none_or(|c| gi.spec.cluster == c))
            .cloned()
            .collect())
    }

    async fn get(&self, instance: &ObjectRef) -> Result<GlooInstance, ClientError> {
        if let Some(failure) = *lock(&self.get_failure) {
            return Err(failure.into_error("GlooInstance", instance.to_string()));
        }
        lock(&self.instances)
            .iter()
            .find(|gi| &ObjectRef::from_resource(*gi) == instance)
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                kind: "GlooInstance",
                name: instance.to_string(),
            })
    }
}

/// Upstreams of a single cluster
#[derive(Debug)]
pub struct InMemoryUpstreamClient {
    cluster: String,
    upstreams: Mutex<HashMap<ObjectRef, Upstream>>,
    get_failures: Mutex<HashMap<ObjectRef, InjectedFailure>>,
    upsert_failure: Mutex<Option<InjectedFailure>>,
    upserts: AtomicUsize,
}

impl InMemoryUpstreamClient {
    #[must_use]
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            upstreams: Mutex::default(),
            get_failures: Mutex::default(),
            upsert_failure: Mutex::default(),
            upserts: AtomicUsize::new(0),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Create or replace an upstream
    pub fn insert(&self, upstream: Upstream) {
        lock(&self.upstreams).insert(ObjectRef::from_resource(&upstream), upstream);
    }

    pub fn remove(&self, upstream: &ObjectRef) -> Option<Upstream> {
        lock(&self.upstreams).remove(upstream)
    }

    pub fn snapshot(&self, upstream: &ObjectRef) -> Option<Upstream> {
        lock(&self.upstreams).get(upstream).cloned()
    }

    /// Number of successful upserts
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn fail_get(&self, upstream: &ObjectRef, failure: InjectedFailure) {
        lock(&self.get_failures).insert(upstream.clone(), failure);
    }

    pub fn fail_upserts(&self, failure: Option<InjectedFailure>) {
        *lock(&self.upsert_failure) = failure;
    }

    fn describe(&self, upstream: &ObjectRef) -> String {
        format!("{upstream} on cluster {}", self.cluster)
    }
}

#[async_trait]
impl UpstreamClient for InMemoryUpstreamClient {
    async fn get(&self, upstream: &ObjectRef) -> Result<Upstream, ClientError> {
        if let Some(failure) = lock(&self.get_failures).get(upstream).copied() {
            return Err(failure.into_error("Upstream", self.describe(upstream)));
        }
        lock(&self.upstreams)
            .get(upstream)
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                kind: "Upstream",
                name: self.describe(upstream),
            })
    }

    async fn upsert(&self, upstream: &Upstream) -> Result<Upstream, ClientError> {
        let target = ObjectRef::from_resource(upstream);
        if let Some(failure) = *lock(&self.upsert_failure) {
            return Err(failure.into_error("Upstream", self.describe(&target)));
        }
        let mut upstreams = lock(&self.upstreams);
        let Some(live) = upstreams.get_mut(&target) else {
            return Err(ClientError::NotFound {
                kind: "Upstream",
                name: self.describe(&target),
            });
        };
        live.spec.failover = upstream.spec.failover.clone();
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(live.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        Failover, FailoverSchemeState, FailoverSchemeStatus, NamespacedStatus, UpstreamSpec,
    };

    fn scheme(namespace: &str, name: &str) -> FailoverScheme {
        let mut scheme = FailoverScheme::new(name, FailoverSchemeSpec::default());
        scheme.metadata.namespace = Some(namespace.to_string());
        scheme
    }

    fn with_record(mut scheme: FailoverScheme, reporter: &str, state: FailoverSchemeState) -> FailoverScheme {
        let status = scheme.status.get_or_insert_with(FailoverSchemeStatus::default);
        status.namespaced_statuses.insert(
            reporter.to_string(),
            NamespacedStatus {
                state,
                ..Default::default()
            },
        );
        scheme
    }

    #[tokio::test]
    async fn test_status_update_touches_only_reporter_slot() {
        let client = InMemoryFailoverSchemeClient::new();
        client.insert(with_record(
            scheme("ns", "a"),
            "other-reporter",
            FailoverSchemeState::Accepted,
        ));

        let stored = client.snapshot("ns/a").unwrap();
        let updated = client
            .update_status(
                &with_record(stored, "gloo-system", FailoverSchemeState::Pending),
                "gloo-system",
            )
            .await
            .unwrap();

        let statuses = &updated.status.unwrap().namespaced_statuses;
        assert_eq!(statuses["other-reporter"].state, FailoverSchemeState::Accepted);
        assert_eq!(statuses["gloo-system"].state, FailoverSchemeState::Pending);
        assert_eq!(client.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_stale_resource_version_conflicts() {
        let client = InMemoryFailoverSchemeClient::new();
        client.insert(scheme("ns", "a"));
        let stale = client.snapshot("ns/a").unwrap();

        client
            .update_status(&with_record(stale.clone(), "r", FailoverSchemeState::Pending), "r")
            .await
            .unwrap();
        let err = client
            .update_status(&with_record(stale, "r", FailoverSchemeState::Accepted), "r")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(client.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_update_spec_bumps_generation() {
        let client = InMemoryFailoverSchemeClient::new();
        client.insert(scheme("ns", "a"));
        assert_eq!(client.snapshot("ns/a").unwrap().generation(), 1);
        assert_eq!(
            client.update_spec("ns/a", FailoverSchemeSpec::default()),
            Some(2)
        );
        assert_eq!(client.update_spec("ns/missing", FailoverSchemeSpec::default()), None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_only_failover() {
        let client = InMemoryUpstreamClient::new("c1");
        let mut upstream = Upstream::new("u1", UpstreamSpec::default());
        upstream.metadata.namespace = Some("ns".to_string());
        upstream
            .spec
            .other
            .insert("kube".to_string(), serde_json::json!({"serviceName": "svc"}));
        client.insert(upstream);

        let mut desired = Upstream::new("u1", UpstreamSpec::default());
        desired.metadata.namespace = Some("ns".to_string());
        desired.spec.failover = Some(Failover::default());
        let live = client.upsert(&desired).await.unwrap();

        assert_eq!(live.spec.failover, Some(Failover::default()));
        assert_eq!(live.spec.other["kube"]["serviceName"], "svc");
        assert_eq!(client.upserts(), 1);
    }

    #[tokio::test]
    async fn test_upsert_missing_upstream_is_not_found() {
        let client = InMemoryUpstreamClient::new("c1");
        let mut desired = Upstream::new("u1", UpstreamSpec::default());
        desired.metadata.namespace = Some("ns".to_string());
        assert!(client.upsert(&desired).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_instance_list_filters_by_cluster() {
        use crate::crd::GlooInstanceSpec;

        let client = InMemoryGlooInstanceClient::new();
        for (name, cluster) in [("a", "c1"), ("b", "c2"), ("c", "c1")] {
            let mut gi = GlooInstance::new(
                name,
                GlooInstanceSpec {
                    cluster: cluster.to_string(),
                    ..Default::default()
                },
            );
            gi.metadata.namespace = Some("gloo-system".to_string());
            client.insert(gi);
        }

        assert_eq!(client.list(Some("c1")).await.unwrap().len(), 2);
        assert_eq!(client.list(None).await.unwrap().len(), 3);
        assert!(client
            .get(&ObjectRef::new("gloo-system", "b"))
            .await
            .is_ok());
        assert!(client.remove(&ObjectRef::new("gloo-system", "b")));
        assert!(client
            .get(&ObjectRef::new("gloo-system", "b"))
            .await
            .unwrap_err()
            .is_not_found());
    }
}
