//! Shared fixtures for the failover engine integration tests.
//!
//! Everything runs against the in-memory clients, so the tests exercise the
//! full processor/reconciler/dependent pipeline without a cluster.

#![allow(dead_code)]

use failover_controller::clients::memory::{
    InMemoryFailoverSchemeClient, InMemoryGlooInstanceClient, InMemoryUpstreamClient,
};
use failover_controller::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const REPORTER: &str = "gloo-system";
pub const FED_NAMESPACE: &str = "fed";

pub struct Harness {
    pub schemes: Arc<InMemoryFailoverSchemeClient>,
    pub instances: Arc<InMemoryGlooInstanceClient>,
    pub registry: Arc<ClusterRegistry>,
    pub clusters: BTreeMap<String, Arc<InMemoryUpstreamClient>>,
    pub status_manager: Arc<StatusManager>,
    pub processor: Arc<FailoverProcessor>,
    pub reconciler: FailoverSchemeReconciler,
}

impl Harness {
    /// Engine wired over in-memory clients, one upstream client per cluster
    pub fn new(clusters: &[&str]) -> Self {
        let schemes = Arc::new(InMemoryFailoverSchemeClient::new());
        let instances = Arc::new(InMemoryGlooInstanceClient::new());
        let registry = Arc::new(ClusterRegistry::new());
        let mut cluster_clients = BTreeMap::new();
        for name in clusters {
            let client = Arc::new(InMemoryUpstreamClient::new(*name));
            registry.register(*name, Arc::clone(&client) as Arc<dyn UpstreamClient>);
            cluster_clients.insert((*name).to_string(), client);
        }

        let scheme_client = Arc::clone(&schemes) as Arc<dyn FailoverSchemeClient>;
        let instance_client = Arc::clone(&instances) as Arc<dyn GlooInstanceClient>;
        let upstreams = Arc::clone(&registry) as Arc<dyn MulticlusterUpstreamClientset>;
        let status_manager = Arc::new(StatusManager::new(Arc::clone(&scheme_client), REPORTER));
        let processor = Arc::new(FailoverProcessor::new(
            Arc::clone(&upstreams),
            instance_client,
            scheme_client,
            Arc::clone(&status_manager),
        ));
        let reconciler = FailoverSchemeReconciler::new(
            Arc::clone(&processor),
            Arc::clone(&status_manager),
            upstreams,
        );

        Self {
            schemes,
            instances,
            registry,
            clusters: cluster_clients,
            status_manager,
            processor,
            reconciler,
        }
    }

    pub fn cluster(&self, name: &str) -> &InMemoryUpstreamClient {
        self.clusters
            .get(name)
            .unwrap_or_else(|| panic!("cluster {name} not in harness"))
    }

    pub fn dependents(&self) -> FailoverDependentReconciler {
        FailoverDependentReconciler::new(
            FailoverDependencyCalculator::new(
                Arc::clone(&self.schemes) as Arc<dyn FailoverSchemeClient>,
                Arc::clone(&self.instances) as Arc<dyn GlooInstanceClient>,
            ),
            Arc::clone(&self.status_manager),
        )
    }

    /// Stored copy of scheme `name` in the fed namespace
    pub fn scheme(&self, name: &str) -> FailoverScheme {
        self.schemes
            .snapshot(&format!("{FED_NAMESPACE}/{name}"))
            .unwrap_or_else(|| panic!("scheme {name} not stored"))
    }

    pub fn status(&self, name: &str) -> Option<NamespacedStatus> {
        self.status_manager.get_status(&self.scheme(name)).cloned()
    }

    /// Reconcile the latest stored copy of scheme `name`
    pub async fn reconcile(&self, name: &str) -> ReconcileOutcome {
        self.reconciler
            .reconcile(&self.scheme(name))
            .await
            .expect("reconcile should persist its status")
    }

    pub fn total_upserts(&self) -> usize {
        self.clusters.values().map(|c| c.upserts()).sum()
    }

    pub fn primary_failover(&self, cluster: &str, namespace: &str, name: &str) -> Option<Failover> {
        self.cluster(cluster)
            .snapshot(&ObjectRef::new(namespace, name))
            .and_then(|upstream| upstream.spec.failover)
    }
}

pub fn upstream(namespace: &str, name: &str) -> Upstream {
    let mut upstream = Upstream::new(name, UpstreamSpec::default());
    upstream.metadata.namespace = Some(namespace.to_string());
    upstream
}

pub fn failover_port() -> Port {
    Port {
        port: 15443,
        name: "failover".to_string(),
    }
}

pub fn http_port() -> Port {
    Port {
        port: 80,
        name: "http".to_string(),
    }
}

/// Instance in `gloo-system` with a single `gateway-proxy` at `address`
pub fn gloo_instance(
    name: &str,
    cluster: &str,
    watched: &[&str],
    address: &str,
    ports: Vec<Port>,
) -> GlooInstance {
    let mut instance = GlooInstance::new(
        name,
        GlooInstanceSpec {
            cluster: cluster.to_string(),
            control_plane: ControlPlane {
                namespace: "gloo-system".to_string(),
                watched_namespaces: watched.iter().map(ToString::to_string).collect(),
                ..Default::default()
            },
            region: "us-east-1".to_string(),
            proxies: vec![Proxy {
                name: "gateway-proxy".to_string(),
                namespace: "gloo-system".to_string(),
                zones: vec!["us-east-1a".to_string()],
                ingress_endpoints: vec![IngressEndpoint {
                    address: address.to_string(),
                    ports,
                    service_name: "gateway-proxy".to_string(),
                }],
            }],
            admin: None,
        },
    );
    instance.metadata.namespace = Some("gloo-system".to_string());
    instance
}

pub fn member(cluster: &str, upstreams: &[(&str, &str)]) -> GroupMember {
    GroupMember {
        cluster: cluster.to_string(),
        upstreams: upstreams
            .iter()
            .map(|(namespace, name)| ObjectRef::new(*namespace, *name))
            .collect(),
        locality_weight: None,
    }
}

/// Scheme in the fed namespace; each inner vec is one priority group
pub fn scheme(
    name: &str,
    primary: Option<ClusterObjectRef>,
    groups: Vec<Vec<GroupMember>>,
) -> FailoverScheme {
    let mut scheme = FailoverScheme::new(
        name,
        FailoverSchemeSpec {
            primary,
            failover_groups: groups
                .into_iter()
                .map(|priority_group| PriorityGroup { priority_group })
                .collect(),
        },
    );
    scheme.metadata.namespace = Some(FED_NAMESPACE.to_string());
    scheme
}

/// One cluster `c1` holding `ns/u1` (primary) and `ns/u2` (failover target),
/// owned by a single instance exposing the failover port on 1.2.3.4
pub fn single_cluster_setup(ports: Vec<Port>) -> Harness {
    let harness = Harness::new(&["c1"]);
    harness.cluster("c1").insert(upstream("ns", "u1"));
    harness.cluster("c1").insert(upstream("ns", "u2"));
    harness
        .instances
        .insert(gloo_instance("gloo", "c1", &["ns"], "1.2.3.4", ports));
    harness.schemes.insert(scheme(
        "scheme",
        Some(ClusterObjectRef::new("c1", "ns", "u1")),
        vec![vec![member("c1", &[("ns", "u2")])]],
    ));
    harness
}
