//! # GlooInstance
//!
//! Discovered gloo control planes and their proxies. Produced by discovery,
//! read-only here: the failover compiler joins upstreams against it to find
//! localities and ingress endpoints.

use crate::constants::{DEFAULT_GATEWAY_PROXY_NAME, GLOO_SYSTEM_NAMESPACE};
use crate::crd::{ClusterObjectRef, ObjectRef};
use serde::{Deserialize, Serialize};

#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "GlooInstance",
    group = "fed.solo.io",
    version = "v1",
    namespaced,
    printcolumn = r#"{"name":"Cluster", "type":"string", "jsonPath":".spec.cluster"}, {"name":"Namespace", "type":"string", "jsonPath":".spec.controlPlane.namespace"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GlooInstanceSpec {
    pub cluster: String,
    #[serde(default)]
    pub control_plane: ControlPlane,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub proxies: Vec<Proxy>,
    #[serde(default)]
    pub admin: Option<Admin>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlane {
    #[serde(default)]
    pub version: String,
    /// Install namespace of the control plane
    #[serde(default)]
    pub namespace: String,
    /// Empty means every namespace in the cluster is watched
    #[serde(default)]
    pub watched_namespaces: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Proxy {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub ingress_endpoints: Vec<IngressEndpoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressEndpoint {
    pub address: String,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub service_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub port: u32,
    #[serde(default)]
    pub name: String,
}

/// Admin info chosen by discovery
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    #[serde(default)]
    pub proxy_id: Option<ObjectRef>,
    #[serde(default)]
    pub write_namespace: String,
}

impl GlooInstance {
    /// Whether this instance is responsible for the given upstream:
    /// same cluster, and the upstream namespace is watched (an empty watch list
    /// watches everything).
    pub fn owns_upstream(&self, upstream: &ClusterObjectRef) -> bool {
        self.owns_namespace(&upstream.cluster_name, &upstream.namespace)
    }

    pub fn owns_namespace(&self, cluster: &str, namespace: &str) -> bool {
        if self.spec.cluster != cluster {
            return false;
        }
        let watched = &self.spec.control_plane.watched_namespaces;
        watched.is_empty() || watched.iter().any(|ns| ns == namespace)
    }

    /// The proxy used for failover endpoint resolution.
    ///
    /// Uses the proxy discovery recorded in `admin.proxyId`; when that is
    /// missing or no longer present, the selection heuristic is re-applied.
    pub fn admin_proxy(&self) -> Option<&Proxy> {
        let recorded = self
            .spec
            .admin
            .as_ref()
            .and_then(|admin| admin.proxy_id.as_ref())
            .and_then(|id| {
                self.spec
                    .proxies
                    .iter()
                    .find(|p| p.name == id.name && p.namespace == id.namespace)
            });
        recorded.or_else(|| {
            select_admin_proxy(&self.spec.control_plane.namespace, &self.spec.proxies)
        })
    }

    /// Namespace gloo writes its resources (and failover secrets) into
    pub fn write_namespace(&self) -> String {
        match self.spec.admin.as_ref() {
            Some(admin) if !admin.write_namespace.is_empty() => admin.write_namespace.clone(),
            _ => write_namespace_for_instance(
                &self.spec.control_plane.namespace,
                &self.spec.control_plane.watched_namespaces,
            ),
        }
    }
}

/// Admin proxy heuristic, in order of preference:
///
/// 1. proxy named `gateway-proxy` in the install namespace
/// 2. first proxy in the install namespace
/// 3. first proxy in the list
pub fn select_admin_proxy<'a>(install_namespace: &str, proxies: &'a [Proxy]) -> Option<&'a Proxy> {
    let mut in_namespace = None;
    for proxy in proxies.iter().filter(|p| p.namespace == install_namespace) {
        if proxy.name == DEFAULT_GATEWAY_PROXY_NAME {
            return Some(proxy);
        }
        in_namespace.get_or_insert(proxy);
    }
    in_namespace.or_else(|| proxies.first())
}

/// Write namespace heuristic.
///
/// With an explicit watch list: the install namespace if watched, then
/// `gloo-system` if watched, then the first watched namespace. Otherwise the
/// install namespace.
pub fn write_namespace_for_instance(install_namespace: &str, watched_namespaces: &[String]) -> String {
    if watched_namespaces.is_empty() {
        return install_namespace.to_string();
    }
    if watched_namespaces.iter().any(|ns| ns == install_namespace) {
        return install_namespace.to_string();
    }
    if watched_namespaces.iter().any(|ns| ns == GLOO_SYSTEM_NAMESPACE) {
        return GLOO_SYSTEM_NAMESPACE.to_string();
    }
    watched_namespaces[0].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(name: &str, namespace: &str) -> Proxy {
        Proxy {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    fn instance(cluster: &str, watched: &[&str]) -> GlooInstance {
        GlooInstance::new(
            "gloo",
            GlooInstanceSpec {
                cluster: cluster.to_string(),
                control_plane: ControlPlane {
                    namespace: "gloo-system".to_string(),
                    watched_namespaces: watched.iter().map(ToString::to_string).collect(),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_select_admin_proxy_prefers_gateway_proxy_in_install_namespace() {
        let proxies = vec![
            proxy("gateway-proxy", "other"),
            proxy("public", "gloo-system"),
            proxy("gateway-proxy", "gloo-system"),
        ];
        let selected = select_admin_proxy("gloo-system", &proxies).unwrap();
        assert_eq!(selected, &proxies[2]);
    }

    #[test]
    fn test_select_admin_proxy_falls_back_to_first_in_namespace() {
        let proxies = vec![
            proxy("edge", "other"),
            proxy("public", "gloo-system"),
            proxy("internal", "gloo-system"),
        ];
        let selected = select_admin_proxy("gloo-system", &proxies).unwrap();
        assert_eq!(selected.name, "public");
    }

    #[test]
    fn test_select_admin_proxy_falls_back_to_first_proxy() {
        let proxies = vec![proxy("edge", "other"), proxy("public", "another")];
        let selected = select_admin_proxy("gloo-system", &proxies).unwrap();
        assert_eq!(selected.name, "edge");
        assert!(select_admin_proxy("gloo-system", &[]).is_none());
    }

    #[test]
    fn test_admin_proxy_uses_recorded_id() {
        let mut gi = instance("c1", &[]);
        gi.spec.proxies = vec![proxy("gateway-proxy", "gloo-system"), proxy("edge", "gloo-system")];
        gi.spec.admin = Some(Admin {
            proxy_id: Some(ObjectRef::new("gloo-system", "edge")),
            write_namespace: "gloo-system".to_string(),
        });
        assert_eq!(gi.admin_proxy().unwrap().name, "edge");

        // stale id falls back to the heuristic
        gi.spec.admin.as_mut().unwrap().proxy_id = Some(ObjectRef::new("gloo-system", "gone"));
        assert_eq!(gi.admin_proxy().unwrap().name, "gateway-proxy");
    }

    #[test]
    fn test_owns_upstream_empty_watch_list() {
        let gi = instance("c1", &[]);
        assert!(gi.owns_upstream(&ClusterObjectRef::new("c1", "anything", "u1")));
        assert!(!gi.owns_upstream(&ClusterObjectRef::new("c2", "anything", "u1")));
    }

    #[test]
    fn test_owns_upstream_explicit_watch_list() {
        let gi = instance("c1", &["gloo-system", "default"]);
        assert!(gi.owns_upstream(&ClusterObjectRef::new("c1", "default", "u1")));
        assert!(!gi.owns_upstream(&ClusterObjectRef::new("c1", "apps", "u1")));
    }

    #[test]
    fn test_write_namespace_heuristic() {
        let watched = |v: &[&str]| v.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(write_namespace_for_instance("gloo", &[]), "gloo");
        assert_eq!(
            write_namespace_for_instance("gloo", &watched(&["apps", "gloo"])),
            "gloo"
        );
        assert_eq!(
            write_namespace_for_instance("gloo", &watched(&["apps", "gloo-system"])),
            "gloo-system"
        );
        assert_eq!(
            write_namespace_for_instance("gloo", &watched(&["apps", "web"])),
            "apps"
        );
    }

    #[test]
    fn test_write_namespace_prefers_admin_info() {
        let mut gi = instance("c1", &["apps"]);
        assert_eq!(gi.write_namespace(), "apps");
        gi.spec.admin = Some(Admin {
            proxy_id: None,
            write_namespace: "custom".to_string(),
        });
        assert_eq!(gi.write_namespace(), "custom");
    }
}
