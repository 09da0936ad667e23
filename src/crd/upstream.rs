//! # Upstream
//!
//! Gloo routing destinations living on remote clusters. The controller only
//! owns `spec.failover`; every other field belongs to other writers and is
//! carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Gloo Upstream (foreign type, schema owned by gloo)
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    kind = "Upstream",
    group = "gloo.solo.io",
    version = "v1",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover: Option<Failover>,
    /// Remaining upstream spec, preserved verbatim
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Prioritized locality failover configuration consumed by the gloo data plane
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failover {
    #[serde(default)]
    pub prioritized_localities: Vec<PrioritizedLocality>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizedLocality {
    #[serde(default)]
    pub locality_endpoints: Vec<LocalityLbEndpoints>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalityLbEndpoints {
    #[serde(default)]
    pub locality: Locality,
    #[serde(default)]
    pub lb_endpoints: Vec<LbEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing_weight: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Locality {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_zone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LbEndpoint {
    pub address: String,
    pub port: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_ssl_config: Option<UpstreamSslConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamSslConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
    /// Envoy cluster name of the target upstream, forwarded as SNI
    #[serde(default)]
    pub sni: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    pub namespace: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_spec_fields_survive_round_trip() {
        let raw = serde_json::json!({
            "kube": {"serviceName": "blue", "serviceNamespace": "default", "servicePort": 10000},
            "healthChecks": [{"timeout": "1s"}]
        });
        let mut spec: UpstreamSpec = serde_json::from_value(raw.clone()).unwrap();
        assert!(spec.failover.is_none());

        spec.failover = Some(Failover::default());
        let out = serde_json::to_value(&spec).unwrap();
        assert_eq!(out["kube"], raw["kube"]);
        assert_eq!(out["healthChecks"], raw["healthChecks"]);
        assert_eq!(out["failover"]["prioritizedLocalities"], serde_json::json!([]));
    }

    #[test]
    fn test_cleared_failover_is_omitted() {
        let spec = UpstreamSpec::default();
        let out = serde_json::to_value(&spec).unwrap();
        assert!(out.get("failover").is_none());
    }
}
