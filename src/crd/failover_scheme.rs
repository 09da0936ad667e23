//! # FailoverScheme Spec
//!
//! The user-authored resource describing a primary upstream and its ordered
//! failover priority groups.

use crate::crd::{ClusterObjectRef, ObjectRef};
use serde::{Deserialize, Serialize};

/// FailoverScheme Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: fed.solo.io/v1
/// kind: FailoverScheme
/// metadata:
///   name: failover-test-scheme
///   namespace: gloo-system
/// spec:
///   primary:
///     clusterName: local
///     name: default-service-blue-10000
///     namespace: gloo-system
///   failoverGroups:
///   - priorityGroup:
///     - cluster: remote
///       upstreams:
///       - name: default-service-green-10000
///         namespace: gloo-system
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "FailoverScheme",
    group = "fed.solo.io",
    version = "v1",
    namespaced,
    status = "crate::crd::FailoverSchemeStatus",
    printcolumn = r#"{"name":"Primary", "type":"string", "jsonPath":".spec.primary.name"}, {"name":"Cluster", "type":"string", "jsonPath":".spec.primary.clusterName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FailoverSchemeSpec {
    /// Upstream whose `failover` field is managed; must be unique across all schemes
    #[serde(default)]
    pub primary: Option<ClusterObjectRef>,
    /// Priority-ordered failover groups; earlier groups are preferred
    #[serde(default)]
    pub failover_groups: Vec<PriorityGroup>,
}

/// One priority level of failover targets
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriorityGroup {
    #[serde(default)]
    pub priority_group: Vec<GroupMember>,
}

/// A locality target inside a priority group
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    /// Cluster all `upstreams` live on
    pub cluster: String,
    #[serde(default)]
    pub upstreams: Vec<ObjectRef>,
    #[serde(default)]
    pub locality_weight: Option<u32>,
}

impl FailoverSchemeSpec {
    /// Every upstream this spec refers to, primary first, scoped to its cluster
    pub fn upstream_refs(&self) -> impl Iterator<Item = ClusterObjectRef> + '_ {
        let members = self
            .failover_groups
            .iter()
            .flat_map(|group| group.priority_group.iter())
            .flat_map(|member| {
                member
                    .upstreams
                    .iter()
                    .map(move |us| us.on_cluster(member.cluster.clone()))
            });
        self.primary.clone().into_iter().chain(members)
    }
}

impl FailoverScheme {
    /// `namespace/name` identity of this scheme
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or("default"),
            self.metadata.name.as_deref().unwrap_or("unknown")
        )
    }

    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_refs_scopes_members_to_their_cluster() {
        let spec = FailoverSchemeSpec {
            primary: Some(ClusterObjectRef::new("c1", "ns", "u1")),
            failover_groups: vec![PriorityGroup {
                priority_group: vec![
                    GroupMember {
                        cluster: "c2".to_string(),
                        upstreams: vec![ObjectRef::new("ns", "u2"), ObjectRef::new("ns", "u3")],
                        locality_weight: None,
                    },
                    GroupMember {
                        cluster: "c3".to_string(),
                        upstreams: vec![ObjectRef::new("other", "u4")],
                        locality_weight: Some(2),
                    },
                ],
            }],
        };

        let refs: Vec<_> = spec.upstream_refs().collect();
        assert_eq!(
            refs,
            vec![
                ClusterObjectRef::new("c1", "ns", "u1"),
                ClusterObjectRef::new("c2", "ns", "u2"),
                ClusterObjectRef::new("c2", "ns", "u3"),
                ClusterObjectRef::new("c3", "other", "u4"),
            ]
        );
    }

    #[test]
    fn test_spec_deserializes_yaml_shape() {
        let spec: FailoverSchemeSpec = serde_json::from_value(serde_json::json!({
            "primary": {"clusterName": "local", "name": "blue", "namespace": "gloo-system"},
            "failoverGroups": [
                {"priorityGroup": [
                    {"cluster": "remote", "localityWeight": 3,
                     "upstreams": [{"name": "green", "namespace": "gloo-system"}]}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(spec.failover_groups.len(), 1);
        let member = &spec.failover_groups[0].priority_group[0];
        assert_eq!(member.cluster, "remote");
        assert_eq!(member.locality_weight, Some(3));
        assert_eq!(member.upstreams[0], ObjectRef::new("gloo-system", "green"));
    }

    #[test]
    fn test_missing_primary_is_none() {
        let spec: FailoverSchemeSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(spec.primary.is_none());
        assert!(spec.failover_groups.is_empty());
        assert_eq!(spec.upstream_refs().count(), 0);
    }
}
