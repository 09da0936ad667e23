//! # Failover Processor
//!
//! Validates a FailoverScheme and compiles it into the `failover` field of its
//! primary upstream. The processor only reads; persisting the upstream or the
//! status it produces is the reconciler's job.

use super::errors::FailoverError;
use super::status::{StatusBuilder, StatusManager};
use crate::clients::{
    ClientError, FailoverSchemeClient, GlooInstanceClient, MulticlusterUpstreamClientset,
};
use crate::constants::{FAILOVER_PORT_NAME, UPSTREAM_SECRET_NAME};
use crate::crd::{
    upstream_to_cluster_name, ClusterObjectRef, Failover, FailoverScheme, GlooInstance, LbEndpoint,
    Locality, LocalityLbEndpoints, ObjectRef, PrioritizedLocality, Proxy, SecretRef, Upstream,
    UpstreamSslConfig,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of processing a scheme update; exactly one of the two is produced
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Primary upstream with its compiled `failover`, to be written to `cluster`
    Upsert { cluster: String, upstream: Upstream },
    /// Status to record instead of writing the upstream
    Status(StatusBuilder),
}

pub struct FailoverProcessor {
    upstreams: Arc<dyn MulticlusterUpstreamClientset>,
    gloo_instances: Arc<dyn GlooInstanceClient>,
    schemes: Arc<dyn FailoverSchemeClient>,
    status_manager: Arc<StatusManager>,
}

impl std::fmt::Debug for FailoverProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverProcessor").finish_non_exhaustive()
    }
}

impl FailoverProcessor {
    pub fn new(
        upstreams: Arc<dyn MulticlusterUpstreamClientset>,
        gloo_instances: Arc<dyn GlooInstanceClient>,
        schemes: Arc<dyn FailoverSchemeClient>,
        status_manager: Arc<StatusManager>,
    ) -> Self {
        Self {
            upstreams,
            gloo_instances,
            schemes,
            status_manager,
        }
    }

    pub async fn process_update(&self, scheme: &FailoverScheme) -> ProcessOutcome {
        match self.compile(scheme).await {
            Ok((cluster, upstream)) => ProcessOutcome::Upsert { cluster, upstream },
            Err(err) => {
                let status = self.status_manager.new_status_builder(scheme);
                if err.is_retryable() {
                    ProcessOutcome::Status(status.fail(&err))
                } else {
                    ProcessOutcome::Status(status.invalidate(&err))
                }
            }
        }
    }

    async fn compile(&self, scheme: &FailoverScheme) -> Result<(String, Upstream), FailoverError> {
        let primary = scheme
            .spec
            .primary
            .as_ref()
            .ok_or(FailoverError::MissingPrimary)?;

        let primary_client = self.upstreams.cluster(&primary.cluster_name)?;
        let mut primary_upstream = primary_client
            .get(&primary.object_ref())
            .await
            .map_err(FailoverError::Lookup)?;

        let schemes = self.schemes.list().await?;
        ensure_primary_unique(scheme, primary, &schemes)?;

        if scheme.spec.failover_groups.is_empty() {
            return Err(FailoverError::EmptyFailoverGroups);
        }

        let failover = self.build_failover_config(scheme).await?;
        primary_upstream.spec.failover = Some(failover);
        Ok((primary.cluster_name.clone(), primary_upstream))
    }

    /// Compile priority groups into prioritized localities, preserving spec order
    pub async fn build_failover_config(
        &self,
        scheme: &FailoverScheme,
    ) -> Result<Failover, FailoverError> {
        let mut failover = Failover::default();
        for group in &scheme.spec.failover_groups {
            let mut prioritized = PrioritizedLocality::default();
            for member in &group.priority_group {
                let mut locality = LocalityLbEndpoints {
                    load_balancing_weight: member.locality_weight,
                    ..Default::default()
                };
                let instances = self.gloo_instances.list(Some(&member.cluster)).await?;
                let cluster_client = self.upstreams.cluster(&member.cluster)?;

                for upstream_ref in &member.upstreams {
                    // existence check, the compiled endpoint only needs the ref
                    cluster_client
                        .get(upstream_ref)
                        .await
                        .map_err(FailoverError::Lookup)?;
                    let target = upstream_ref.on_cluster(member.cluster.clone());
                    let computed = compute_endpoints(&target, &instances)?;
                    merge_locality(&mut locality.locality, &computed.locality, &target);
                    locality.lb_endpoints.extend(computed.lb_endpoints);
                }
                prioritized.locality_endpoints.push(locality);
            }
            failover.prioritized_localities.push(prioritized);
        }
        Ok(failover)
    }

    /// Upstream with `failover` cleared, or `None` when there is nothing to undo
    pub async fn process_delete(
        &self,
        scheme: &FailoverScheme,
    ) -> Result<Option<Upstream>, ClientError> {
        // a scheme without primary never wrote anything
        let Some(primary) = scheme.spec.primary.as_ref() else {
            return Ok(None);
        };
        let client = self.upstreams.cluster(&primary.cluster_name)?;
        match client.get(&primary.object_ref()).await {
            Ok(mut upstream) => {
                upstream.spec.failover = None;
                Ok(Some(upstream))
            }
            Err(err) if err.is_not_found() => {
                debug!(upstream = %primary, "Primary upstream already gone, nothing to clean up");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Reject `primary` if another scheme claimed it first.
///
/// Claims are ordered by creation time, then `namespace/name`, so when two
/// schemes name the same primary the same one wins whichever is reconciled
/// first.
pub fn ensure_primary_unique(
    scheme: &FailoverScheme,
    primary: &ClusterObjectRef,
    schemes: &[FailoverScheme],
) -> Result<(), FailoverError> {
    let own_key = scheme.key();
    let own_claim = (scheme.metadata.creation_timestamp.clone(), own_key.clone());
    let owner = schemes
        .iter()
        .filter(|other| other.spec.primary.as_ref() == Some(primary) && other.key() != own_key)
        .map(|other| ((other.metadata.creation_timestamp.clone(), other.key()), other))
        .min_by(|(a, _), (b, _)| a.cmp(b));
    match owner {
        Some((claim, owner)) if claim < own_claim => Err(FailoverError::PrimaryInUse {
            upstream: primary.object_ref(),
            cluster: primary.cluster_name.clone(),
            scheme: ObjectRef::from_resource(owner),
        }),
        _ => Ok(()),
    }
}

/// Instances owning `upstream`; anything but exactly one is a compile error
pub fn get_gloo_instances_for_upstream<'a>(
    upstream: &ClusterObjectRef,
    instances: &'a [GlooInstance],
) -> Vec<&'a GlooInstance> {
    instances
        .iter()
        .filter(|instance| instance.owns_upstream(upstream))
        .collect()
}

/// Locality and the single failover endpoint for `upstream`
pub fn compute_endpoints(
    upstream: &ClusterObjectRef,
    instances: &[GlooInstance],
) -> Result<LocalityLbEndpoints, FailoverError> {
    let owners = get_gloo_instances_for_upstream(upstream, instances);
    let [instance] = owners.as_slice() else {
        return Err(FailoverError::OwningInstance {
            found: owners.len(),
            upstream: upstream.object_ref(),
            cluster: upstream.cluster_name.clone(),
        });
    };

    let install_namespace = &instance.spec.control_plane.namespace;
    let proxy = instance
        .admin_proxy()
        .ok_or_else(|| FailoverError::NoAdminProxy {
            cluster: instance.spec.cluster.clone(),
            namespace: install_namespace.clone(),
        })?;

    let mut computed = LocalityLbEndpoints::default();
    // every instance on a cluster shares the region
    computed.locality.region = instance.spec.region.clone();
    if let Some(zone) = proxy.zones.first() {
        computed.locality.zone = zone.clone();
    }

    let proxy_ref = ObjectRef::new(proxy.namespace.clone(), proxy.name.clone());
    if proxy.ingress_endpoints.is_empty() {
        return Err(FailoverError::NoEndpoints {
            cluster: instance.spec.cluster.clone(),
            namespace: install_namespace.clone(),
            proxy: proxy_ref,
        });
    }
    let (address, port) = failover_endpoint(proxy).ok_or_else(|| FailoverError::NoFailoverPort {
        cluster: instance.spec.cluster.clone(),
        namespace: install_namespace.clone(),
        proxy: proxy_ref,
    })?;

    computed.lb_endpoints.push(LbEndpoint {
        address,
        port,
        upstream_ssl_config: Some(UpstreamSslConfig {
            secret_ref: Some(SecretRef {
                name: UPSTREAM_SECRET_NAME.to_string(),
                namespace: instance.write_namespace(),
            }),
            sni: upstream_to_cluster_name(&upstream.object_ref()),
        }),
    });
    Ok(computed)
}

/// First ingress endpoint exposing a port named `failover`
fn failover_endpoint(proxy: &Proxy) -> Option<(String, u32)> {
    proxy.ingress_endpoints.iter().find_map(|endpoint| {
        endpoint
            .ports
            .iter()
            .find(|port| port.name == FAILOVER_PORT_NAME)
            .map(|port| (endpoint.address.clone(), port.port))
    })
}

/// Last non-empty region/zone wins across the upstreams of one locality group
fn merge_locality(merged: &mut Locality, computed: &Locality, upstream: &ClusterObjectRef) {
    if !computed.zone.is_empty() {
        if !merged.zone.is_empty() && merged.zone != computed.zone {
            warn!(
                upstream = %upstream,
                previous = merged.zone.as_str(),
                zone = computed.zone.as_str(),
                "Upstreams in one locality group resolve to different zones, keeping the last"
            );
        }
        merged.zone.clone_from(&computed.zone);
    }
    if !computed.region.is_empty() {
        merged.region.clone_from(&computed.region);
    }
}
