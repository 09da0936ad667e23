//! # Failover Dependencies
//!
//! Reverse lookup from a changed Upstream or GlooInstance to the
//! FailoverSchemes whose compiled output depends on it.

use crate::clients::{ClientError, FailoverSchemeClient, GlooInstanceClient};
use crate::crd::{ClusterObjectRef, FailoverScheme, ObjectRef};
use std::sync::Arc;
use tracing::debug;

pub struct FailoverDependencyCalculator {
    schemes: Arc<dyn FailoverSchemeClient>,
    gloo_instances: Arc<dyn GlooInstanceClient>,
}

impl std::fmt::Debug for FailoverDependencyCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverDependencyCalculator").finish_non_exhaustive()
    }
}

impl FailoverDependencyCalculator {
    pub fn new(
        schemes: Arc<dyn FailoverSchemeClient>,
        gloo_instances: Arc<dyn GlooInstanceClient>,
    ) -> Self {
        Self {
            schemes,
            gloo_instances,
        }
    }

    /// Schemes naming `upstream` as primary or as a failover target
    pub async fn for_upstream(
        &self,
        upstream: &ClusterObjectRef,
    ) -> Result<Vec<FailoverScheme>, ClientError> {
        let schemes = self.schemes.list().await?;
        Ok(schemes
            .into_iter()
            .filter(|scheme| scheme.spec.upstream_refs().any(|us| &us == upstream))
            .collect())
    }

    /// Schemes referring to any upstream the instance owns.
    ///
    /// An instance that can no longer be read (typically deleted) makes every
    /// scheme a dependent.
    pub async fn for_gloo_instance(
        &self,
        instance: &ObjectRef,
    ) -> Result<Vec<FailoverScheme>, ClientError> {
        let resolved = match self.gloo_instances.get(instance).await {
            Ok(resolved) => Some(resolved),
            Err(err) if err.is_not_found() => {
                debug!(
                    instance = %instance,
                    "GlooInstance not found, treating every FailoverScheme as dependent"
                );
                None
            }
            Err(err) => return Err(err),
        };

        let schemes = self.schemes.list().await?;
        let Some(resolved) = resolved else {
            return Ok(schemes);
        };
        Ok(schemes
            .into_iter()
            .filter(|scheme| scheme.spec.upstream_refs().any(|us| resolved.owns_upstream(&us)))
            .collect())
    }
}
