//! # Custom Resource Definitions
//!
//! Resource types the failover controller reads and writes.
//!
//! ## Module Structure
//!
//! - `failover_scheme.rs` - FailoverScheme spec (user-authored)
//! - `status.rs` - Per-reporter FailoverScheme status records
//! - `gloo_instance.rs` - Discovered gloo instances (read-only)
//! - `upstream.rs` - Gloo upstreams on remote clusters (only `failover` is written)
//! - `refs.rs` - Object references

mod failover_scheme;
mod gloo_instance;
mod refs;
mod status;
mod upstream;

pub use failover_scheme::{FailoverScheme, FailoverSchemeSpec, GroupMember, PriorityGroup};
pub use gloo_instance::{
    select_admin_proxy, write_namespace_for_instance, Admin, ControlPlane, GlooInstance,
    GlooInstanceSpec, IngressEndpoint, Port, Proxy,
};
pub use refs::{upstream_to_cluster_name, ClusterObjectRef, ObjectRef};
pub use status::{FailoverSchemeState, FailoverSchemeStatus, NamespacedStatus};
pub use upstream::{
    Failover, LbEndpoint, Locality, LocalityLbEndpoints, PrioritizedLocality, SecretRef, Upstream,
    UpstreamSpec, UpstreamSslConfig,
};
