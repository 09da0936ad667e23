//! # Runtime
//!
//! Process wiring around the failover engine.
//!
//! - `initialization`: bootstrap of tracing, metrics, server and clients
//! - `watch_loop`: the FailoverScheme controller loop
//! - `error_policy`: requeue backoff and watch error handling
//! - `dependents`: Upstream and GlooInstance watches feeding the dependent reconciler
//! - `clusters`: member cluster registration from kubeconfig Secrets

pub mod clusters;
pub mod dependents;
pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
