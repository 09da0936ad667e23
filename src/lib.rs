//! FailoverScheme Controller Library
//!
//! Compiles federated FailoverSchemes into locality-aware failover
//! configuration on the primary Upstream of each scheme, across clusters.
//!
//! ## Quick Start
//!
//! ```rust
//! use failover_controller::prelude::*;
//! ```
//!
//! The in-memory clients in [`clients::memory`] run the whole engine without
//! a cluster, which is how the integration tests drive it.

pub mod clients;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
