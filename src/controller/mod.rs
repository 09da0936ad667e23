//! # Controller
//!
//! - `backoff`: Fibonacci requeue backoff for failing FailoverSchemes
//! - `failover`: FailoverScheme processing, reconciliation and dependency tracking
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod failover;
pub mod server;
