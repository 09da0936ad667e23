//! # Metrics
//!
//! Prometheus metrics for monitoring the failover controller.
//!
//! ## Metrics Exposed
//!
//! - `failover_reconciliations_total` - Total number of FailoverScheme reconciliations
//! - `failover_reconciliation_errors_total` - Reconciliations that returned an error to the runtime
//! - `failover_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `failover_reconcile_outcomes_total` - Reconcile outcomes by resulting state
//! - `failover_upstream_writes_total` - Upstream failover writes by operation
//! - `failover_dependents_marked_pending_total` - Schemes marked PENDING by dependency triggers
//! - `failover_dependent_mark_errors_total` - Swallowed errors while marking dependents PENDING
//! - `failover_requeues_total` - Requeues by reason

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "failover_reconciliations_total",
        "Total number of FailoverScheme reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "failover_reconciliation_errors_total",
        "Total number of reconciliation errors returned to the runtime",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "failover_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static RECONCILE_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "failover_reconcile_outcomes_total",
            "Reconcile outcomes by resulting state",
        ),
        &["outcome"],
    )
    .expect("Failed to create RECONCILE_OUTCOMES_TOTAL metric - this should never happen")
});

static UPSTREAM_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "failover_upstream_writes_total",
            "Upstream failover writes by operation and cluster",
        ),
        &["operation", "cluster"],
    )
    .expect("Failed to create UPSTREAM_WRITES_TOTAL metric - this should never happen")
});

static DEPENDENTS_MARKED_PENDING_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "failover_dependents_marked_pending_total",
            "FailoverSchemes marked PENDING by dependency triggers",
        ),
        &["trigger"],
    )
    .expect("Failed to create DEPENDENTS_MARKED_PENDING_TOTAL metric - this should never happen")
});

static DEPENDENT_MARK_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "failover_dependent_mark_errors_total",
            "Swallowed errors while marking dependent FailoverSchemes PENDING",
        ),
        &["trigger"],
    )
    .expect("Failed to create DEPENDENT_MARK_ERRORS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("failover_requeues_total", "Requeues by reason"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPSTREAM_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEPENDENTS_MARKED_PENDING_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEPENDENT_MARK_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

/// Encode the crate registry in the Prometheus text format
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_reconcile_outcome(outcome: &str) {
    RECONCILE_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_upstream_writes(operation: &str, cluster: &str) {
    UPSTREAM_WRITES_TOTAL
        .with_label_values(&[operation, cluster])
        .inc();
}

pub fn increment_dependents_marked_pending(trigger: &str, count: usize) {
    DEPENDENTS_MARKED_PENDING_TOTAL
        .with_label_values(&[trigger])
        .inc_by(count as u64);
}

pub fn increment_dependent_mark_errors(trigger: &str) {
    DEPENDENT_MARK_ERRORS_TOTAL
        .with_label_values(&[trigger])
        .inc();
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // This should not panic - metrics should register successfully
        assert!(register_metrics().is_ok());
        let text = gather_text().unwrap();
        assert!(text.contains("failover_reconciliations_total"));
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        let after = RECONCILIATIONS_TOTAL.get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_reconciliation_errors() {
        let before = RECONCILIATION_ERRORS_TOTAL.get();
        increment_reconciliation_errors();
        let after = RECONCILIATION_ERRORS_TOTAL.get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration(0.25);
        // Histogram observation doesn't return a value
    }

    #[test]
    fn test_increment_reconcile_outcome() {
        let before = RECONCILE_OUTCOMES_TOTAL
            .with_label_values(&["INVALID"])
            .get();
        increment_reconcile_outcome("INVALID");
        let after = RECONCILE_OUTCOMES_TOTAL
            .with_label_values(&["INVALID"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_upstream_writes() {
        let before = UPSTREAM_WRITES_TOTAL
            .with_label_values(&["clear", "metrics-test"])
            .get();
        increment_upstream_writes("clear", "metrics-test");
        let after = UPSTREAM_WRITES_TOTAL
            .with_label_values(&["clear", "metrics-test"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_dependents_marked_pending() {
        let before = DEPENDENTS_MARKED_PENDING_TOTAL
            .with_label_values(&["metrics-test"])
            .get();
        increment_dependents_marked_pending("metrics-test", 3);
        let after = DEPENDENTS_MARKED_PENDING_TOTAL
            .with_label_values(&["metrics-test"])
            .get();
        assert_eq!(after, before + 3u64);
    }

    #[test]
    fn test_increment_dependent_mark_errors() {
        let before = DEPENDENT_MARK_ERRORS_TOTAL
            .with_label_values(&["metrics-test"])
            .get();
        increment_dependent_mark_errors("metrics-test");
        let after = DEPENDENT_MARK_ERRORS_TOTAL
            .with_label_values(&["metrics-test"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_requeues() {
        let before = REQUEUES_TOTAL.with_label_values(&["metrics-test"]).get();
        increment_requeues("metrics-test");
        let after = REQUEUES_TOTAL.with_label_values(&["metrics-test"]).get();
        assert_eq!(after, before + 1u64);
    }
}
