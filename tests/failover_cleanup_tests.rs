//! Cleanup of the primary upstream when a FailoverScheme is deleted.

mod common;

use common::*;
use failover_controller::clients::memory::InjectedFailure;
use failover_controller::prelude::*;

#[tokio::test]
async fn test_finalize_clears_failover_from_primary() {
    let harness = single_cluster_setup(vec![failover_port()]);
    assert_eq!(harness.reconcile("scheme").await, ReconcileOutcome::Accepted);
    assert!(harness.primary_failover("c1", "ns", "u1").is_some());

    harness
        .reconciler
        .finalize(&harness.scheme("scheme"))
        .await
        .unwrap();

    assert!(harness.primary_failover("c1", "ns", "u1").is_none());
    // the upstream itself survives
    assert!(harness
        .cluster("c1")
        .snapshot(&ObjectRef::new("ns", "u1"))
        .is_some());
}

#[tokio::test]
async fn test_finalize_is_idempotent_when_primary_is_gone() {
    let harness = single_cluster_setup(vec![failover_port()]);
    assert_eq!(harness.reconcile("scheme").await, ReconcileOutcome::Accepted);
    let scheme = harness.scheme("scheme");

    harness.reconciler.finalize(&scheme).await.unwrap();
    harness.cluster("c1").remove(&ObjectRef::new("ns", "u1"));
    let upserts = harness.total_upserts();

    harness.reconciler.finalize(&scheme).await.unwrap();
    harness.reconciler.finalize(&scheme).await.unwrap();
    assert_eq!(harness.total_upserts(), upserts);
}

#[tokio::test]
async fn test_finalize_without_primary_is_a_no_op() {
    let harness = Harness::new(&["c1"]);
    harness.schemes.insert(scheme("empty", None, vec![]));

    harness
        .reconciler
        .finalize(&harness.scheme("empty"))
        .await
        .unwrap();
    assert_eq!(harness.total_upserts(), 0);
}

#[tokio::test]
async fn test_finalize_surfaces_read_errors() {
    let harness = single_cluster_setup(vec![failover_port()]);
    harness
        .cluster("c1")
        .fail_get(&ObjectRef::new("ns", "u1"), InjectedFailure::Unavailable);

    let err = harness
        .reconciler
        .finalize(&harness.scheme("scheme"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcilerError::Cleanup(_)));
}

#[tokio::test]
async fn test_finalize_on_unregistered_cluster_fails() {
    let harness = Harness::new(&["c1"]);
    harness.schemes.insert(scheme(
        "scheme",
        Some(ClusterObjectRef::new("gone", "ns", "u1")),
        vec![vec![member("c1", &[("ns", "u2")])]],
    ));

    let err = harness
        .reconciler
        .finalize(&harness.scheme("scheme"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("gone"), "unexpected error: {err}");
}
