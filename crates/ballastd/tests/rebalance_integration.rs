//! End-to-end rebalance passes over the in-memory control plane.
//!
//! Each test seeds a `MemoryPlane` with a load balancer, target group
//! members, and listener forwarding entries, runs full passes through
//! `Rebalancer`, and asserts on both the report and the state the plane
//! ended up in — no real control plane involved.

use std::sync::Arc;

use ballast_core::{
    BallastConfig, BallastError, ControlPlane, HealthState, MemberCapacity, MemoryPlane,
    WeightedTargetGroup,
};
use ballast_rebalance::{RebalanceOutcome, Rebalancer};

fn cap(cores: u32, threads: u32) -> MemberCapacity {
    MemberCapacity {
        core_count: cores,
        threads_per_core: threads,
    }
}

fn entry(tg: &str, weight: u32) -> WeightedTargetGroup {
    WeightedTargetGroup {
        target_group: tg.to_string(),
        weight,
    }
}

fn config(lb: &str, listeners: &[&str]) -> BallastConfig {
    let mut config = BallastConfig::default();
    config.target.load_balancer = lb.to_string();
    config.target.listeners = listeners.iter().map(|l| l.to_string()).collect();
    config
}

fn rebalancer(plane: &Arc<MemoryPlane>, config: BallastConfig) -> Rebalancer {
    let plane: Arc<dyn ControlPlane> = Arc::clone(plane);
    Rebalancer::new(plane, config)
}

#[tokio::test]
async fn sole_healthy_group_takes_full_weight_and_strangers_keep_theirs() {
    let plane = Arc::new(MemoryPlane::new());
    plane.seed_load_balancer("lb-1", &["tg-a"]);
    plane.seed_member("tg-a", "i-1", HealthState::Healthy, cap(2, 2));
    // tg-c is forwarded to by the listener but not attached to lb-1, so it
    // never enters the tally and its weight must survive untouched.
    plane.seed_listener("lsn-1", vec![entry("tg-a", 1), entry("tg-c", 500)]);

    let report = rebalancer(&plane, config("lb-1", &["lsn-1"]))
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.outcome, RebalanceOutcome::Applied);
    assert_eq!(report.weights["tg-a"], 999);
    assert_eq!(
        plane.forwarding_of("lsn-1").unwrap(),
        vec![entry("tg-a", 999), entry("tg-c", 500)]
    );
}

#[tokio::test]
async fn only_healthy_members_contribute_capacity() {
    let plane = Arc::new(MemoryPlane::new());
    plane.seed_load_balancer("lb-1", &["tg-a", "tg-b"]);
    plane.seed_member("tg-a", "i-a1", HealthState::Healthy, cap(2, 2));
    plane.seed_member("tg-a", "i-a2", HealthState::Draining, cap(16, 2));
    plane.seed_member("tg-a", "i-a3", HealthState::Unhealthy, cap(16, 2));
    plane.seed_member("tg-a", "i-a4", HealthState::Initial, cap(16, 2));
    plane.seed_member("tg-b", "i-b1", HealthState::Healthy, cap(6, 2));
    plane.seed_listener("lsn-1", vec![entry("tg-a", 1), entry("tg-b", 1)]);

    let report = rebalancer(&plane, config("lb-1", &["lsn-1"]))
        .run_once()
        .await
        .unwrap();

    // 4 healthy vCPUs in tg-a, 12 in tg-b; the sick members never count.
    assert_eq!(report.capacities["tg-a"], 4);
    assert_eq!(report.capacities["tg-b"], 12);
    assert_eq!(report.weights["tg-a"], 249);
    assert_eq!(report.weights["tg-b"], 749);
    // Non-healthy members are never even asked for their capacity.
    assert_eq!(plane.capacity_lookups("i-a2"), 0);
    assert_eq!(plane.capacity_lookups("i-a3"), 0);
}

#[tokio::test]
async fn member_lookup_failure_aborts_the_pass_without_writes() {
    let plane = Arc::new(MemoryPlane::new());
    plane.seed_load_balancer("lb-1", &["tg-a", "tg-b"]);
    plane.seed_member("tg-a", "i-a1", HealthState::Healthy, cap(2, 2));
    plane.seed_member("tg-b", "i-b1", HealthState::Healthy, cap(2, 2));
    plane.seed_listener("lsn-1", vec![entry("tg-a", 100), entry("tg-b", 100)]);
    plane.inject_read_fault("i-b1");

    let err = rebalancer(&plane, config("lb-1", &["lsn-1"]))
        .run_once()
        .await
        .unwrap_err();

    // Fail-fast: a partial sum would understate tg-b, so the pass aborts
    // and nothing is written.
    assert!(matches!(err, BallastError::Api(_)));
    assert!(plane.recorded_updates().is_empty());
    assert_eq!(
        plane.forwarding_of("lsn-1").unwrap(),
        vec![entry("tg-a", 100), entry("tg-b", 100)]
    );
}

#[tokio::test]
async fn vanished_group_is_dropped_and_the_rest_renormalize() {
    let plane = Arc::new(MemoryPlane::new());
    // tg-ghost is attached to the balancer but its member list no longer
    // resolves, as if deleted between discovery and resolution.
    plane.seed_load_balancer("lb-1", &["tg-a", "tg-ghost"]);
    plane.seed_member("tg-a", "i-1", HealthState::Healthy, cap(2, 2));
    plane.seed_listener("lsn-1", vec![entry("tg-a", 1), entry("tg-ghost", 700)]);

    let report = rebalancer(&plane, config("lb-1", &["lsn-1"]))
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.outcome, RebalanceOutcome::Applied);
    assert!(!report.weights.contains_key("tg-ghost"));
    assert_eq!(report.weights["tg-a"], 999);
    // The ghost's entry is untouched, not zeroed.
    assert_eq!(
        plane.forwarding_of("lsn-1").unwrap(),
        vec![entry("tg-a", 999), entry("tg-ghost", 700)]
    );
}

#[tokio::test]
async fn zero_weight_listener_is_skipped_while_sibling_updates() {
    let plane = Arc::new(MemoryPlane::new());
    plane.seed_load_balancer("lb-1", &["tg-a", "tg-b"]);
    // tg-a exists but has nothing healthy, tg-b carries all capacity.
    plane.seed_member("tg-a", "i-a1", HealthState::Unhealthy, cap(8, 2));
    plane.seed_member("tg-b", "i-b1", HealthState::Healthy, cap(2, 2));
    // lsn-only-a forwards solely to tg-a; writing {tg-a: 0} would
    // blackhole it, so that write must be withheld.
    plane.seed_listener("lsn-only-a", vec![entry("tg-a", 300)]);
    plane.seed_listener("lsn-both", vec![entry("tg-a", 300), entry("tg-b", 1)]);

    let report = rebalancer(&plane, config("lb-1", &["lsn-only-a", "lsn-both"]))
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.weights["tg-a"], 0);
    assert_eq!(report.weights["tg-b"], 999);
    assert_eq!(report.updated_listeners(), 1);
    assert!(report.succeeded());
    assert_eq!(
        plane.forwarding_of("lsn-only-a").unwrap(),
        vec![entry("tg-a", 300)]
    );
    assert_eq!(
        plane.forwarding_of("lsn-both").unwrap(),
        vec![entry("tg-a", 0), entry("tg-b", 999)]
    );
}

#[tokio::test]
async fn repeated_passes_converge_to_the_same_configuration() {
    let plane = Arc::new(MemoryPlane::new());
    plane.seed_load_balancer("lb-1", &["tg-a", "tg-b"]);
    plane.seed_member("tg-a", "i-a1", HealthState::Healthy, cap(2, 2));
    plane.seed_member("tg-b", "i-b1", HealthState::Healthy, cap(6, 2));
    plane.seed_listener("lsn-1", vec![entry("tg-a", 1), entry("tg-b", 1)]);

    let rebalancer = rebalancer(&plane, config("lb-1", &["lsn-1"]));
    rebalancer.run_once().await.unwrap();
    let after_first = plane.forwarding_of("lsn-1").unwrap();
    rebalancer.run_once().await.unwrap();
    let after_second = plane.forwarding_of("lsn-1").unwrap();

    assert_eq!(after_first, after_second);
    let updates = plane.recorded_updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].entries, updates[1].entries);
}
