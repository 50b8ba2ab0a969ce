//! Domain types for the ballast rebalancer.
//!
//! These types model the slice of load balancer state the rebalancer reads
//! and writes: target groups and their member health, member compute
//! capacity, and each listener's weighted forwarding entries. Everything is
//! serializable for reports and test fixtures.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a load balancer (opaque to ballast, e.g. an ARN).
pub type LoadBalancerId = String;

/// Identifier of a listener attached to a load balancer.
pub type ListenerId = String;

/// Identifier of a target group.
pub type TargetGroupId = String;

/// Identifier of a backend member of a target group (e.g. an instance id).
pub type MemberId = String;

/// Aggregate healthy vCPU capacity per target group.
///
/// A target group with no healthy members carries an explicit 0 entry.
/// BTreeMap keeps iteration order deterministic for logs and reports.
pub type CapacityTally = BTreeMap<TargetGroupId, u64>;

/// Normalized forwarding weight per target group, each on `[0, 999]`.
pub type WeightTally = BTreeMap<TargetGroupId, u32>;

/// Upper bound of the forwarding weight range.
pub const MAX_WEIGHT: u32 = 999;

// ── Health ────────────────────────────────────────────────────────

/// Health classification of a target group member, as reported by the
/// control plane. Only `Healthy` members contribute capacity; every other
/// state is excluded from the tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Initial,
    Unhealthy,
    Draining,
    Unused,
    Unavailable,
}

impl HealthState {
    /// Map a provider's state string onto the known set. Unrecognized
    /// states come back as `Unavailable`.
    pub fn parse(s: &str) -> Self {
        match s {
            "healthy" => HealthState::Healthy,
            "initial" => HealthState::Initial,
            "unhealthy" => HealthState::Unhealthy,
            "draining" => HealthState::Draining,
            "unused" => HealthState::Unused,
            _ => HealthState::Unavailable,
        }
    }

    /// Whether a member in this state counts toward capacity.
    pub fn is_healthy(self) -> bool {
        matches!(self, HealthState::Healthy)
    }
}

/// Health entry for a single member of a target group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberHealth {
    pub member: MemberId,
    pub state: HealthState,
}

// ── Capacity ──────────────────────────────────────────────────────

/// Compute capacity of a single member.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberCapacity {
    /// Physical cores on the member.
    pub core_count: u32,
    /// Hardware threads per core.
    pub threads_per_core: u32,
}

impl MemberCapacity {
    /// Total vCPU count: cores times threads per core.
    pub fn vcpu_count(&self) -> u64 {
        u64::from(self.core_count) * u64::from(self.threads_per_core)
    }
}

// ── Forwarding ────────────────────────────────────────────────────

/// One weighted entry in a listener's forwarding configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeightedTargetGroup {
    pub target_group: TargetGroupId,
    pub weight: u32,
}

/// A listener's forwarding configuration: the ordered target groups it
/// forwards to, each with a relative weight.
///
/// The control plane owns the authoritative copy. Ballast holds this
/// transient view only long enough to overlay new weights and write the
/// whole structure back in a single call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerForwarding {
    pub listener: ListenerId,
    pub entries: Vec<WeightedTargetGroup>,
}

impl ListenerForwarding {
    /// Sum of all entry weights, untouched entries included.
    pub fn total_weight(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.weight)).sum()
    }
}
