//! In-memory control plane, used for testing purposes and local
//! simulation.
//!
//! `MemoryPlane` is seeded with load balancers, target group members, and
//! listener forwarding entries, then handed to the rebalancer wherever a
//! real control plane would go. It records every write and counts capacity
//! lookups per member so tests can assert both what was written and how
//! often the plane was consulted.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{BallastError, BallastResult};
use crate::plane::ControlPlane;
use crate::types::{
    HealthState, ListenerForwarding, ListenerId, LoadBalancerId, MemberCapacity, MemberHealth,
    MemberId, TargetGroupId, WeightedTargetGroup,
};

#[derive(Default)]
struct Inner {
    load_balancers: HashMap<LoadBalancerId, Vec<TargetGroupId>>,
    health: HashMap<TargetGroupId, Vec<MemberHealth>>,
    capacity: HashMap<MemberId, MemberCapacity>,
    forwarding: HashMap<ListenerId, Vec<WeightedTargetGroup>>,
    /// Identifiers whose reads fail with a transient error.
    read_faults: Vec<String>,
    /// Listeners whose writes fail with a transient error.
    write_faults: Vec<String>,
    capacity_lookups: HashMap<MemberId, u64>,
    updates: Vec<ListenerForwarding>,
}

/// In-memory [`ControlPlane`] provider.
#[derive(Default)]
pub struct MemoryPlane {
    inner: Mutex<Inner>,
}

impl MemoryPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach target groups to a load balancer.
    pub fn seed_load_balancer(&self, lb: &str, tgs: &[&str]) {
        let mut inner = self.inner.lock().expect("plane lock");
        let entry = inner.load_balancers.entry(lb.to_string()).or_default();
        for tg in tgs {
            entry.push(tg.to_string());
        }
    }

    /// Register a member in a target group with a health state and capacity.
    pub fn seed_member(&self, tg: &str, member: &str, state: HealthState, capacity: MemberCapacity) {
        let mut inner = self.inner.lock().expect("plane lock");
        inner.health.entry(tg.to_string()).or_default().push(MemberHealth {
            member: member.to_string(),
            state,
        });
        inner.capacity.insert(member.to_string(), capacity);
    }

    /// Register a target group that exists but has no members.
    pub fn seed_empty_target_group(&self, tg: &str) {
        let mut inner = self.inner.lock().expect("plane lock");
        inner.health.entry(tg.to_string()).or_default();
    }

    /// Set a listener's current forwarding entries.
    pub fn seed_listener(&self, listener: &str, entries: Vec<WeightedTargetGroup>) {
        let mut inner = self.inner.lock().expect("plane lock");
        inner.forwarding.insert(listener.to_string(), entries);
    }

    /// Make every read that touches `id` fail with a transient error.
    pub fn inject_read_fault(&self, id: &str) {
        let mut inner = self.inner.lock().expect("plane lock");
        inner.read_faults.push(id.to_string());
    }

    /// Make writes to `listener` fail with a transient error.
    pub fn inject_write_fault(&self, listener: &str) {
        let mut inner = self.inner.lock().expect("plane lock");
        inner.write_faults.push(listener.to_string());
    }

    /// How many times `member`'s capacity was fetched.
    pub fn capacity_lookups(&self, member: &str) -> u64 {
        let inner = self.inner.lock().expect("plane lock");
        inner.capacity_lookups.get(member).copied().unwrap_or(0)
    }

    /// Total capacity lookups across all members.
    pub fn total_capacity_lookups(&self) -> u64 {
        let inner = self.inner.lock().expect("plane lock");
        inner.capacity_lookups.values().sum()
    }

    /// Every write issued through the plane, in order.
    pub fn recorded_updates(&self) -> Vec<ListenerForwarding> {
        let inner = self.inner.lock().expect("plane lock");
        inner.updates.clone()
    }

    /// The current forwarding entries of a listener, if it exists.
    pub fn forwarding_of(&self, listener: &str) -> Option<Vec<WeightedTargetGroup>> {
        let inner = self.inner.lock().expect("plane lock");
        inner.forwarding.get(listener).cloned()
    }

    fn check_read_fault(inner: &Inner, id: &str) -> BallastResult<()> {
        if inner.read_faults.iter().any(|f| f == id) {
            return Err(BallastError::Api(format!("injected fault for {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for MemoryPlane {
    async fn target_groups(&self, lb: &str) -> BallastResult<Vec<TargetGroupId>> {
        let inner = self.inner.lock().expect("plane lock");
        Self::check_read_fault(&inner, lb)?;
        let mut tgs = inner
            .load_balancers
            .get(lb)
            .cloned()
            .ok_or_else(|| BallastError::NotFound(format!("load balancer {lb}")))?;
        tgs.sort();
        tgs.dedup();
        Ok(tgs)
    }

    async fn member_health(&self, tg: &str) -> BallastResult<Vec<MemberHealth>> {
        let inner = self.inner.lock().expect("plane lock");
        Self::check_read_fault(&inner, tg)?;
        inner
            .health
            .get(tg)
            .cloned()
            .ok_or_else(|| BallastError::NotFound(format!("target group {tg}")))
    }

    async fn member_capacity(&self, member: &str) -> BallastResult<MemberCapacity> {
        let mut inner = self.inner.lock().expect("plane lock");
        Self::check_read_fault(&inner, member)?;
        *inner
            .capacity_lookups
            .entry(member.to_string())
            .or_insert(0) += 1;
        inner
            .capacity
            .get(member)
            .copied()
            .ok_or_else(|| BallastError::NotFound(format!("member {member}")))
    }

    async fn forwarding(&self, listeners: &[ListenerId]) -> BallastResult<Vec<ListenerForwarding>> {
        let inner = self.inner.lock().expect("plane lock");
        let mut out = Vec::with_capacity(listeners.len());
        for listener in listeners {
            Self::check_read_fault(&inner, listener)?;
            let entries = inner
                .forwarding
                .get(listener)
                .cloned()
                .ok_or_else(|| BallastError::NotFound(format!("listener {listener}")))?;
            out.push(ListenerForwarding {
                listener: listener.clone(),
                entries,
            });
        }
        Ok(out)
    }

    async fn update_forwarding(
        &self,
        listener: &str,
        entries: &[WeightedTargetGroup],
    ) -> BallastResult<()> {
        let mut inner = self.inner.lock().expect("plane lock");
        if inner.write_faults.iter().any(|f| f == listener) {
            return Err(BallastError::Api(format!("injected write fault for {listener}")));
        }
        if !inner.forwarding.contains_key(listener) {
            return Err(BallastError::NotFound(format!("listener {listener}")));
        }
        inner
            .forwarding
            .insert(listener.to_string(), entries.to_vec());
        inner.updates.push(ListenerForwarding {
            listener: listener.to_string(),
            entries: entries.to_vec(),
        });
        Ok(())
    }
}
