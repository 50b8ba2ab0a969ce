//! The control plane seam.
//!
//! Every external call ballast makes goes through [`ControlPlane`], one
//! method per operation the algorithm needs and nothing more. The AWS
//! implementation lives in the `ballast-aws` crate; [`crate::MemoryPlane`]
//! backs tests and local simulation.

use async_trait::async_trait;

use crate::error::BallastResult;
use crate::types::{
    ListenerForwarding, ListenerId, MemberCapacity, MemberHealth, TargetGroupId,
    WeightedTargetGroup,
};

/// Read/write access to the load balancing control plane.
///
/// Implementations map domain errors as follows: a referenced entity that
/// does not exist is `BallastError::NotFound`; transient failures that
/// survive the provider's own retries are `BallastError::Api`. A target
/// group with no registered members is an empty health list, not an error.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Target groups currently attached to the load balancer,
    /// de-duplicated and sorted.
    async fn target_groups(&self, lb: &str) -> BallastResult<Vec<TargetGroupId>>;

    /// Health classification of every registered member of a target group.
    async fn member_health(&self, tg: &str) -> BallastResult<Vec<MemberHealth>>;

    /// Compute capacity of a single member.
    async fn member_capacity(&self, member: &str) -> BallastResult<MemberCapacity>;

    /// Current forwarding configuration of each requested listener, in
    /// request order. A missing listener fails the whole call, so callers
    /// that need per-listener isolation fetch one at a time.
    async fn forwarding(&self, listeners: &[ListenerId]) -> BallastResult<Vec<ListenerForwarding>>;

    /// Replace a listener's forwarding entries in one call, preserving all
    /// unrelated listener configuration.
    async fn update_forwarding(
        &self,
        listener: &str,
        entries: &[WeightedTargetGroup],
    ) -> BallastResult<()>;
}
