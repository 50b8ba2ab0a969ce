//! ballast-rebalance: the weight rebalancing engine.
//!
//! A single pass runs in three stages over a [`ballast_core::ControlPlane`]:
//!
//! ```text
//! discover target groups
//!        │
//!        ▼
//! tally healthy vCPU capacity per group      (capacity)
//!        │
//!        ▼
//! normalize onto the weight range [0, 999]   (weights)
//!        │
//!        ▼
//! merge into each listener's forwarding      (reconcile)
//! ```
//!
//! [`Rebalancer`] drives the stages, either once or on an interval with
//! graceful shutdown. Degenerate states (no healthy capacity anywhere, a
//! listener whose merged weights sum to zero) skip the write path and
//! surface in the [`RebalanceReport`] instead of failing the pass.

pub mod capacity;
pub mod reconcile;
pub mod rebalancer;
pub mod weights;

pub use rebalancer::{RebalanceOutcome, RebalanceReport, Rebalancer};
pub use reconcile::{ListenerAction, ListenerReport};
pub use weights::MAX_WEIGHT;
