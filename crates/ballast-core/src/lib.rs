//! ballast-core: shared types and the control plane seam for ballast.
//!
//! Ballast rebalances listener forwarding weights across the target groups
//! of a load balancer, proportional to each group's healthy vCPU capacity.
//! This crate holds the pieces every other ballast crate builds on:
//!
//! # Components
//!
//! - [`types`]: identifiers, health states, capacity and weight tallies,
//!   and listener forwarding entries.
//! - [`plane`]: the [`ControlPlane`] trait, the only seam through which
//!   ballast talks to the outside world.
//! - [`memory`]: an in-memory [`ControlPlane`] used for tests and local
//!   simulation.
//! - [`config`]: `ballast.toml` parsing, environment fallbacks, and
//!   validation.
//! - [`error`]: the error taxonomy shared across crates.

pub mod config;
pub mod error;
pub mod memory;
pub mod plane;
pub mod types;

pub use config::BallastConfig;
pub use error::{BallastError, BallastResult};
pub use memory::MemoryPlane;
pub use plane::ControlPlane;
pub use types::*;
