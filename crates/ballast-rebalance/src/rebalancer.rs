//! Rebalance orchestration.
//!
//! [`Rebalancer`] drives one full pass: discover the load balancer's
//! target groups, tally healthy vCPU capacity, normalize weights, and
//! reconcile each configured listener. Every pass recomputes everything
//! from live state; nothing carries over between passes.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ballast_core::{
    BallastConfig, BallastResult, CapacityTally, ControlPlane, LoadBalancerId, WeightTally,
};

use crate::capacity;
use crate::reconcile::{self, ListenerReport};
use crate::weights;

/// Overall outcome of a rebalance pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceOutcome {
    /// Weights were merged and written to the listeners.
    Applied,
    /// Weights were computed and merged but not written.
    DryRun,
    /// Total healthy capacity was zero; reconciliation was skipped and
    /// the existing traffic distribution left in place.
    SkippedNoCapacity,
}

/// Everything one pass computed and did, serializable for reports.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub load_balancer: LoadBalancerId,
    pub outcome: RebalanceOutcome,
    /// Healthy vCPU capacity per target group.
    pub capacities: CapacityTally,
    /// Normalized weights per target group (empty when skipped).
    pub weights: WeightTally,
    /// Per-listener reconciliation results (empty when skipped).
    pub listeners: Vec<ListenerReport>,
}

impl RebalanceReport {
    pub fn updated_listeners(&self) -> usize {
        self.listeners
            .iter()
            .filter(|r| matches!(r.action, reconcile::ListenerAction::Updated { .. }))
            .count()
    }

    pub fn failed_listeners(&self) -> usize {
        self.listeners.iter().filter(|r| r.failed()).count()
    }

    /// False only when every listener failed. Skips of either kind still
    /// count as success.
    pub fn succeeded(&self) -> bool {
        self.listeners.is_empty() || self.failed_listeners() < self.listeners.len()
    }
}

/// The control loop that keeps listener weights proportional to healthy
/// capacity.
pub struct Rebalancer {
    plane: Arc<dyn ControlPlane>,
    config: BallastConfig,
}

impl Rebalancer {
    pub fn new(plane: Arc<dyn ControlPlane>, config: BallastConfig) -> Self {
        Self { plane, config }
    }

    /// Run one full pass and report what happened.
    ///
    /// Hard failures (bad configuration, unknown load balancer, transient
    /// control plane errors during the tally) return `Err`. Per-listener
    /// failures and degenerate skips land in the report instead.
    pub async fn run_once(&self) -> BallastResult<RebalanceReport> {
        self.config.validate()?;
        let lb = self.config.target.load_balancer.clone();

        let target_groups = self.plane.target_groups(&lb).await?;
        info!(
            load_balancer = %lb,
            target_groups = target_groups.len(),
            "discovered target groups"
        );

        let capacities = capacity::tally(
            &self.plane,
            &target_groups,
            self.config.max_concurrent_lookups(),
        )
        .await?;

        let Some(weights) = weights::normalize(&capacities) else {
            warn!(
                load_balancer = %lb,
                "no healthy capacity in any target group, leaving weights untouched"
            );
            return Ok(RebalanceReport {
                load_balancer: lb,
                outcome: RebalanceOutcome::SkippedNoCapacity,
                capacities,
                weights: WeightTally::new(),
                listeners: Vec::new(),
            });
        };

        for (tg, weight) in &weights {
            debug!(
                target_group = %tg,
                capacity = capacities.get(tg).copied().unwrap_or(0),
                weight = *weight,
                "normalized weight"
            );
        }

        let dry_run = self.config.dry_run();
        let listeners = reconcile::reconcile(
            self.plane.as_ref(),
            &self.config.target.listeners,
            &weights,
            dry_run,
        )
        .await;

        let outcome = if dry_run {
            RebalanceOutcome::DryRun
        } else {
            RebalanceOutcome::Applied
        };
        let report = RebalanceReport {
            load_balancer: lb,
            outcome,
            capacities,
            weights,
            listeners,
        };
        info!(
            outcome = ?report.outcome,
            updated = report.updated_listeners(),
            failed = report.failed_listeners(),
            "rebalance pass complete"
        );
        Ok(report)
    }

    /// Run passes on an interval until shutdown. A failed pass is logged
    /// and the loop continues.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "rebalancer started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.run_once().await {
                        Ok(report) => {
                            if !report.succeeded() {
                                tracing::error!(
                                    load_balancer = %report.load_balancer,
                                    failed = report.failed_listeners(),
                                    "every listener failed to reconcile"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "rebalance pass failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("rebalancer shutting down");
                    break;
                }
            }
        }
    }
}
