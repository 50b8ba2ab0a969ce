//! Listener reconciliation.
//!
//! Overlays normalized weights onto each listener's existing forwarding
//! entries and writes the result back, one listener at a time. Three rules
//! hold throughout:
//!
//! - Partial merge: entries whose target group is not in the weight tally
//!   keep their current weight. The tally never adds or removes entries.
//! - Clamp: no written weight exceeds [`MAX_WEIGHT`], independent of what
//!   the normalizer produced.
//! - Zero guard: if the merged weights sum to zero across all entries, the
//!   write is withheld. An all-zero forwarding config would blackhole the
//!   listener's traffic.
//!
//! Listeners are independent. One listener failing to fetch or write never
//! blocks the others.

use serde::Serialize;
use tracing::{info, warn};

use ballast_core::{
    BallastError, BallastResult, ControlPlane, ListenerId, WeightTally, WeightedTargetGroup,
};

use crate::weights::MAX_WEIGHT;

/// What happened to a single listener during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ListenerAction {
    /// Entries written back, or planned in dry-run mode.
    Updated { entries: Vec<WeightedTargetGroup> },
    /// Merged weights summed to zero; the write was withheld.
    SkippedZeroWeight,
    /// Fetch or write failed. Sibling listeners are unaffected.
    Failed { error: String },
}

/// Per-listener reconciliation record, carried in the rebalance report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerReport {
    pub listener: ListenerId,
    #[serde(flatten)]
    pub action: ListenerAction,
}

impl ListenerReport {
    pub fn failed(&self) -> bool {
        matches!(self.action, ListenerAction::Failed { .. })
    }
}

/// Overlay normalized weights onto existing forwarding entries.
///
/// Pure merge: entries present in the tally get the new weight clamped to
/// `MAX_WEIGHT`, the rest are returned unchanged.
pub fn merge_weights(
    entries: &[WeightedTargetGroup],
    weights: &WeightTally,
) -> Vec<WeightedTargetGroup> {
    entries
        .iter()
        .map(|e| match weights.get(&e.target_group) {
            Some(&w) => WeightedTargetGroup {
                target_group: e.target_group.clone(),
                weight: w.min(MAX_WEIGHT),
            },
            None => e.clone(),
        })
        .collect()
}

/// Reconcile every listener in order, absorbing per-listener failures
/// into the returned reports.
pub async fn reconcile(
    plane: &dyn ControlPlane,
    listeners: &[ListenerId],
    weights: &WeightTally,
    dry_run: bool,
) -> Vec<ListenerReport> {
    let mut reports = Vec::with_capacity(listeners.len());
    for listener in listeners {
        let action = match reconcile_listener(plane, listener, weights, dry_run).await {
            Ok(action) => action,
            Err(e) => {
                warn!(listener = %listener, error = %e, "listener reconciliation failed");
                ListenerAction::Failed {
                    error: e.to_string(),
                }
            }
        };
        reports.push(ListenerReport {
            listener: listener.clone(),
            action,
        });
    }
    reports
}

/// Fetch one listener, merge, guard, and write back.
async fn reconcile_listener(
    plane: &dyn ControlPlane,
    listener: &str,
    weights: &WeightTally,
    dry_run: bool,
) -> BallastResult<ListenerAction> {
    // Fetched individually so a missing listener fails only its own branch.
    let request = [listener.to_string()];
    let mut fetched = plane.forwarding(&request).await?;
    let current = fetched
        .pop()
        .ok_or_else(|| BallastError::NotFound(format!("listener {listener}")))?;

    let merged = merge_weights(&current.entries, weights);
    let total: u64 = merged.iter().map(|e| u64::from(e.weight)).sum();

    if total == 0 {
        warn!(
            listener = %listener,
            entries = merged.len(),
            "merged weights sum to zero, withholding update"
        );
        return Ok(ListenerAction::SkippedZeroWeight);
    }

    if dry_run {
        info!(
            listener = %listener,
            total,
            entries = merged.len(),
            "dry run, update planned but not written"
        );
    } else {
        plane.update_forwarding(listener, &merged).await?;
        info!(
            listener = %listener,
            total,
            entries = merged.len(),
            "listener updated"
        );
    }

    Ok(ListenerAction::Updated { entries: merged })
}
