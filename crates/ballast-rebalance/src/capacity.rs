//! Capacity resolution.
//!
//! For each target group: fetch member health, keep only healthy members,
//! fetch each healthy member's capacity, and sum the vCPUs. A group with
//! no healthy members tallies 0, which is a valid result. A failed member
//! lookup fails the whole group rather than producing a partial sum that
//! would silently shift traffic away from it.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use ballast_core::{BallastError, BallastResult, CapacityTally, ControlPlane, TargetGroupId};

/// Healthy vCPU capacity of a single target group.
pub async fn resolve_capacity(plane: &dyn ControlPlane, tg: &str) -> BallastResult<u64> {
    let members = plane.member_health(tg).await?;
    let healthy: Vec<_> = members
        .into_iter()
        .filter(|m| m.state.is_healthy())
        .collect();

    let mut vcpus = 0u64;
    for member in &healthy {
        vcpus += plane.member_capacity(&member.member).await?.vcpu_count();
    }

    debug!(
        target_group = %tg,
        healthy = healthy.len(),
        vcpus,
        "resolved capacity"
    );
    Ok(vcpus)
}

/// Resolve every target group's capacity, at most `max_concurrent` groups
/// in flight at a time (1 gives sequential resolution).
///
/// A group that vanished since discovery is dropped from the tally with a
/// warning; the remaining groups proceed. Any other failure fails the
/// whole tally, with the first failing group in input order reported.
pub async fn tally(
    plane: &Arc<dyn ControlPlane>,
    tgs: &[TargetGroupId],
    max_concurrent: usize,
) -> BallastResult<CapacityTally> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut handles = Vec::with_capacity(tgs.len());

    for tg in tgs {
        let plane = Arc::clone(plane);
        let semaphore = Arc::clone(&semaphore);
        let tg = tg.clone();
        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        tg,
                        Err(BallastError::Api("capacity semaphore closed".to_string())),
                    );
                }
            };
            let result = resolve_capacity(plane.as_ref(), &tg).await;
            (tg, result)
        }));
    }

    let mut capacities = CapacityTally::new();
    let mut first_error: Option<BallastError> = None;

    // Awaiting in spawn order keeps the reported error deterministic no
    // matter how the tasks interleave.
    for handle in handles {
        let (tg, result) = handle
            .await
            .map_err(|e| BallastError::Api(format!("capacity task failed: {e}")))?;
        match result {
            Ok(vcpus) => {
                capacities.insert(tg, vcpus);
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    target_group = %tg,
                    error = %e,
                    "target group vanished during resolution, dropping from tally"
                );
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(capacities),
    }
}
