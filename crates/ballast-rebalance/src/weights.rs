//! Weight normalization.
//!
//! Projects a capacity tally onto the forwarding weight range: each target
//! group gets `floor(capacity * 999 / total)`. Integer arithmetic only, so
//! the floor is exact; truncation means the weights can sum to slightly
//! less than 999 and the remainder is deliberately not redistributed.

use ballast_core::{CapacityTally, WeightTally};

pub use ballast_core::MAX_WEIGHT;

/// Normalize a capacity tally into forwarding weights.
///
/// Returns `None` when total capacity is zero (including an empty tally).
/// That is the signal to leave the current traffic distribution untouched;
/// it is never an error.
pub fn normalize(tally: &CapacityTally) -> Option<WeightTally> {
    let total: u64 = tally.values().sum();
    if total == 0 {
        return None;
    }
    let weights = tally
        .iter()
        .map(|(tg, cap)| {
            // cap <= total, so the result is always within [0, MAX_WEIGHT].
            let weight = (u128::from(*cap) * u128::from(MAX_WEIGHT) / u128::from(total)) as u32;
            (tg.clone(), weight)
        })
        .collect();
    Some(weights)
}
