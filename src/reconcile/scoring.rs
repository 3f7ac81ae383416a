//! Tiered weighted-completeness score.
//!
//! Purely a completeness indicator for the record's consumer — it never
//! feeds back into which facts are selected.

use std::collections::BTreeMap;

use crate::record::FieldState;
use crate::schema::{Field, FieldTier};

/// Compute the overall confidence score, 0–100.
///
/// Fields are partitioned into the three importance tiers; the score is
/// the sum over tiers of `(present / total in tier) × tier weight`, with
/// tier weights summing to 100.
pub fn overall_confidence(fields: &BTreeMap<Field, FieldState>) -> u8 {
    let mut score = 0.0_f64;

    for tier in FieldTier::all() {
        let in_tier: Vec<Field> = Field::all()
            .iter()
            .copied()
            .filter(|f| f.tier() == *tier)
            .collect();
        if in_tier.is_empty() {
            continue;
        }
        let present = in_tier
            .iter()
            .filter(|f| fields.get(f).is_some_and(FieldState::is_present))
            .count();
        score += (present as f64 / in_tier.len() as f64) * f64::from(tier.weight());
    }

    score.round().clamp(0.0, 100.0) as u8
}
