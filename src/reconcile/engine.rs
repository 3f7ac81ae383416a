//! Reconciliation: three `PartialFactSet`s → one `FundRecord`.
//!
//! For each schema field the engine walks that field's declared
//! source-priority order and takes the first present value. It never
//! averages, blends, or derives a value from multiple sources, and never
//! substitutes a placeholder for a missing one. A lower-priority source
//! that disagrees is recorded in the lineage, not silently dropped.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::record::{
    ConflictNote, FieldState, FundRecord, Lineage, PartialFactSet, Source,
};
use crate::schema::Field;

use super::scoring::overall_confidence;

/// Merge up to three per-source fact sets into one canonical record.
///
/// Every schema field appears in the output, Present or explicitly
/// Absent. The sets' warnings and whole-source failure reasons are folded
/// into the record so the consumer can read why something is missing.
pub fn reconcile(
    entity_id: &str,
    structured: &PartialFactSet,
    listing: &PartialFactSet,
    document: &PartialFactSet,
) -> FundRecord {
    debug_assert_eq!(structured.source, Source::StructuredApi);
    debug_assert_eq!(listing.source, Source::ListingApi);
    debug_assert_eq!(document.source, Source::Document);

    let set_for = |source: Source| -> &PartialFactSet {
        match source {
            Source::StructuredApi => structured,
            Source::ListingApi => listing,
            Source::Document => document,
        }
    };

    let mut fields: BTreeMap<Field, FieldState> = BTreeMap::new();
    let mut lineage = Lineage::default();

    for field in Field::all() {
        let priority = field.priority();

        let selected = priority
            .iter()
            .find_map(|source| set_for(*source).get(*field).map(|fact| (*source, fact)));

        let Some((selected_source, fact)) = selected else {
            fields.insert(*field, FieldState::Absent);
            continue;
        };

        // A lower-priority source that also supplied a present, different
        // value is an auditable conflict. No present value, no conflict.
        for other_source in priority.iter().filter(|s| **s != selected_source) {
            if let Some(other) = set_for(*other_source).get(*field) {
                if fact.value.conflicts_with(&other.value) {
                    tracing::info!(
                        entity_id = %entity_id,
                        field = %field,
                        selected = %selected_source,
                        rejected = %other_source,
                        "Conflicting values, higher-priority source wins"
                    );
                    lineage.conflicts.push(ConflictNote {
                        field: *field,
                        selected_source,
                        selected_value: fact.value.to_string(),
                        rejected_source: *other_source,
                        rejected_value: other.value.to_string(),
                    });
                }
            }
        }

        lineage.selected.insert(*field, selected_source);
        fields.insert(*field, FieldState::Present(fact.clone()));
    }

    let score = overall_confidence(&fields);

    let mut warnings = Vec::new();
    let mut source_failures = BTreeMap::new();
    for set in [structured, listing, document] {
        warnings.extend(set.warnings.iter().cloned());
        if let Some(reason) = &set.failure {
            source_failures.insert(set.source, reason.clone());
        }
    }

    tracing::info!(
        entity_id = %entity_id,
        present = fields.values().filter(|s| s.is_present()).count(),
        conflicts = lineage.conflicts.len(),
        score,
        "Record reconciled"
    );

    FundRecord {
        entity_id: entity_id.to_string(),
        fields,
        lineage,
        overall_confidence: score,
        extracted_at: Utc::now(),
        warnings,
        source_failures,
    }
}
