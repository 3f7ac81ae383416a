//! Listing-API adapter: directory match → `PartialFactSet`.

use crate::patterns::normalize;
use crate::record::{Confidence, PartialFactSet, Source, Value};
use crate::schema::Field;

use super::ListingMatch;

/// Normalize a directory/listing match into a `PartialFactSet`.
///
/// The match's `document_token` is deliberately not a fact — it is
/// transport metadata consumed by the assembler, not part of the record.
pub fn normalize_listing(entity_id: &str, matched: &ListingMatch) -> PartialFactSet {
    let mut facts = PartialFactSet::new(Source::ListingApi);

    let name = matched.name.trim();
    if !name.is_empty() {
        facts.insert(
            Field::Name,
            Value::Text(normalize::collapse_whitespace(name)),
            Confidence::High,
            "listing:name",
        );
    }

    match normalize::normalize_run(&matched.identifier) {
        Some(run) => {
            facts.insert(
                Field::Identifier,
                Value::Text(run),
                Confidence::High,
                "listing:run",
            );
        }
        None if !matched.identifier.trim().is_empty() => {
            tracing::warn!(
                entity_id = %entity_id,
                raw = %matched.identifier,
                "Listing identifier is not a valid RUN, discarded"
            );
        }
        None => {}
    }

    if let Some(series) = matched.series.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        facts.insert(
            Field::Series,
            Value::Text(series.to_ascii_uppercase()),
            Confidence::High,
            "listing:series",
        );
    }

    tracing::debug!(
        entity_id = %entity_id,
        fields_found = facts.len(),
        "Listing match normalized"
    );
    facts
}
