//! First-match-wins extraction over the pattern library.

use crate::config::PipelineConfig;
use crate::patterns::patterns_for;
use crate::record::{Confidence, FactWarning, PartialFactSet, Source, Value};
use crate::schema::{value_in_sane_range, Field};

use super::composition::extract_composition;
use super::ExtractError;

/// Applies the pattern library to raw document text.
///
/// Pure and synchronous: no I/O, no shared state. For each field the
/// matcher chain is walked in order and the first successful
/// match-and-normalize wins — a field extracted once is never re-derived
/// by a later, looser matcher in the same pass.
pub struct DocumentExtractor {
    min_document_len: usize,
    composition_sum_tolerance: f64,
}

impl DocumentExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_document_len: config.min_document_len,
            composition_sum_tolerance: config.composition_sum_tolerance,
        }
    }

    /// Extract a document-sourced `PartialFactSet` from `text`.
    ///
    /// Returns `DocumentUnusable` only when the input itself is
    /// structurally unusable (shorter than the configured minimum after
    /// trimming). A field that matches nothing is simply absent.
    pub fn extract(&self, entity_id: &str, text: &str) -> Result<PartialFactSet, ExtractError> {
        let trimmed_len = text.trim().len();
        if trimmed_len < self.min_document_len {
            return Err(ExtractError::DocumentUnusable {
                length: trimmed_len,
                minimum: self.min_document_len,
            });
        }

        let mut facts = PartialFactSet::new(Source::Document);

        for field in Field::all() {
            if *field == Field::Composition {
                continue;
            }
            self.extract_scalar(entity_id, *field, text, &mut facts);
        }

        self.extract_table(entity_id, text, &mut facts);

        tracing::info!(
            entity_id = %entity_id,
            fields_found = facts.len(),
            chars = text.len(),
            "Document extraction finished"
        );

        Ok(facts)
    }

    /// Walk one field's matcher chain; first match-and-normalize wins.
    fn extract_scalar(
        &self,
        entity_id: &str,
        field: Field,
        text: &str,
        facts: &mut PartialFactSet,
    ) {
        for pattern in patterns_for(field) {
            let Some(caps) = pattern.regex.captures(text) else {
                continue;
            };
            let raw = caps.get(1).map(|m| m.as_str()).unwrap_or(&caps[0]);
            // Multi-line captures become single-spaced before normalization.
            let folded = crate::patterns::normalize::collapse_whitespace(raw);

            let Some(value) = (pattern.normalize)(&folded) else {
                // Normalizer rejected the candidate as ambiguous/invalid.
                tracing::warn!(
                    entity_id = %entity_id,
                    field = %field,
                    rule = pattern.label,
                    raw = %folded,
                    "Candidate rejected by normalizer"
                );
                continue;
            };

            if !value_in_sane_range(field, &value) {
                tracing::warn!(
                    entity_id = %entity_id,
                    field = %field,
                    rule = pattern.label,
                    raw = %folded,
                    "Candidate outside sane range, discarded"
                );
                continue;
            }

            facts.insert(field, value, pattern.confidence, pattern.label);
            return;
        }

        // Expected, frequent case: the document just doesn't state it.
        tracing::debug!(entity_id = %entity_id, field = %field, "Field not found in document");
    }

    fn extract_table(&self, entity_id: &str, text: &str, facts: &mut PartialFactSet) {
        let Some(extract) = extract_composition(text) else {
            tracing::debug!(entity_id = %entity_id, field = %Field::Composition, "Field not found in document");
            return;
        };

        if extract.sum_off(self.composition_sum_tolerance) {
            tracing::warn!(
                entity_id = %entity_id,
                total = extract.total,
                "Composition percentages do not sum to 100, flagging"
            );
            facts.warnings.push(FactWarning::CompositionSumOff {
                total: extract.total,
            });
        }

        let confidence = if extract.in_section {
            Confidence::High
        } else {
            Confidence::Low
        };
        facts.insert(
            Field::Composition,
            Value::Composition(extract.rows),
            confidence,
            "doc:composition_table",
        );
    }
}
