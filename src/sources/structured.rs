//! Structured-API adapter: raw JSON response → `PartialFactSet`.
//!
//! Tolerant of the wire's Spanish field names and of numbers that arrive
//! as strings (`"8.5%"`). Percentage-shaped fields are normalized to
//! decimal fractions with the same normalizers the pattern library uses;
//! a value the normalizer rejects is absent, never guessed at.

use serde::Deserialize;

use crate::patterns::normalize;
use crate::record::{Confidence, PartialFactSet, Source, Value};
use crate::schema::{value_in_sane_range, Field};

/// A numeric wire field that may arrive as a number or as text
/// (`8.5`, `"8,5"`, `"8.5%"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    /// As a signed decimal fraction. Bare numbers are percent points, as
    /// the upstream reports them.
    fn as_fraction(&self) -> Option<f64> {
        match self {
            Self::Number(points) => {
                if points.abs() > 100.0 {
                    None
                } else {
                    Some(points / 100.0)
                }
            }
            Self::Text(raw) => normalize::parse_signed_percentage(raw),
        }
    }

    fn as_amount(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(raw) => normalize::parse_localized_number(raw),
        }
    }
}

/// Canonical decode of the structured response, with aliases for the
/// Spanish wire names.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StructuredResponse {
    #[serde(alias = "nombre")]
    name: Option<String>,
    #[serde(alias = "run")]
    identifier: Option<String>,
    #[serde(alias = "serie")]
    series: Option<String>,
    #[serde(alias = "categoria", alias = "category")]
    fund_type: Option<String>,
    #[serde(alias = "moneda", alias = "currency")]
    currency: Option<String>,
    #[serde(alias = "rentabilidad_12m")]
    return_12m: Option<NumberOrText>,
    #[serde(alias = "rentabilidad_24m")]
    return_24m: Option<NumberOrText>,
    #[serde(alias = "rentabilidad_36m")]
    return_36m: Option<NumberOrText>,
    #[serde(alias = "comision_administracion", alias = "fixed_management_fee")]
    management_fee: Option<NumberOrText>,
    #[serde(alias = "comision_rescate", alias = "redemption_fee")]
    redemption_fee: Option<NumberOrText>,
    #[serde(alias = "patrimonio_neto", alias = "total_net_assets")]
    net_assets: Option<NumberOrText>,
    #[serde(alias = "valor_cuota", alias = "price")]
    share_value: Option<NumberOrText>,
}

/// Normalize one raw structured-API response into a `PartialFactSet`.
///
/// Pure: the response has already been fetched by the collaborator. A
/// response that does not decode at all yields an empty (not failed) set,
/// logged at warn — the source responded, it just said nothing usable.
pub fn normalize_structured(entity_id: &str, raw: &serde_json::Value) -> PartialFactSet {
    let mut facts = PartialFactSet::new(Source::StructuredApi);

    // Serde would decode a JSON array positionally into the struct's
    // fields, turning garbage into facts. Only key-value objects qualify.
    if !raw.is_object() {
        tracing::warn!(
            entity_id = %entity_id,
            "Structured response is not a JSON object, treating as empty"
        );
        return facts;
    }

    let response: StructuredResponse = match serde_json::from_value(raw.clone()) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(
                entity_id = %entity_id,
                error = %e,
                "Structured response did not decode, treating as empty"
            );
            return facts;
        }
    };

    if let Some(name) = nonempty(response.name) {
        facts.insert(Field::Name, Value::Text(name), Confidence::High, "api:name");
    }
    if let Some(run) = response.identifier.as_deref().and_then(normalize::normalize_run) {
        facts.insert(
            Field::Identifier,
            Value::Text(run),
            Confidence::High,
            "api:run",
        );
    }
    if let Some(series) = nonempty(response.series) {
        facts.insert(
            Field::Series,
            Value::Text(series.to_ascii_uppercase()),
            Confidence::High,
            "api:series",
        );
    }
    if let Some(fund_type) = response.fund_type.as_deref().and_then(normalize::canonical_fund_type)
    {
        facts.insert(
            Field::FundType,
            Value::Text(fund_type),
            Confidence::Medium,
            "api:category",
        );
    }
    if let Some(currency) = nonempty(response.currency) {
        facts.insert(
            Field::Currency,
            Value::Text(currency.to_ascii_uppercase()),
            Confidence::High,
            "api:currency",
        );
    }

    insert_fraction(entity_id, &mut facts, Field::Return12m, response.return_12m, "api:return_12m");
    insert_fraction(entity_id, &mut facts, Field::Return24m, response.return_24m, "api:return_24m");
    insert_fraction(entity_id, &mut facts, Field::Return36m, response.return_36m, "api:return_36m");
    insert_fraction(
        entity_id,
        &mut facts,
        Field::ManagementFee,
        response.management_fee,
        "api:management_fee",
    );
    insert_fraction(
        entity_id,
        &mut facts,
        Field::RedemptionFee,
        response.redemption_fee,
        "api:redemption_fee",
    );
    insert_amount(entity_id, &mut facts, Field::NetAssets, response.net_assets, "api:net_assets");
    insert_amount(entity_id, &mut facts, Field::ShareValue, response.share_value, "api:share_value");

    tracing::debug!(
        entity_id = %entity_id,
        fields_found = facts.len(),
        "Structured response normalized"
    );
    facts
}

fn nonempty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn insert_fraction(
    entity_id: &str,
    facts: &mut PartialFactSet,
    field: Field,
    raw: Option<NumberOrText>,
    rule: &str,
) {
    let Some(raw) = raw else { return };
    let Some(fraction) = raw.as_fraction() else {
        tracing::warn!(
            entity_id = %entity_id,
            field = %field,
            raw = ?raw,
            "Percentage field rejected by normalizer"
        );
        return;
    };
    let value = Value::Fraction(fraction);
    if !value_in_sane_range(field, &value) {
        tracing::warn!(
            entity_id = %entity_id,
            field = %field,
            fraction,
            "Value outside sane range, discarded"
        );
        return;
    }
    facts.insert(field, value, Confidence::High, rule);
}

fn insert_amount(
    entity_id: &str,
    facts: &mut PartialFactSet,
    field: Field,
    raw: Option<NumberOrText>,
    rule: &str,
) {
    let Some(raw) = raw else { return };
    let Some(amount) = raw.as_amount() else {
        tracing::warn!(
            entity_id = %entity_id,
            field = %field,
            raw = ?raw,
            "Numeric field rejected by normalizer"
        );
        return;
    };
    let value = Value::Number(amount);
    if !value_in_sane_range(field, &value) {
        tracing::warn!(
            entity_id = %entity_id,
            field = %field,
            amount,
            "Value outside sane range, discarded"
        );
        return;
    }
    facts.insert(field, value, Confidence::High, rule);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spanish_wire_names_and_percent_strings() {
        let raw = json!({
            "nombre": "Fund X",
            "run": "10.446-9",
            "rentabilidad_12m": "8.5%",
            "comision_administracion": "1,19%",
        });
        let facts = normalize_structured("f-1", &raw);

        assert_eq!(
            facts.get(Field::Name).unwrap().value,
            Value::Text("Fund X".into())
        );
        assert_eq!(
            facts.get(Field::Identifier).unwrap().value,
            Value::Text("10446-9".into())
        );
        match facts.get(Field::Return12m).unwrap().value {
            Value::Fraction(f) => assert!((f - 0.085).abs() < 1e-9),
            ref other => panic!("expected fraction, got {other:?}"),
        }
        match facts.get(Field::ManagementFee).unwrap().value {
            Value::Fraction(f) => assert!((f - 0.0119).abs() < 1e-9),
            ref other => panic!("expected fraction, got {other:?}"),
        }
    }

    #[test]
    fn bare_numbers_are_percent_points() {
        let raw = json!({ "rentabilidad_12m": 8.5 });
        let facts = normalize_structured("f-1", &raw);
        match facts.get(Field::Return12m).unwrap().value {
            Value::Fraction(f) => assert!((f - 0.085).abs() < 1e-9),
            ref other => panic!("expected fraction, got {other:?}"),
        }
    }

    #[test]
    fn english_aliases_from_series_layer() {
        let raw = json!({
            "name": "Fund X",
            "fixed_management_fee": 1.19,
            "total_net_assets": 806202087.0,
            "price": "1.523,45",
        });
        let facts = normalize_structured("f-1", &raw);
        assert!(facts.contains(Field::ManagementFee));
        assert_eq!(
            facts.get(Field::NetAssets).unwrap().value,
            Value::Number(806_202_087.0)
        );
        assert_eq!(
            facts.get(Field::ShareValue).unwrap().value,
            Value::Number(1523.45)
        );
    }

    #[test]
    fn out_of_range_percentage_absent_not_clamped() {
        let raw = json!({ "rentabilidad_12m": "150%" });
        let facts = normalize_structured("f-1", &raw);
        assert!(!facts.contains(Field::Return12m));
    }

    #[test]
    fn empty_strings_are_absent() {
        let raw = json!({ "nombre": "  ", "moneda": "" });
        let facts = normalize_structured("f-1", &raw);
        assert!(facts.is_empty());
    }

    #[test]
    fn undecodable_response_is_empty_not_failed() {
        let raw = json!(["not", "an", "object"]);
        let facts = normalize_structured("f-1", &raw);
        assert!(facts.is_empty());
        assert!(!facts.is_failed());
    }

    #[test]
    fn non_object_responses_fabricate_no_facts() {
        // An array would otherwise decode positionally into the struct.
        for raw in [
            json!(["Fondo Fantasma", "10.446-9", "A"]),
            json!("texto suelto"),
            json!(42),
            json!(null),
        ] {
            let facts = normalize_structured("f-1", &raw);
            assert!(facts.is_empty(), "fabricated facts from {raw}");
            assert!(!facts.is_failed());
        }
    }

    #[test]
    fn facts_are_stamped_structured_api() {
        let raw = json!({ "nombre": "Fund X" });
        let facts = normalize_structured("f-1", &raw);
        assert_eq!(facts.get(Field::Name).unwrap().source, Source::StructuredApi);
        assert_eq!(facts.get(Field::Name).unwrap().matched_rule, "api:name");
    }
}
