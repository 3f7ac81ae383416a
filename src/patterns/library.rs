//! Declarative per-field pattern tables.
//!
//! Each extractable field owns an ordered list of `(matcher, normalizer,
//! confidence)` entries, most-specific-first. The extractor walks a
//! field's list with early exit; the list itself is data, testable in
//! isolation from the walk. A matcher never consults any field but its own.

use std::sync::LazyLock;

use regex::Regex;

use super::normalize;
use crate::record::{Confidence, Value};
use crate::schema::Field;

/// One pattern variant: a matcher, the normalizer for its capture, and
/// the confidence tier a match at this position carries.
pub struct FieldPattern {
    /// Stable identifier recorded as the fact's `matched_rule`.
    pub label: &'static str,
    pub regex: Regex,
    pub normalize: fn(&str) -> Option<Value>,
    pub confidence: Confidence,
}

impl FieldPattern {
    fn new(
        label: &'static str,
        pattern: &str,
        normalize: fn(&str) -> Option<Value>,
        confidence: Confidence,
    ) -> Self {
        Self {
            label,
            regex: Regex::new(pattern).unwrap(),
            normalize,
            confidence,
        }
    }
}

// ── normalizer adapters (fn pointers, capture-free) ──

fn text(raw: &str) -> Option<Value> {
    let cleaned = normalize::collapse_whitespace(raw);
    if cleaned.len() < 2 {
        return None;
    }
    Some(Value::Text(cleaned))
}

fn upper_text(raw: &str) -> Option<Value> {
    let cleaned = normalize::collapse_whitespace(raw).to_ascii_uppercase();
    if cleaned.is_empty() {
        return None;
    }
    Some(Value::Text(cleaned))
}

fn percentage(raw: &str) -> Option<Value> {
    normalize::parse_percentage(raw).map(Value::Fraction)
}

fn signed_percentage(raw: &str) -> Option<Value> {
    normalize::parse_signed_percentage(raw).map(Value::Fraction)
}

fn positive_amount(raw: &str) -> Option<Value> {
    let n = normalize::parse_localized_number(raw)?;
    if n <= 0.0 {
        return None;
    }
    Some(Value::Number(n))
}

fn horizon(raw: &str) -> Option<Value> {
    normalize::parse_horizon_months(raw).map(Value::Months)
}

fn risk_scale(raw: &str) -> Option<Value> {
    normalize::canonical_risk_scale(raw).map(Value::Text)
}

fn risk_word(raw: &str) -> Option<Value> {
    normalize::canonical_risk_word(raw).map(Value::Text)
}

fn fund_type(raw: &str) -> Option<Value> {
    normalize::canonical_fund_type(raw).map(Value::Text)
}

fn run(raw: &str) -> Option<Value> {
    normalize::normalize_run(raw).map(Value::Text)
}

// ═══════════════════════════════════════════
// Tables
// ═══════════════════════════════════════════

/// The full library, compiled once. Spanish pattern text matches the
/// regulatory fund fact sheets (Folleto Informativo) these documents are.
static LIBRARY: LazyLock<Vec<(Field, Vec<FieldPattern>)>> = LazyLock::new(|| {
    vec![
        (
            Field::Name,
            vec![
                // "Fondo Mutuo Security Plus" as a labelled heading
                FieldPattern::new(
                    "doc:name_heading",
                    r"(?im)^\s*fondo\s+mutuo\s+([A-ZÁÉÍÓÚÑ][^\n]{3,80})$",
                    text,
                    Confidence::Medium,
                ),
                FieldPattern::new(
                    "doc:name_inline",
                    r"(?i)fondo\s+mutuo\s+([A-ZÁÉÍÓÚÑ][\w\sÁÉÍÓÚÑáéíóúñ.-]{3,60})",
                    text,
                    Confidence::Low,
                ),
            ],
        ),
        (
            Field::Identifier,
            vec![
                // "RUN: 10.446-9"
                FieldPattern::new(
                    "doc:run_labelled",
                    r"(?i)\bRUN\s*[:\s]\s*([\d.]{3,11}-[\dkK])\b",
                    run,
                    Confidence::High,
                ),
                FieldPattern::new(
                    "doc:run_bare",
                    r"\b(\d{3,5}(?:\.\d{3})?-[\dkK])\b",
                    run,
                    Confidence::Low,
                ),
            ],
        ),
        (
            Field::FundType,
            vec![
                FieldPattern::new(
                    "doc:fund_type_labelled",
                    r"(?i)tipo\s+de\s+fondo\s*:?\s*([^\n]{3,60})",
                    fund_type,
                    Confidence::High,
                ),
                // Catch-all keyword scan over the whole document
                FieldPattern::new(
                    "doc:fund_type_keyword",
                    r"(?i)\b(conservador|agresivo|balanceado|accionario|din[aá]mico|monetario|liquidez)\b",
                    fund_type,
                    Confidence::Low,
                ),
            ],
        ),
        (
            Field::RiskProfile,
            vec![
                // "Perfil de Riesgo: R3"
                FieldPattern::new(
                    "doc:risk_profile_labelled",
                    r"(?i)perfil\s+de\s+riesgo[^\nR]{0,40}\b(R[1-7])\b",
                    risk_scale,
                    Confidence::High,
                ),
                // Bare scale mention anywhere (common in Chilean fact sheets)
                FieldPattern::new(
                    "doc:risk_scale_bare",
                    r"\b(R[1-7])\b",
                    risk_scale,
                    Confidence::Medium,
                ),
            ],
        ),
        (
            Field::RiskTolerance,
            vec![
                // "Tolerancia al riesgo: Media"
                FieldPattern::new(
                    "doc:risk_tolerance_labelled",
                    r"(?i)tolerancia\s+al\s+riesgo\s*:?\s*(\w+)",
                    risk_word,
                    Confidence::High,
                ),
                FieldPattern::new(
                    "doc:risk_word",
                    r"(?i)riesgo\s+(bajo|medio|moderado|alto)\b",
                    risk_word,
                    Confidence::Medium,
                ),
                FieldPattern::new(
                    "doc:risk_word_inverted",
                    r"(?i)\b(bajo|alto)\s+riesgo\b",
                    risk_word,
                    Confidence::Low,
                ),
            ],
        ),
        (
            Field::InvestmentHorizon,
            vec![
                // "Horizonte de inversión: 24 meses" / "... 5 años"
                FieldPattern::new(
                    "doc:horizon_labelled",
                    r"(?i)horizonte\s+de\s+inversi[oó]n\s*:?\s*([^\n]{2,60})",
                    horizon,
                    Confidence::High,
                ),
                FieldPattern::new(
                    "doc:horizon_line",
                    r"(?i)horizonte([^\n]{2,60})",
                    horizon,
                    Confidence::Medium,
                ),
                FieldPattern::new(
                    "doc:horizon_bucket",
                    r"(?i)\b((?:corto|mediano|medio|largo)\s+plazo)\b",
                    horizon,
                    Confidence::Low,
                ),
            ],
        ),
        (
            Field::ManagementFee,
            vec![
                // "Comisión de administración: 0,65%"
                FieldPattern::new(
                    "doc:mgmt_fee_labelled",
                    r"(?i)comisi[oó]n\s+de\s+administraci[oó]n[^\n\d]{0,30}(\d+[.,]\d+)\s*%",
                    percentage,
                    Confidence::High,
                ),
                // "Remun. Anual Máx. (%) 0,6500"
                FieldPattern::new(
                    "doc:mgmt_fee_remun",
                    r"(?i)remun\S*\s+anual[^\n\d]{0,30}(\d+[.,]\d+)",
                    percentage,
                    Confidence::Medium,
                ),
                // "TAC Serie 0,50%"
                FieldPattern::new(
                    "doc:mgmt_fee_tac",
                    r"(?i)TAC\s+serie[^\n\d]{0,20}(\d+[.,]\d+)",
                    percentage,
                    Confidence::Medium,
                ),
            ],
        ),
        (
            Field::RedemptionFee,
            vec![
                FieldPattern::new(
                    "doc:redemption_fee_labelled",
                    r"(?i)comisi[oó]n\s+(?:m[aá]xima\s+)?de\s+rescate[^\n\d]{0,30}(\d+[.,]\d+)\s*%?",
                    percentage,
                    Confidence::High,
                ),
                FieldPattern::new(
                    "doc:redemption_fee_maxima",
                    r"(?i)comisi[oó]n\s+m[aá]xima[^\n\d]{0,30}(\d+[.,]\d+)",
                    percentage,
                    Confidence::Medium,
                ),
            ],
        ),
        (
            Field::Return12m,
            vec![
                // "1 Año 0,48%" in the annualized-returns table
                FieldPattern::new(
                    "doc:return_12m_table",
                    r"(?i)\b1\s+año\s+(-?\d+[.,]?\d*)\s*%",
                    signed_percentage,
                    Confidence::High,
                ),
                FieldPattern::new(
                    "doc:return_12m_labelled",
                    r"(?i)rentabilidad[^\n]{0,40}12\s*m(?:eses)?[^\n\d-]{0,20}(-?\d+[.,]?\d*)\s*%",
                    signed_percentage,
                    Confidence::Medium,
                ),
            ],
        ),
        (
            Field::Return24m,
            vec![FieldPattern::new(
                "doc:return_24m_table",
                r"(?i)\b2\s+años?\s+(-?\d+[.,]?\d*)\s*%",
                signed_percentage,
                Confidence::High,
            )],
        ),
        (
            Field::Return36m,
            vec![FieldPattern::new(
                "doc:return_36m_table",
                r"(?i)\b3\s+años?\s+(-?\d+[.,]?\d*)\s*%",
                signed_percentage,
                Confidence::High,
            )],
        ),
        (
            Field::NetAssets,
            vec![
                // "Patrimonio Serie $806.202.087" / "Patrimonio total USD 1.246.638"
                FieldPattern::new(
                    "doc:net_assets_labelled",
                    r"(?i)patrimonio\s+(?:serie|total|neto)[^\n\d]{0,20}([\d.,]{4,})",
                    positive_amount,
                    Confidence::High,
                ),
                FieldPattern::new(
                    "doc:net_assets_line",
                    r"(?i)patrimonio[^\n\d]{0,30}([\d.,]{7,})",
                    positive_amount,
                    Confidence::Low,
                ),
            ],
        ),
        (
            Field::Currency,
            vec![FieldPattern::new(
                "doc:currency_near_assets",
                r"(?i)patrimonio[^\n]{0,40}\b(CLP|USD|EUR|UF)\b",
                upper_text,
                Confidence::High,
            )],
        ),
        (
            Field::ShareValue,
            vec![FieldPattern::new(
                "doc:share_value_labelled",
                r"(?i)valor\s+cuota[^\n\d]{0,20}\$?\s*([\d.,]+)",
                positive_amount,
                Confidence::High,
            )],
        ),
        (
            Field::Series,
            vec![FieldPattern::new(
                "doc:series_labelled",
                r"(?i)\bserie\s*:\s*([A-Z0-9]{1,10})\b",
                upper_text,
                Confidence::Medium,
            )],
        ),
        // Composition is table-accumulating, handled by extract::composition,
        // not by a single-capture pattern chain.
        (Field::Composition, vec![]),
    ]
});

/// Ordered pattern variants for a field, most-specific-first.
pub fn patterns_for(field: Field) -> &'static [FieldPattern] {
    LIBRARY
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, patterns)| patterns.as_slice())
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_match(field: Field, text_input: &str) -> Option<(Value, &'static str)> {
        for pattern in patterns_for(field) {
            if let Some(caps) = pattern.regex.captures(text_input) {
                let raw = caps.get(1).map(|m| m.as_str()).unwrap_or(&caps[0]);
                if let Some(value) = (pattern.normalize)(raw) {
                    return Some((value, pattern.label));
                }
            }
        }
        None
    }

    #[test]
    fn every_scalar_field_has_patterns() {
        for field in Field::all() {
            if *field == Field::Composition {
                continue;
            }
            assert!(!patterns_for(*field).is_empty(), "{field} has no patterns");
        }
    }

    #[test]
    fn confidence_is_non_increasing_within_each_chain() {
        fn rank(c: Confidence) -> u8 {
            match c {
                Confidence::High => 0,
                Confidence::Medium => 1,
                Confidence::Low => 2,
            }
        }
        for field in Field::all() {
            let chain = patterns_for(*field);
            for pair in chain.windows(2) {
                assert!(
                    rank(pair[0].confidence) <= rank(pair[1].confidence),
                    "{field}: {} outranks {}",
                    pair[1].label,
                    pair[0].label
                );
            }
        }
    }

    #[test]
    fn risk_profile_labelled_beats_bare_scale() {
        let (value, label) = first_match(Field::RiskProfile, "Perfil de Riesgo: R3").unwrap();
        assert_eq!(value, Value::Text("R3".into()));
        assert_eq!(label, "doc:risk_profile_labelled");
    }

    #[test]
    fn bare_scale_still_matches_as_fallback() {
        let (value, label) = first_match(Field::RiskProfile, "categoría R5 según normativa").unwrap();
        assert_eq!(value, Value::Text("R5".into()));
        assert_eq!(label, "doc:risk_scale_bare");
    }

    #[test]
    fn risk_tolerance_labelled() {
        let (value, _) = first_match(Field::RiskTolerance, "Tolerancia al riesgo: Media").unwrap();
        assert_eq!(value, Value::Text("Media".into()));
    }

    #[test]
    fn management_fee_from_remun_line() {
        let (value, label) =
            first_match(Field::ManagementFee, "Remun. Anual Máx. (%) 0,6500").unwrap();
        assert_eq!(label, "doc:mgmt_fee_remun");
        match value {
            Value::Fraction(f) => assert!((f - 0.0065).abs() < 1e-9, "got {f}"),
            other => panic!("expected fraction, got {other:?}"),
        }
    }

    #[test]
    fn return_table_row_with_comma_decimal() {
        let (value, _) = first_match(Field::Return12m, "Rentabilidades Anualizadas\n1 Año 8,5%").unwrap();
        match value {
            Value::Fraction(f) => assert!((f - 0.085).abs() < 1e-9),
            other => panic!("expected fraction, got {other:?}"),
        }
    }

    #[test]
    fn negative_return_accepted() {
        let (value, _) = first_match(Field::Return12m, "1 Año -2,31%").unwrap();
        match value {
            Value::Fraction(f) => assert!((f + 0.0231).abs() < 1e-9),
            other => panic!("expected fraction, got {other:?}"),
        }
    }

    #[test]
    fn net_assets_with_dotted_thousands() {
        let (value, _) = first_match(Field::NetAssets, "Patrimonio Serie $806.202.087").unwrap();
        assert_eq!(value, Value::Number(806_202_087.0));
    }

    #[test]
    fn currency_near_patrimonio() {
        let (value, _) = first_match(Field::Currency, "Patrimonio total USD 1.246.638.652").unwrap();
        assert_eq!(value, Value::Text("USD".into()));
    }

    #[test]
    fn horizon_labelled_with_years() {
        let (value, _) =
            first_match(Field::InvestmentHorizon, "Horizonte de inversión: 5 años").unwrap();
        assert_eq!(value, Value::Months(60));
    }

    #[test]
    fn run_with_dots_normalized() {
        let (value, _) = first_match(Field::Identifier, "RUN: 10.446-9").unwrap();
        assert_eq!(value, Value::Text("10446-9".into()));
    }

    #[test]
    fn unmatched_text_yields_nothing() {
        assert!(first_match(Field::RiskProfile, "documento sin datos relevantes").is_none());
    }
}
