//! Normalizers: raw textual captures → typed values.
//!
//! Every function here rejects (returns `None`) rather than guesses when a
//! capture is ambiguous. Rejection is how the no-fabrication rule survives
//! noisy regulatory PDFs: a percentage outside [0, 100] is dropped, never
//! clamped; a number whose separators cannot be read one way is dropped,
//! never coerced.

use crate::record::AssetCategory;

// ═══════════════════════════════════════════
// Text folding
// ═══════════════════════════════════════════

/// Collapse all internal whitespace (including newlines from multi-line
/// captures) to single spaces and trim the ends.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fold Spanish diacritics to ASCII and lowercase, for keyword matching.
pub fn fold_diacritics(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'é' | 'É' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'Ó' => 'o',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'u',
            'ñ' | 'Ñ' => 'n',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

// ═══════════════════════════════════════════
// Numbers
// ═══════════════════════════════════════════

/// Parse a number in Chilean localization: `.` as thousands separator,
/// `,` as decimal separator (`1.234.567,89` → `1234567.89`).
///
/// Plain ASCII numbers (`1234.56`) are also accepted. A string where the
/// separator roles cannot be determined unambiguously is rejected.
pub fn parse_localized_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_start_matches('$').trim();
    if cleaned.is_empty() {
        return None;
    }

    let negative = cleaned.starts_with('-');
    let body = cleaned.trim_start_matches(['-', '+']);
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }

    let dots = body.matches('.').count();
    let commas = body.matches(',').count();

    let normalized = match (dots, commas) {
        // A lone dot with exactly three trailing digits ("1.234") reads
        // equally as a thousands group and as a decimal. Rejected, not
        // guessed.
        (1, 0) => {
            let (int_part, frac_part) = body.split_once('.')?;
            if frac_part.len() == 3 && (1..=3).contains(&int_part.len()) && int_part != "0" {
                return None;
            }
            body.to_string()
        }
        (0, 0) => body.to_string(),
        // Multiple dots, no comma: dots are thousands separators.
        (_, 0) => body.replace('.', ""),
        // Comma present: it is the decimal separator, dots are thousands.
        (_, 1) => body.replace('.', "").replace(',', "."),
        // More than one comma is unreadable.
        _ => return None,
    };

    let value: f64 = normalized.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Parse a percentage string (`"12,5%"`, `"12.5 %"`, `"8.5"`) into a
/// decimal fraction in `[0, 1]`. Values outside `[0, 100]` are rejected.
pub fn parse_percentage(raw: &str) -> Option<f64> {
    let body = raw.trim().trim_end_matches('%').trim();
    let points = parse_localized_number(body)?;
    if !(0.0..=100.0).contains(&points) {
        return None;
    }
    Some(points / 100.0)
}

/// Signed variant for return fields: `[-100, 100]` percent → `[-1, 1]`.
pub fn parse_signed_percentage(raw: &str) -> Option<f64> {
    let body = raw.trim().trim_end_matches('%').trim();
    let points = parse_localized_number(body)?;
    if points.abs() > 100.0 {
        return None;
    }
    Some(points / 100.0)
}

// ═══════════════════════════════════════════
// Domain values
// ═══════════════════════════════════════════

/// Horizon phrase → months. Accepts explicit spans (`"24 meses"`,
/// `"5 años"`) and the three conventional buckets.
pub fn parse_horizon_months(raw: &str) -> Option<u32> {
    let folded = fold_diacritics(raw);
    let words: Vec<&str> = folded.split_whitespace().collect();

    for pair in words.windows(2) {
        if let Ok(n) = pair[0].parse::<u32>() {
            if pair[1].starts_with("mes") {
                return Some(n);
            }
            if pair[1].starts_with("ano") {
                return n.checked_mul(12);
            }
        }
    }

    if folded.contains("corto plazo") {
        Some(12)
    } else if folded.contains("mediano plazo") || folded.contains("medio plazo") {
        Some(24)
    } else if folded.contains("largo plazo") {
        Some(48)
    } else {
        None
    }
}

/// Canonicalize a risk-scale capture to `R1`–`R7`.
pub fn canonical_risk_scale(raw: &str) -> Option<String> {
    let trimmed = raw.trim().to_ascii_uppercase();
    let digit = trimmed.strip_prefix('R').unwrap_or(&trimmed);
    match digit {
        "1" | "2" | "3" | "4" | "5" | "6" | "7" => Some(format!("R{digit}")),
        _ => None,
    }
}

/// Canonicalize a risk-word capture to `Baja`/`Media`/`Alta`.
pub fn canonical_risk_word(raw: &str) -> Option<String> {
    match fold_diacritics(raw.trim()).as_str() {
        "baja" | "bajo" | "conservador" | "conservadora" => Some("Baja".into()),
        "media" | "medio" | "moderada" | "moderado" => Some("Media".into()),
        "alta" | "alto" | "agresiva" | "agresivo" => Some("Alta".into()),
        _ => None,
    }
}

/// Canonicalize a fund-type capture to one of the conventional categories.
pub fn canonical_fund_type(raw: &str) -> Option<String> {
    let folded = fold_diacritics(raw);
    const TYPES: &[(&str, &[&str])] = &[
        ("Conservador", &["conservador", "capital garantizado", "preservacion"]),
        ("Agresivo", &["agresivo", "accionario", "crecimiento", "growth"]),
        ("Balanceado", &["balanceado", "mixto", "moderado", "balanced"]),
        ("Dinámico", &["dinamico", "flexible"]),
        ("Liquidez", &["liquidez", "monetario", "money market", "disponible"]),
    ];
    for (label, keywords) in TYPES {
        if keywords.iter().any(|k| folded.contains(k)) {
            return Some((*label).to_string());
        }
    }
    None
}

/// Normalize a RUN identifier: strip thousands dots, uppercase the check
/// digit (`"10.446-9"` → `"10446-9"`).
pub fn normalize_run(raw: &str) -> Option<String> {
    let cleaned = raw.trim().replace('.', "").to_ascii_uppercase();
    let (digits, check) = cleaned.split_once('-')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if check.len() != 1 || !check.chars().all(|c| c.is_ascii_digit() || c == 'K') {
        return None;
    }
    Some(format!("{digits}-{check}"))
}

/// Classify a composition-row asset name into a category by ordered
/// keyword matching over the diacritic-folded name.
pub fn classify_asset(name: &str) -> AssetCategory {
    let folded = fold_diacritics(name);
    const CATEGORIES: &[(AssetCategory, &[&str])] = &[
        (
            AssetCategory::GovernmentFixedIncome,
            &["tesoreria", "gobierno", "bcp", "btu", "banco central"],
        ),
        (
            AssetCategory::CorporateFixedIncome,
            &["corporativo", "bonos", "pagares", "depositos"],
        ),
        (
            AssetCategory::InternationalEquity,
            &["internacional", "extranjero", "eeuu", "usa"],
        ),
        (AssetCategory::LocalEquity, &["acciones", "equity", "chilenas"]),
        (AssetCategory::MutualFunds, &["fondo mutuo", "mutual fund", "cuotas de fondos"]),
        (AssetCategory::Derivatives, &["derivados", "forwards", "opciones"]),
        (AssetCategory::Cash, &["efectivo", "cash", "caja", "disponible"]),
    ];
    for (category, keywords) in CATEGORIES {
        if keywords.iter().any(|k| folded.contains(k)) {
            return *category;
        }
    }
    AssetCategory::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── localized numbers ────────────────────────────────

    #[test]
    fn chilean_thousands_and_decimal() {
        assert_eq!(parse_localized_number("1.234.567,89"), Some(1234567.89));
    }

    #[test]
    fn plain_ascii_number() {
        assert_eq!(parse_localized_number("1234.56"), Some(1234.56));
    }

    #[test]
    fn comma_decimal_only() {
        assert_eq!(parse_localized_number("0,65"), Some(0.65));
    }

    #[test]
    fn dotted_millions_without_comma() {
        assert_eq!(parse_localized_number("806.202.087"), Some(806_202_087.0));
    }

    #[test]
    fn leading_currency_sign_stripped() {
        assert_eq!(parse_localized_number("$806.202.087"), Some(806_202_087.0));
    }

    #[test]
    fn negative_number_keeps_sign() {
        assert_eq!(parse_localized_number("-2,5"), Some(-2.5));
    }

    #[test]
    fn two_commas_rejected() {
        assert_eq!(parse_localized_number("1,2,3"), None);
    }

    #[test]
    fn lone_dot_with_three_trailing_digits_is_ambiguous() {
        // Thousands group or decimal? Unreadable either way.
        assert_eq!(parse_localized_number("1.234"), None);
        assert_eq!(parse_localized_number("806.202"), None);
        // Unambiguous neighbors still parse.
        assert_eq!(parse_localized_number("8.5"), Some(8.5));
        assert_eq!(parse_localized_number("0.234"), Some(0.234));
        assert_eq!(parse_localized_number("1234.567"), Some(1234.567));
        assert_eq!(parse_localized_number("1.234,5"), Some(1234.5));
    }

    #[test]
    fn letters_rejected() {
        assert_eq!(parse_localized_number("12a"), None);
        assert_eq!(parse_localized_number(""), None);
    }

    // ── percentages ──────────────────────────────────────

    #[test]
    fn comma_percentage_to_fraction() {
        assert_eq!(parse_percentage("12,5%"), Some(0.125));
    }

    #[test]
    fn spaced_dot_percentage_to_fraction() {
        assert_eq!(parse_percentage("12.5 %"), Some(0.125));
    }

    #[test]
    fn out_of_range_percentage_rejected_not_clamped() {
        assert_eq!(parse_percentage("150%"), None);
        assert_eq!(parse_percentage("-1%"), None);
    }

    #[test]
    fn signed_percentage_allows_negatives() {
        assert_eq!(parse_signed_percentage("-8,5%"), Some(-0.085));
        assert_eq!(parse_signed_percentage("8.5"), Some(0.085));
        assert_eq!(parse_signed_percentage("-150%"), None);
    }

    // ── horizons ─────────────────────────────────────────

    #[test]
    fn explicit_months() {
        assert_eq!(parse_horizon_months("24 meses"), Some(24));
    }

    #[test]
    fn years_converted_to_months() {
        assert_eq!(parse_horizon_months("5 años"), Some(60));
    }

    #[test]
    fn bucket_phrases() {
        assert_eq!(parse_horizon_months("corto plazo"), Some(12));
        assert_eq!(parse_horizon_months("mediano plazo"), Some(24));
        assert_eq!(parse_horizon_months("Largo Plazo"), Some(48));
    }

    #[test]
    fn no_horizon_in_text() {
        assert_eq!(parse_horizon_months("sin datos"), None);
    }

    // ── risk and identity ────────────────────────────────

    #[test]
    fn risk_scale_canonicalized() {
        assert_eq!(canonical_risk_scale("R3").as_deref(), Some("R3"));
        assert_eq!(canonical_risk_scale("5").as_deref(), Some("R5"));
        assert_eq!(canonical_risk_scale("R9"), None);
    }

    #[test]
    fn risk_word_canonicalized() {
        assert_eq!(canonical_risk_word("Media").as_deref(), Some("Media"));
        assert_eq!(canonical_risk_word("bajo").as_deref(), Some("Baja"));
        assert_eq!(canonical_risk_word("AGRESIVO").as_deref(), Some("Alta"));
        assert_eq!(canonical_risk_word("extrema"), None);
    }

    #[test]
    fn fund_type_by_keyword() {
        assert_eq!(
            canonical_fund_type("fondo monetario de liquidez").as_deref(),
            Some("Liquidez")
        );
        assert_eq!(canonical_fund_type("sin categoría conocida"), None);
    }

    #[test]
    fn run_normalization_strips_dots() {
        assert_eq!(normalize_run("10.446-9").as_deref(), Some("10446-9"));
        assert_eq!(normalize_run("9118-k").as_deref(), Some("9118-K"));
        assert_eq!(normalize_run("no-run"), None);
        assert_eq!(normalize_run("10446"), None);
    }

    // ── asset classification ─────────────────────────────

    #[test]
    fn classify_by_keyword_folds_diacritics() {
        assert_eq!(classify_asset("Pagarés"), AssetCategory::CorporateFixedIncome);
        assert_eq!(
            classify_asset("Bonos Tesorería"),
            AssetCategory::GovernmentFixedIncome
        );
        assert_eq!(classify_asset("Acciones Chilenas"), AssetCategory::LocalEquity);
        assert_eq!(
            classify_asset("Renta Internacional"),
            AssetCategory::InternationalEquity
        );
        assert_eq!(classify_asset("Algo Desconocido"), AssetCategory::Other);
    }

    #[test]
    fn collapse_whitespace_joins_lines() {
        assert_eq!(
            collapse_whitespace("Fondo  Mutuo\n   Seguridad"),
            "Fondo Mutuo Seguridad"
        );
    }
}
