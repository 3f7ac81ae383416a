//! Composition-table accumulation.
//!
//! Unlike the scalar fields, the portfolio composition collects ALL row
//! matches, not the first one. Rows are classified by keyword, and the
//! sum of row percentages is checked against 100% — a deviation beyond
//! the configured tolerance is a flag on the result, never a rejection.

use std::sync::LazyLock;

use regex::Regex;

use crate::patterns::normalize::{classify_asset, fold_diacritics, parse_localized_number};
use crate::record::CompositionRow;

/// Header that opens the composition section of a fact sheet.
static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[^\n]*(?:composici[oó]n|cartera\s+de\s+inversi|portafolio)[^\n]*$").unwrap()
});

/// One table row: "Pagarés 77,25%". Anchored per line so prose with an
/// inline percentage does not read as a row.
static ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*([A-Za-zÁÉÍÓÚÑáéíóúñ][A-Za-zÁÉÍÓÚÑáéíóúñ .()\-]{2,60}?)\s+(\d{1,3}(?:[.,]\d+)?)\s*%\s*$")
        .unwrap()
});

/// Result of scanning a document for its composition table.
#[derive(Debug, Clone)]
pub struct CompositionExtract {
    /// All accepted rows, sorted by percentage descending.
    pub rows: Vec<CompositionRow>,
    /// Sum of row percentages, in percent points.
    pub total: f64,
    /// Whether the rows were found under a recognized section header.
    pub in_section: bool,
}

impl CompositionExtract {
    /// Whether `total` deviates from 100 by more than `tolerance` points.
    pub fn sum_off(&self, tolerance: f64) -> bool {
        (self.total - 100.0).abs() > tolerance
    }
}

/// Scan `text` for composition rows. Returns `None` when no row matched.
///
/// Rows inside a recognized section are preferred; when the document has
/// no such header the whole text is scanned as a fallback. Rows whose
/// name reduces to "total" (the table's footer) are excluded from both
/// the list and the sum.
pub fn extract_composition(text: &str) -> Option<CompositionExtract> {
    let (window, in_section) = match SECTION_RE.find(text) {
        Some(header) => {
            // Scan from the header to the end; row anchoring keeps prose out.
            (&text[header.start()..], true)
        }
        None => (text, false),
    };

    let mut rows = Vec::new();
    for caps in ROW_RE.captures_iter(window) {
        let name = caps[1].trim().to_string();
        let folded = fold_diacritics(&name);
        if folded.contains("total") || name.len() <= 3 {
            continue;
        }
        let Some(percentage) = parse_localized_number(&caps[2]) else {
            continue;
        };
        if percentage <= 0.0 || percentage > 100.0 {
            continue;
        }
        rows.push(CompositionRow {
            category: classify_asset(&name),
            name,
            percentage,
        });
    }

    if rows.is_empty() {
        return None;
    }

    rows.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
    let total = rows.iter().map(|r| r.percentage).sum();

    Some(CompositionExtract {
        rows,
        total,
        in_section,
    })
}
