//! Core record types for the extraction pipeline.
//!
//! These types model the full lifecycle of a fact:
//! source response → FactValue → PartialFactSet → reconciliation → FundRecord.
//!
//! Key properties:
//! - A `FactValue` is immutable once created; re-evaluation produces a new one
//! - A `PartialFactSet` holds facts from exactly one source, never merged data
//! - A `FundRecord` is schema-complete: every field is Present or explicitly
//!   Absent, never an omitted key, never a fabricated default

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::Field;

// ═══════════════════════════════════════════
// Source and Confidence
// ═══════════════════════════════════════════

/// The three origins of facts, in decreasing overall reliability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    StructuredApi,
    ListingApi,
    Document,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredApi => "structured_api",
            Self::ListingApi => "listing_api",
            Self::Document => "document",
        }
    }

    pub fn all() -> &'static [Source] {
        &[Self::StructuredApi, Self::ListingApi, Self::Document]
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How specific the matcher/adapter that produced a value was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

// ═══════════════════════════════════════════
// Values
// ═══════════════════════════════════════════

/// Asset categories for composition rows, classified by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    GovernmentFixedIncome,
    CorporateFixedIncome,
    LocalEquity,
    InternationalEquity,
    MutualFunds,
    Derivatives,
    Cash,
    Other,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GovernmentFixedIncome => "government_fixed_income",
            Self::CorporateFixedIncome => "corporate_fixed_income",
            Self::LocalEquity => "local_equity",
            Self::InternationalEquity => "international_equity",
            Self::MutualFunds => "mutual_funds",
            Self::Derivatives => "derivatives",
            Self::Cash => "cash",
            Self::Other => "other",
        }
    }
}

/// One row of a portfolio composition table.
/// `percentage` is in percent points (0–100), as printed in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionRow {
    pub name: String,
    pub category: AssetCategory,
    pub percentage: f64,
}

/// A typed extracted value.
///
/// `Fraction` is a percentage normalized to `[0, 1]` (`[-1, 1]` for signed
/// return fields). Composition stays in percent points so the 100%-sum check
/// reads the way the table prints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Number(f64),
    Fraction(f64),
    Months(u32),
    Composition(Vec<CompositionRow>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) | Self::Fraction(n) => Some(*n),
            Self::Months(m) => Some(f64::from(*m)),
            _ => None,
        }
    }

    /// Whether two values for the same field genuinely disagree.
    /// Numeric comparison tolerates float noise so `0.085` from two
    /// sources never registers as a conflict.
    pub fn conflicts_with(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a != b,
            (Self::Months(a), Self::Months(b)) => a != b,
            (Self::Composition(a), Self::Composition(b)) => a != b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() > 1e-9,
                _ => true,
            },
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Fraction(n) => write!(f, "{n}"),
            Self::Months(m) => write!(f, "{m} months"),
            Self::Composition(rows) => write!(f, "composition ({} rows)", rows.len()),
        }
    }
}

// ═══════════════════════════════════════════
// FactValue and PartialFactSet
// ═══════════════════════════════════════════

/// A single extracted datum with its provenance. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactValue {
    pub value: Value,
    pub source: Source,
    pub confidence: Confidence,
    /// Identifier of the pattern variant or adapter rule that produced it.
    pub matched_rule: String,
}

/// Non-fatal flags attached to a fact set or record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactWarning {
    /// The composition table's row percentages do not sum to ~100.
    CompositionSumOff { total: f64 },
}

/// The facts one source contributed for one entity, before merging.
///
/// Created fresh per extraction attempt, folded into a `FundRecord` exactly
/// once. The constructor stamps the source onto every fact so a set can
/// never carry cross-source data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialFactSet {
    pub source: Source,
    facts: BTreeMap<Field, FactValue>,
    pub warnings: Vec<FactWarning>,
    /// Set when the source as a whole was unavailable, timed out, or
    /// produced unusable content. A failed set is wholly absent.
    pub failure: Option<String>,
}

impl PartialFactSet {
    /// An empty set for a source that responded but matched nothing.
    pub fn new(source: Source) -> Self {
        Self {
            source,
            facts: BTreeMap::new(),
            warnings: Vec::new(),
            failure: None,
        }
    }

    /// A wholly-absent set for a source that failed outright.
    pub fn failed(source: Source, reason: impl Into<String>) -> Self {
        Self {
            source,
            facts: BTreeMap::new(),
            warnings: Vec::new(),
            failure: Some(reason.into()),
        }
    }

    /// Record a fact. The set's source is stamped onto the value.
    pub fn insert(
        &mut self,
        field: Field,
        value: Value,
        confidence: Confidence,
        matched_rule: impl Into<String>,
    ) {
        self.facts.insert(
            field,
            FactValue {
                value,
                source: self.source,
                confidence,
                matched_rule: matched_rule.into(),
            },
        );
    }

    pub fn get(&self, field: Field) -> Option<&FactValue> {
        self.facts.get(&field)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.facts.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

// ═══════════════════════════════════════════
// Lineage
// ═══════════════════════════════════════════

/// An auditable note recording that a lower-priority source disagreed
/// with the value that was selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictNote {
    pub field: Field,
    pub selected_source: Source,
    pub selected_value: String,
    pub rejected_source: Source,
    pub rejected_value: String,
}

/// Per-field record of which source's value was selected, plus any
/// recorded conflicts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lineage {
    pub selected: BTreeMap<Field, Source>,
    pub conflicts: Vec<ConflictNote>,
}

impl Lineage {
    /// Human-readable explanation of where a field's value came from.
    pub fn describe(&self, field: Field) -> String {
        match self.selected.get(&field) {
            Some(source) => {
                let disputed = self.conflicts.iter().any(|c| c.field == field);
                if disputed {
                    format!("{field}: selected from {source} (conflicting value rejected)")
                } else {
                    format!("{field}: selected from {source}")
                }
            }
            None => format!("{field}: absent (no source supplied it)"),
        }
    }
}

// ═══════════════════════════════════════════
// FundRecord
// ═══════════════════════════════════════════

/// The explicit absence marker. A field with no known value is stored as
/// `Absent`, never as a default string, zero, or inferred value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FieldState {
    Present(FactValue),
    Absent,
}

impl FieldState {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn fact(&self) -> Option<&FactValue> {
        match self {
            Self::Present(fact) => Some(fact),
            Self::Absent => None,
        }
    }
}

/// The final, schema-complete, per-entity canonical output.
///
/// Every schema field appears exactly once, Present or Absent. Immutable
/// after assembly; a re-run produces a new record, it never edits this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundRecord {
    pub entity_id: String,
    pub fields: BTreeMap<Field, FieldState>,
    pub lineage: Lineage,
    /// Tiered weighted completeness, 0–100.
    pub overall_confidence: u8,
    pub extracted_at: DateTime<Utc>,
    pub warnings: Vec<FactWarning>,
    /// Per-source failure reasons, for sources that were wholly absent.
    pub source_failures: BTreeMap<Source, String>,
}

impl FundRecord {
    pub fn field(&self, field: Field) -> &FieldState {
        // Assembly guarantees every schema field has an entry.
        self.fields.get(&field).unwrap_or(&FieldState::Absent)
    }

    pub fn present_count(&self) -> usize {
        self.fields.values().filter(|s| s.is_present()).count()
    }

    pub fn is_all_absent(&self) -> bool {
        self.present_count() == 0
    }
}
