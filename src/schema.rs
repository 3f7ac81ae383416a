//! Canonical field catalog.
//!
//! Everything per-field and declarative lives here: the field set itself,
//! importance tiers, source-priority orders, and sane numeric ranges.
//! Adding a source or changing a priority is a data change in this module,
//! not a code change in the reconciliation engine.

use serde::{Deserialize, Serialize};

use crate::record::{Source, Value};

// ═══════════════════════════════════════════
// Field
// ═══════════════════════════════════════════

/// The sixteen canonical fields of a fund record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    /// RUN registry identifier, e.g. `10446-9`.
    Identifier,
    FundType,
    /// Chilean regulatory risk scale, `R1`–`R7`.
    RiskProfile,
    RiskTolerance,
    InvestmentHorizon,
    ManagementFee,
    RedemptionFee,
    #[serde(rename = "return_12m")]
    Return12m,
    #[serde(rename = "return_24m")]
    Return24m,
    #[serde(rename = "return_36m")]
    Return36m,
    NetAssets,
    Currency,
    ShareValue,
    Series,
    Composition,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Identifier => "identifier",
            Self::FundType => "fund_type",
            Self::RiskProfile => "risk_profile",
            Self::RiskTolerance => "risk_tolerance",
            Self::InvestmentHorizon => "investment_horizon",
            Self::ManagementFee => "management_fee",
            Self::RedemptionFee => "redemption_fee",
            Self::Return12m => "return_12m",
            Self::Return24m => "return_24m",
            Self::Return36m => "return_36m",
            Self::NetAssets => "net_assets",
            Self::Currency => "currency",
            Self::ShareValue => "share_value",
            Self::Series => "series",
            Self::Composition => "composition",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|f| f.as_str() == s)
    }

    pub fn all() -> &'static [Field] {
        &[
            Self::Name,
            Self::Identifier,
            Self::FundType,
            Self::RiskProfile,
            Self::RiskTolerance,
            Self::InvestmentHorizon,
            Self::ManagementFee,
            Self::RedemptionFee,
            Self::Return12m,
            Self::Return24m,
            Self::Return36m,
            Self::NetAssets,
            Self::Currency,
            Self::ShareValue,
            Self::Series,
            Self::Composition,
        ]
    }

    /// Importance tier for the completeness score.
    pub fn tier(&self) -> FieldTier {
        match self {
            Self::Name | Self::Identifier | Self::RiskProfile | Self::Return12m => {
                FieldTier::Critical
            }
            Self::FundType
            | Self::RiskTolerance
            | Self::ManagementFee
            | Self::NetAssets
            | Self::Composition => FieldTier::Important,
            Self::InvestmentHorizon
            | Self::RedemptionFee
            | Self::Return24m
            | Self::Return36m
            | Self::Currency
            | Self::ShareValue
            | Self::Series => FieldTier::Optional,
        }
    }

    /// Static source-priority order, walked first-present-wins by the
    /// reconciliation engine.
    ///
    /// Regulatory identity fields (risk, type, horizon, composition) are
    /// document-authoritative; performance and fee numerics trust the
    /// structured API first; registry fields come from the listing first.
    pub fn priority(&self) -> &'static [Source] {
        use Source::*;
        match self {
            Self::Name => &[StructuredApi, ListingApi, Document],
            Self::Identifier => &[ListingApi, StructuredApi, Document],
            Self::Series => &[ListingApi, StructuredApi, Document],
            Self::RiskProfile => &[Document, StructuredApi],
            Self::RiskTolerance => &[Document, StructuredApi],
            Self::FundType => &[Document, StructuredApi],
            Self::InvestmentHorizon => &[Document],
            Self::Composition => &[Document],
            Self::ManagementFee
            | Self::RedemptionFee
            | Self::Return12m
            | Self::Return24m
            | Self::Return36m
            | Self::NetAssets
            | Self::Currency
            | Self::ShareValue => &[StructuredApi, Document],
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Tiers
// ═══════════════════════════════════════════

/// Importance tiers for the weighted completeness score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTier {
    Critical,
    Important,
    Optional,
}

impl FieldTier {
    pub fn all() -> &'static [FieldTier] {
        &[Self::Critical, Self::Important, Self::Optional]
    }

    /// Tier weights sum to 100.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Critical => 60,
            Self::Important => 30,
            Self::Optional => 10,
        }
    }
}

// ═══════════════════════════════════════════
// Sane ranges
// ═══════════════════════════════════════════

/// Whether a candidate numeric value is plausible for its field.
///
/// Candidates outside the range are discarded by the extractor (with the
/// raw text logged), never clamped. Fields without a declared range
/// accept any value.
pub fn value_in_sane_range(field: Field, value: &Value) -> bool {
    match field {
        // Fees as fractions: above zero, at most 10%.
        Field::ManagementFee | Field::RedemptionFee => match value.as_f64() {
            Some(v) => v > 0.0 && v <= 0.10,
            None => true,
        },
        // Annualized returns as signed fractions within ±100%.
        Field::Return12m | Field::Return24m | Field::Return36m => match value.as_f64() {
            Some(v) => (-1.0..=1.0).contains(&v),
            None => true,
        },
        Field::InvestmentHorizon => match value {
            Value::Months(m) => (1..=600).contains(m),
            _ => true,
        },
        Field::NetAssets | Field::ShareValue => match value.as_f64() {
            Some(v) => v > 0.0,
            None => true,
        },
        _ => true,
    }
}
