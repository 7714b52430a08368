use serde::{Deserialize, Serialize};

/// Columns every company load must carry. Extra columns (e.g. `display_name`)
/// are consumed opportunistically.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "concept_code",
    "period",
    "statement",
    "amount",
    "node_type",
    "agg_rule",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    /// Profit & loss statement ("PYG").
    ProfitAndLoss,
    /// Balance sheet ("BAL").
    BalanceSheet,
    /// Statement of cash flows ("EFE").
    Cashflow,
    /// Anything else is carried through untouched; such rows still index.
    Other(String),
}

impl Statement {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "PYG" => Self::ProfitAndLoss,
            "BAL" => Self::BalanceSheet,
            "EFE" => Self::Cashflow,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// A leaf line item.
    Detail,
    /// A reported subtotal or total line.
    Subtotal,
    Other(String),
}

impl NodeKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "DETAIL" => Self::Detail,
            "SUBTOTAL" | "TOTAL" => Self::Subtotal,
            other => Self::Other(other.to_string()),
        }
    }

    /// Rows eligible for the waterfall's raw movement scans.
    pub fn is_leaf_scannable(&self) -> bool {
        matches!(self, Self::Detail | Self::Subtotal)
    }
}

/// One tagged line item from a financial statement export.
///
/// The engine reads these to build the [`crate::index::AmountIndex`] and to
/// rank raw cashflow movements; it never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// Dot-segmented taxonomy path, e.g. `PYG.MAIN.1`.
    pub concept_code: String,
    /// Reporting period. Only whole 4-digit years are annual and valid.
    pub period: String,
    pub statement: Statement,
    /// Locale-ambiguous textual amount, parsed by the index.
    pub amount: String,
    pub node_kind: NodeKind,
    /// Aggregation rule from the source taxonomy, carried through as-is.
    pub agg_rule: String,
    /// Optional human label, used when ranking movements for display.
    pub display_name: Option<String>,
}

impl LineItem {
    pub fn label(&self) -> &str {
        match &self.display_name {
            Some(name) if !name.trim().is_empty() => name.trim(),
            _ => self.concept_code.trim(),
        }
    }
}
