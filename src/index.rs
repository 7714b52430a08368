use crate::schema::LineItem;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Aggregated amounts keyed by (concept code, fiscal year).
///
/// Rows sharing a key are summed. Rows with a non-annual period or an
/// unparsable amount never enter the index; lookups default to 0.0 so
/// downstream arithmetic stays total.
#[derive(Debug, Clone, Default)]
pub struct AmountIndex {
    amounts: BTreeMap<(String, String), f64>,
}

impl AmountIndex {
    /// Builds the index and the sorted set of distinct valid years.
    ///
    /// The index is rebuilt wholesale on every load; there is no incremental
    /// update path.
    pub fn build(rows: &[LineItem]) -> (Self, Vec<String>) {
        let mut amounts: BTreeMap<(String, String), f64> = BTreeMap::new();
        let mut years: BTreeSet<String> = BTreeSet::new();

        for row in rows {
            let period = row.period.trim();
            if !is_annual_period(period) {
                continue;
            }

            let Some(amount) = parse_amount(&row.amount) else {
                debug!(
                    "Dropping row {} / {}: unparsable amount {:?}",
                    row.concept_code, period, row.amount
                );
                continue;
            };

            years.insert(period.to_string());
            let key = (row.concept_code.trim().to_string(), period.to_string());
            *amounts.entry(key).or_insert(0.0) += amount;
        }

        (Self { amounts }, years.into_iter().collect())
    }

    /// Summed amount for a code and year, 0.0 when absent.
    pub fn amount(&self, code: &str, year: &str) -> f64 {
        self.amounts
            .get(&(code.trim().to_string(), year.trim().to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }
}

/// Whole 4-digit years are the only annual periods the engine accepts.
pub fn is_annual_period(period: &str) -> bool {
    let trimmed = period.trim();
    trimmed.len() == 4 && trimmed.chars().all(|c| c.is_ascii_digit())
}

/// Parses a locale-ambiguous numeric string.
///
/// When both `.` and `,` appear, the right-most separator is the decimal
/// point and the other is stripped as a thousands separator. A lone `,` is
/// the decimal point, with any `.` stripped as thousands. Anything that does
/// not parse to a finite number is `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let normalized = match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) => s.replace('.', "").replace(',', "."),
        _ => s.to_string(),
    };

    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}
