use crate::benchmark::{Band, SectorBands};
use crate::error::{EngineError, Result};
use crate::index::parse_amount;
use crate::kpi::KpiId;
use crate::schema::{LineItem, NodeKind, Statement, REQUIRED_COLUMNS};
use log::debug;
use std::collections::HashMap;

/// One parsed tabular record, keyed by column name.
pub type Record = HashMap<String, String>;

/// Rejects a load whose header is missing any required column, listing every
/// missing name. Nothing is ingested partially.
pub fn validate_columns<'a, I>(headers: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: Vec<&str> = headers.into_iter().collect();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !present.contains(col))
        .map(|col| col.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::MissingColumns(missing))
    }
}

fn field<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    record.get(name).map(String::as_str)
}

/// Case-insensitive field lookup, for the benchmark input whose exporters
/// disagree on capitalization.
fn field_ci<'a>(record: &'a Record, names: &[&str]) -> Option<&'a str> {
    record
        .iter()
        .find(|(key, _)| names.iter().any(|n| key.eq_ignore_ascii_case(n)))
        .map(|(_, value)| value.as_str())
}

/// Converts validated company records into line items.
///
/// Column presence is checked against the first record; the optional
/// `display_name` column is consumed when present.
pub fn line_items_from_records(records: &[Record]) -> Result<Vec<LineItem>> {
    let headers: Vec<&str> = records
        .first()
        .map(|r| r.keys().map(String::as_str).collect())
        .unwrap_or_default();
    validate_columns(headers)?;

    Ok(records
        .iter()
        .map(|record| LineItem {
            concept_code: field(record, "concept_code").unwrap_or("").trim().to_string(),
            period: field(record, "period").unwrap_or("").trim().to_string(),
            statement: Statement::parse(field(record, "statement").unwrap_or("")),
            amount: field(record, "amount").unwrap_or("").trim().to_string(),
            node_kind: NodeKind::parse(field(record, "node_type").unwrap_or("")),
            agg_rule: field(record, "agg_rule").unwrap_or("").trim().to_string(),
            display_name: field(record, "display_name")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
        .collect())
}

/// Builds the sector band table from benchmark records.
///
/// Rows without a recognizable indicator id are skipped; numeric fields that
/// fail to parse stay unavailable rather than becoming zero.
pub fn sector_bands_from_records(records: &[Record]) -> SectorBands {
    let mut bands = SectorBands::new();

    for record in records {
        let Some(raw_id) = field_ci(record, &["kpi"]).map(str::trim).filter(|s| !s.is_empty())
        else {
            continue;
        };
        let Some(id) = KpiId::from_str_id(raw_id) else {
            debug!("Skipping benchmark row with unknown KPI id {:?}", raw_id);
            continue;
        };

        let parse = |names: &[&str]| field_ci(record, names).and_then(parse_amount);
        bands.insert(
            id,
            Band {
                min: parse(&["min"]),
                median: parse(&["media", "median"]),
                max: parse(&["max"]),
            },
        );
    }

    bands
}
