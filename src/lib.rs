//! # Financial KPI Engine
//!
//! A library for turning taxonomy-coded financial statement line items
//! (profit & loss, balance sheet, cash flow) into yearly indicators, a
//! six-block cashflow waterfall with an automatic balancing row, and a
//! reconciliation report.
//!
//! ## Core Concepts
//!
//! - **Line Items**: caller-owned rows tagged with a dot-segmented concept
//!   taxonomy (e.g. `PYG.MAIN.1` is total revenue)
//! - **Amount Index**: (concept code, fiscal year) -> summed amount, rebuilt
//!   wholesale on every load
//! - **KPI Catalogue**: a fixed set of indicator definitions, some built on
//!   other indicators, evaluated per fiscal year
//! - **Cashflow Waterfall**: a "where money came from / went to"
//!   decomposition whose displayed columns always balance
//! - **QA Report**: year coverage, critical-code presence, cash
//!   reconciliation and benchmark availability checks
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_kpi_engine::*;
//!
//! let items = ingestion::line_items_from_records(&records)?;
//! let snapshot = AnalysisSnapshot::load(items, EngineConfig::default())?;
//!
//! let (base, comp) = snapshot.latest_years()?;
//! for card in snapshot.kpi_cards(base, comp) {
//!     println!("{}: {:?} ({})", card.name, card.base, card.benchmark.label);
//! }
//! let waterfall = snapshot.waterfall(base);
//! let report = snapshot.qa(base);
//! ```

pub mod benchmark;
pub mod error;
pub mod index;
pub mod ingestion;
pub mod kpi;
pub mod qa;
pub mod schema;
pub mod waterfall;

pub use benchmark::{Band, BenchmarkTier, Classification, SectorBands};
pub use error::{EngineError, Result};
pub use index::{parse_amount, AmountIndex};
pub use kpi::{
    commentary, delta_info, Delta, Direction, KpiCatalogue, KpiCategory, KpiDef, KpiId, KpiUnit,
};
pub use qa::{CheckStatus, QaCheck, QaReport, CRITICAL_CODES};
pub use schema::{LineItem, NodeKind, Statement, REQUIRED_COLUMNS};
pub use waterfall::{
    build_waterfall, BlockDetail, BlockId, CashflowBlock, CashflowWaterfall, DetailLine, Movement,
};

use log::{debug, info};
use serde::Serialize;

/// Engine tolerances, in units of currency.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Largest inflow/outflow column gap the waterfall leaves unbalanced.
    pub balancing_tolerance: f64,
    /// Largest |sum of block nets - net cash change| QA accepts as OK.
    pub reconciliation_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            balancing_tolerance: 1.0,
            reconciliation_tolerance: 1.0,
        }
    }
}

/// Everything presentation needs about one indicator for two selected years.
#[derive(Debug, Clone, Serialize)]
pub struct KpiCard {
    pub id: KpiId,
    pub category: KpiCategory,
    pub name: &'static str,
    pub unit: KpiUnit,
    pub direction: Direction,
    pub help: &'static str,
    pub base: Option<f64>,
    pub comparison: Option<f64>,
    pub delta: Delta,
    pub benchmark: Classification,
    pub commentary: &'static str,
}

/// An immutable analysis snapshot: the loaded rows, their index, the fiscal
/// year set and the benchmark table.
///
/// A new load produces a new snapshot; derived views are recomputed from it
/// and nothing is patched in place. On a failed load the caller keeps its
/// previous snapshot untouched.
#[derive(Debug)]
pub struct AnalysisSnapshot {
    rows: Vec<LineItem>,
    index: AmountIndex,
    fiscal_years: Vec<String>,
    catalogue: KpiCatalogue,
    bands: SectorBands,
    benchmarks_enabled: bool,
    config: EngineConfig,
}

impl AnalysisSnapshot {
    /// Indexes a line-item set and prepares the KPI catalogue.
    pub fn load(rows: Vec<LineItem>, config: EngineConfig) -> Result<Self> {
        let catalogue = KpiCatalogue::standard()?;
        let (index, fiscal_years) = AmountIndex::build(&rows);

        info!(
            "Loaded {} rows into {} (code, year) slots across years [{}]",
            rows.len(),
            index.len(),
            fiscal_years.join(", ")
        );
        if fiscal_years.len() < 2 {
            debug!(
                "Only {} annual period(s) found; comparison features unavailable",
                fiscal_years.len()
            );
        }

        Ok(Self {
            rows,
            index,
            fiscal_years,
            catalogue,
            bands: SectorBands::new(),
            benchmarks_enabled: false,
            config,
        })
    }

    /// Validates and converts tabular records, then loads them.
    pub fn from_records(records: &[ingestion::Record], config: EngineConfig) -> Result<Self> {
        let rows = ingestion::line_items_from_records(records)?;
        Self::load(rows, config)
    }

    pub fn fiscal_years(&self) -> &[String] {
        &self.fiscal_years
    }

    /// Default (base, comparison) pair: the two most recent years.
    pub fn latest_years(&self) -> Result<(&str, &str)> {
        if self.fiscal_years.len() < 2 {
            return Err(EngineError::InsufficientYears(self.fiscal_years.len()));
        }
        let base = &self.fiscal_years[self.fiscal_years.len() - 1];
        let comp = &self.fiscal_years[self.fiscal_years.len() - 2];
        Ok((base, comp))
    }

    pub fn index(&self) -> &AmountIndex {
        &self.index
    }

    pub fn catalogue(&self) -> &KpiCatalogue {
        &self.catalogue
    }

    /// Replaces the benchmark table in full and enables the overlay when the
    /// new table is non-empty.
    pub fn set_bands(&mut self, bands: SectorBands) {
        self.benchmarks_enabled = !bands.is_empty();
        self.bands = bands;
    }

    pub fn bands(&self) -> &SectorBands {
        &self.bands
    }

    pub fn set_benchmarks_enabled(&mut self, enabled: bool) {
        self.benchmarks_enabled = enabled && !self.bands.is_empty();
    }

    pub fn benchmarks_enabled(&self) -> bool {
        self.benchmarks_enabled
    }

    pub fn kpi_value(&self, id: KpiId, year: &str) -> Option<f64> {
        self.catalogue
            .evaluate(id, &self.index, &self.fiscal_years, year)
    }

    /// Assembles the per-indicator presentation tuples for two years, in
    /// catalogue order.
    pub fn kpi_cards(&self, base_year: &str, comparison_year: &str) -> Vec<KpiCard> {
        self.catalogue
            .defs()
            .iter()
            .map(|def| {
                let base = self.kpi_value(def.id, base_year);
                let comparison = self.kpi_value(def.id, comparison_year);
                let benchmark = if self.benchmarks_enabled {
                    self.bands.classify(def.id, base, def.direction)
                } else {
                    Classification {
                        tier: BenchmarkTier::NotAvailable,
                        label: "Sector: off".to_string(),
                    }
                };
                KpiCard {
                    id: def.id,
                    category: def.category,
                    name: def.name,
                    unit: def.unit,
                    direction: def.direction,
                    help: def.help,
                    base,
                    comparison,
                    delta: delta_info(base, comparison),
                    benchmark,
                    commentary: commentary(def.id, base),
                }
            })
            .collect()
    }

    /// The cashflow decomposition for one fiscal year.
    pub fn waterfall(&self, year: &str) -> CashflowWaterfall {
        build_waterfall(
            &self.rows,
            &self.index,
            year,
            self.config.balancing_tolerance,
        )
    }

    /// The four-check reconciliation report for a base year.
    pub fn qa(&self, base_year: &str) -> QaReport {
        qa::evaluate(
            &self.rows,
            &self.index,
            &self.fiscal_years,
            base_year,
            !self.bands.is_empty(),
            self.benchmarks_enabled,
            self.config.balancing_tolerance,
            self.config.reconciliation_tolerance,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NodeKind, Statement};

    fn item(code: &str, year: &str, amount: &str) -> LineItem {
        LineItem {
            concept_code: code.to_string(),
            period: year.to_string(),
            statement: Statement::parse(code.split('.').next().unwrap_or("")),
            amount: amount.to_string(),
            node_kind: NodeKind::Subtotal,
            agg_rule: "SUM".to_string(),
            display_name: None,
        }
    }

    fn two_year_rows() -> Vec<LineItem> {
        vec![
            item("PYG.MAIN.1", "2023", "1000"),
            item("PYG.MAIN.1", "2022", "800"),
            item("PYG.MAIN.A.1", "2023", "150"),
            item("PYG.MAIN.A.1", "2022", "100"),
            item("PYG.MAIN.8", "2023", "-50"),
            item("EFE.MAIN.E", "2023", "30"),
            item("EFE.MAIN.1", "2023", "30"),
        ]
    }

    #[test]
    fn test_load_and_latest_years() {
        let snapshot =
            AnalysisSnapshot::load(two_year_rows(), EngineConfig::default()).unwrap();
        assert_eq!(snapshot.fiscal_years(), &["2022", "2023"]);
        let (base, comp) = snapshot.latest_years().unwrap();
        assert_eq!(base, "2023");
        assert_eq!(comp, "2022");
    }

    #[test]
    fn test_single_year_reports_insufficient_for_comparison() {
        let rows = vec![item("PYG.MAIN.1", "2023", "1000")];
        let snapshot = AnalysisSnapshot::load(rows, EngineConfig::default()).unwrap();
        assert!(matches!(
            snapshot.latest_years(),
            Err(EngineError::InsufficientYears(1))
        ));
        // QA still renders, with a Bad coverage tier.
        let report = snapshot.qa("2023");
        assert_eq!(report.year_coverage.status, CheckStatus::Bad);
    }

    #[test]
    fn test_kpi_cards_cover_catalogue_in_order() {
        let snapshot =
            AnalysisSnapshot::load(two_year_rows(), EngineConfig::default()).unwrap();
        let cards = snapshot.kpi_cards("2023", "2022");
        assert_eq!(cards.len(), 12);
        assert_eq!(cards[0].id, KpiId::Sales);
        assert_eq!(cards[0].base, Some(1000.0));
        assert_eq!(cards[0].comparison, Some(800.0));
        assert_eq!(cards[0].delta.absolute, Some(200.0));
        assert_eq!(cards[0].delta.percentage, Some(0.25));
        // Benchmarks not loaded: the overlay is off.
        assert_eq!(cards[0].benchmark.tier, BenchmarkTier::NotAvailable);
    }

    #[test]
    fn test_set_bands_enables_overlay() {
        let mut snapshot =
            AnalysisSnapshot::load(two_year_rows(), EngineConfig::default()).unwrap();
        let mut bands = SectorBands::new();
        bands.insert(
            KpiId::Sales,
            Band {
                min: Some(500.0),
                median: Some(900.0),
                max: Some(2000.0),
            },
        );
        snapshot.set_bands(bands);
        assert!(snapshot.benchmarks_enabled());

        let cards = snapshot.kpi_cards("2023", "2022");
        assert_eq!(cards[0].benchmark.tier, BenchmarkTier::AboveSector);

        snapshot.set_benchmarks_enabled(false);
        let cards = snapshot.kpi_cards("2023", "2022");
        assert_eq!(cards[0].benchmark.label, "Sector: off");
    }

    #[test]
    fn test_waterfall_uses_configured_tolerance() {
        let rows = vec![item("EFE.MAIN.1", "2023", "5"), item("EFE.MAIN.1", "2022", "0")];
        let loose = AnalysisSnapshot::load(
            rows.clone(),
            EngineConfig {
                balancing_tolerance: 10.0,
                reconciliation_tolerance: 1.0,
            },
        )
        .unwrap();
        assert!(loose.waterfall("2023").balancing_row.is_none());

        let strict = AnalysisSnapshot::load(rows, EngineConfig::default()).unwrap();
        assert!(strict.waterfall("2023").balancing_row.is_some());
    }
}
