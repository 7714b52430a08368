use crate::kpi::{Direction, KpiId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// External {min, median, max} reference range for one indicator.
///
/// Fields that failed to parse from the source stay `None` and make the whole
/// band unusable; they are never treated as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: Option<f64>,
    pub median: Option<f64>,
    pub max: Option<f64>,
}

impl Band {
    fn complete(&self) -> Option<(f64, f64, f64)> {
        match (self.min, self.median, self.max) {
            (Some(min), Some(median), Some(max))
                if min.is_finite() && median.is_finite() && max.is_finite() =>
            {
                Some((min, median, max))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenchmarkTier {
    /// Better than the sector median.
    AboveSector,
    /// Within the sector band.
    InRange,
    /// Worse than the sector band.
    BelowSector,
    /// No band, incomplete band, or no value to classify.
    NotAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub tier: BenchmarkTier,
    pub label: String,
}

impl Classification {
    fn not_available() -> Self {
        Self {
            tier: BenchmarkTier::NotAvailable,
            label: "Sector: n/a".to_string(),
        }
    }
}

/// Per-indicator sector bands, loaded wholesale from an external source and
/// replaced in full on every load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectorBands {
    bands: HashMap<KpiId, Band>,
}

impl SectorBands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: KpiId, band: Band) {
        self.bands.insert(id, band);
    }

    pub fn get(&self, id: KpiId) -> Option<&Band> {
        self.bands.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// Classifies an indicator value against its sector band.
    ///
    /// Higher-is-better: at or above the median is above sector, at or above
    /// the minimum is in range, else below. Lower-is-better inverts the
    /// polarity, comparing against the median and maximum.
    pub fn classify(
        &self,
        id: KpiId,
        value: Option<f64>,
        direction: Direction,
    ) -> Classification {
        let Some(value) = value.filter(|v| v.is_finite()) else {
            return Classification::not_available();
        };
        let Some((min, median, max)) = self.get(id).and_then(Band::complete) else {
            return Classification::not_available();
        };

        let tier = match direction {
            Direction::HigherBetter => {
                if value >= median {
                    BenchmarkTier::AboveSector
                } else if value >= min {
                    BenchmarkTier::InRange
                } else {
                    BenchmarkTier::BelowSector
                }
            }
            Direction::LowerBetter => {
                if value <= median {
                    BenchmarkTier::AboveSector
                } else if value <= max {
                    BenchmarkTier::InRange
                } else {
                    BenchmarkTier::BelowSector
                }
            }
        };

        let label = match tier {
            BenchmarkTier::AboveSector => "Sector: above",
            BenchmarkTier::InRange => "Sector: in range",
            BenchmarkTier::BelowSector => "Sector: below",
            BenchmarkTier::NotAvailable => "Sector: n/a",
        };

        Classification {
            tier,
            label: label.to_string(),
        }
    }
}
