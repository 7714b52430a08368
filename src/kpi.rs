use crate::error::{EngineError, Result};
use crate::index::AmountIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KpiId {
    Sales,
    Ebitda,
    EbitdaMargin,
    NetCash,
    GrossMargin,
    FixedCosts,
    BreakEven,
    WorkingCapital,
    DaysSalesOutstanding,
    CashRunwayDays,
    NetDebtToEbitda,
    GrossDebt,
}

impl KpiId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "SALES",
            Self::Ebitda => "EBITDA",
            Self::EbitdaMargin => "EBITDA_M",
            Self::NetCash => "CASH_NET",
            Self::GrossMargin => "GM_M",
            Self::FixedCosts => "FIXED",
            Self::BreakEven => "BEP",
            Self::WorkingCapital => "FM",
            Self::DaysSalesOutstanding => "DSO",
            Self::CashRunwayDays => "OXY",
            Self::NetDebtToEbitda => "ND_EB",
            Self::GrossDebt => "DEBT_GROSS",
        }
    }

    pub fn from_str_id(raw: &str) -> Option<Self> {
        match raw.trim() {
            "SALES" => Some(Self::Sales),
            "EBITDA" => Some(Self::Ebitda),
            "EBITDA_M" => Some(Self::EbitdaMargin),
            "CASH_NET" => Some(Self::NetCash),
            "GM_M" => Some(Self::GrossMargin),
            "FIXED" => Some(Self::FixedCosts),
            "BEP" => Some(Self::BreakEven),
            "FM" => Some(Self::WorkingCapital),
            "DSO" => Some(Self::DaysSalesOutstanding),
            "OXY" => Some(Self::CashRunwayDays),
            "ND_EB" => Some(Self::NetDebtToEbitda),
            "DEBT_GROSS" => Some(Self::GrossDebt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KpiCategory {
    Overview,
    Operating,
    ShortTermLiquidity,
    Leverage,
}

impl KpiCategory {
    pub const ALL: [Self; 4] = [
        Self::Overview,
        Self::Operating,
        Self::ShortTermLiquidity,
        Self::Leverage,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KpiUnit {
    Currency,
    Percentage,
    Days,
    Multiple,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    HigherBetter,
    LowerBetter,
}

/// Evaluation context threaded through every indicator function.
///
/// Wraps the immutable index snapshot and the fiscal year set so evaluators
/// stay pure: same snapshot, same answer.
pub struct EvalContext<'a> {
    catalogue: &'a KpiCatalogue,
    index: &'a AmountIndex,
    years: &'a [String],
}

impl<'a> EvalContext<'a> {
    fn amount(&self, code: &str, year: &str) -> f64 {
        self.index.amount(code, year)
    }

    /// Evaluates another indicator by id (recursive composition).
    fn kpi(&self, id: KpiId, year: &str) -> Option<f64> {
        let def = self.catalogue.get(id);
        (def.eval)(self, year)
    }

    fn previous_year(&self, year: &str) -> Option<&'a str> {
        let prev = year.trim().parse::<i64>().ok()? - 1;
        let prev = prev.to_string();
        self.years
            .iter()
            .find(|y| **y == prev)
            .map(|y| y.as_str())
    }
}

type EvalFn = fn(&EvalContext<'_>, &str) -> Option<f64>;

#[derive(Debug)]
pub struct KpiDef {
    pub id: KpiId,
    pub category: KpiCategory,
    pub name: &'static str,
    pub unit: KpiUnit,
    pub direction: Direction,
    /// One-line plain-language reading of what the indicator measures.
    pub help: &'static str,
    /// Indicator ids this evaluator invokes. Must stay in sync with `eval`;
    /// the catalogue constructor rejects cycles through these edges.
    pub deps: &'static [KpiId],
    eval: EvalFn,
}

/// Division that treats a zero denominator as "not available" instead of
/// letting infinity or NaN through.
fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

fn eval_sales(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    Some(ctx.amount("PYG.MAIN.1", year))
}

fn eval_ebitda(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    Some(ctx.amount("PYG.MAIN.A.1", year) - ctx.amount("PYG.MAIN.8", year))
}

fn eval_ebitda_margin(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    let ebitda = ctx.kpi(KpiId::Ebitda, year)?;
    safe_div(ebitda, ctx.amount("PYG.MAIN.1", year))
}

fn eval_net_cash(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    Some(ctx.amount("EFE.MAIN.E", year))
}

fn eval_gross_margin(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    let sales = ctx.amount("PYG.MAIN.1", year);
    let margin = ctx.amount("PYG.MAIN.1", year)
        + ctx.amount("PYG.MAIN.2", year)
        + ctx.amount("PYG.MAIN.3", year)
        + ctx.amount("PYG.MAIN.4", year);
    safe_div(margin, sales)
}

fn eval_fixed_costs(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    Some(-(ctx.amount("PYG.MAIN.6", year) + ctx.amount("PYG.MAIN.7", year)))
}

fn eval_break_even(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    // Dividing by a zero or negative gross-margin ratio is meaningless.
    let margin_pct = ctx.kpi(KpiId::GrossMargin, year)?;
    if margin_pct <= 0.0 {
        return None;
    }
    let fixed = ctx.kpi(KpiId::FixedCosts, year)?;
    Some(fixed / margin_pct)
}

fn eval_working_capital(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    Some(ctx.amount("BAL.ACT.B", year) - ctx.amount("BAL.PNP.C", year))
}

fn receivables(ctx: &EvalContext<'_>, year: &str) -> f64 {
    ctx.amount("BAL.ACT.B.III.1", year) + ctx.amount("BAL.ACT.B.III.2", year)
}

fn eval_dso(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    let sales = ctx.amount("PYG.MAIN.1", year);
    if sales <= 0.0 {
        return None;
    }
    let current = receivables(ctx, year);
    // Average against the prior year's balance when that year is loaded;
    // otherwise fall back to the current balance alone.
    let averaged = match ctx.previous_year(year) {
        Some(prev) => (current + receivables(ctx, prev)) / 2.0,
        None => current,
    };
    Some(averaged / sales * 365.0)
}

fn eval_cash_runway_days(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    let cash = ctx.amount("BAL.ACT.B.VII", year);
    let fixed = ctx.kpi(KpiId::FixedCosts, year)?;
    let interest = -ctx.amount("PYG.MAIN.13", year);
    let burn = fixed + interest;
    if burn <= 0.0 {
        return None;
    }
    Some(cash / (burn / 365.0))
}

fn gross_debt(ctx: &EvalContext<'_>, year: &str) -> f64 {
    ctx.amount("BAL.PNP.B.II.1", year)
        + ctx.amount("BAL.PNP.B.II.2", year)
        + ctx.amount("BAL.PNP.C.III.1", year)
        + ctx.amount("BAL.PNP.C.III.2", year)
}

fn eval_net_debt_to_ebitda(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    let ebitda = ctx.kpi(KpiId::Ebitda, year)?;
    if ebitda <= 0.0 {
        return None;
    }
    let net_debt = gross_debt(ctx, year) - ctx.amount("BAL.ACT.B.VII", year);
    Some(net_debt / ebitda)
}

fn eval_gross_debt(ctx: &EvalContext<'_>, year: &str) -> Option<f64> {
    Some(gross_debt(ctx, year))
}

fn standard_defs() -> Vec<KpiDef> {
    vec![
        KpiDef {
            id: KpiId::Sales,
            category: KpiCategory::Overview,
            name: "Sales",
            unit: KpiUnit::Currency,
            direction: Direction::HigherBetter,
            help: "The size of the business: how much you sell.",
            deps: &[],
            eval: eval_sales,
        },
        KpiDef {
            id: KpiId::Ebitda,
            category: KpiCategory::Overview,
            name: "EBITDA",
            unit: KpiUnit::Currency,
            direction: Direction::HigherBetter,
            help: "What operations generate before debt and taxes.",
            deps: &[],
            eval: eval_ebitda,
        },
        KpiDef {
            id: KpiId::EbitdaMargin,
            category: KpiCategory::Overview,
            name: "EBITDA / Sales",
            unit: KpiUnit::Percentage,
            direction: Direction::HigherBetter,
            help: "Out of every 100 sold, how much you keep.",
            deps: &[KpiId::Ebitda],
            eval: eval_ebitda_margin,
        },
        KpiDef {
            id: KpiId::NetCash,
            category: KpiCategory::Overview,
            name: "Net cash for the period",
            unit: KpiUnit::Currency,
            direction: Direction::HigherBetter,
            help: "Whether cash came in (+) or went out (-) over the year.",
            deps: &[],
            eval: eval_net_cash,
        },
        KpiDef {
            id: KpiId::GrossMargin,
            category: KpiCategory::Operating,
            name: "Gross margin / Sales",
            unit: KpiUnit::Percentage,
            direction: Direction::HigherBetter,
            help: "What remains after direct cost, before overheads.",
            deps: &[],
            eval: eval_gross_margin,
        },
        KpiDef {
            id: KpiId::FixedCosts,
            category: KpiCategory::Operating,
            name: "Fixed costs",
            unit: KpiUnit::Currency,
            direction: Direction::LowerBetter,
            help: "Structure: what the business costs even with no customers.",
            deps: &[],
            eval: eval_fixed_costs,
        },
        KpiDef {
            id: KpiId::BreakEven,
            category: KpiCategory::Operating,
            name: "Break-even point",
            unit: KpiUnit::Currency,
            direction: Direction::LowerBetter,
            help: "The minimum you must sell to not lose money.",
            deps: &[KpiId::GrossMargin, KpiId::FixedCosts],
            eval: eval_break_even,
        },
        KpiDef {
            id: KpiId::WorkingCapital,
            category: KpiCategory::ShortTermLiquidity,
            name: "Short-term cushion (working capital)",
            unit: KpiUnit::Currency,
            direction: Direction::HigherBetter,
            help: "Day-to-day cushion: current assets minus current liabilities.",
            deps: &[],
            eval: eval_working_capital,
        },
        KpiDef {
            id: KpiId::DaysSalesOutstanding,
            category: KpiCategory::ShortTermLiquidity,
            name: "Days to collect",
            unit: KpiUnit::Days,
            direction: Direction::LowerBetter,
            help: "How long money takes to come back from customers.",
            deps: &[],
            eval: eval_dso,
        },
        KpiDef {
            id: KpiId::CashRunwayDays,
            category: KpiCategory::ShortTermLiquidity,
            name: "Days of runway",
            unit: KpiUnit::Days,
            direction: Direction::HigherBetter,
            help: "How many days you last if nothing comes in tomorrow.",
            deps: &[KpiId::FixedCosts],
            eval: eval_cash_runway_days,
        },
        KpiDef {
            id: KpiId::NetDebtToEbitda,
            category: KpiCategory::Leverage,
            name: "Net debt / EBITDA",
            unit: KpiUnit::Multiple,
            direction: Direction::LowerBetter,
            help: "Years to repay debt if EBITDA held steady.",
            deps: &[KpiId::Ebitda],
            eval: eval_net_debt_to_ebitda,
        },
        KpiDef {
            id: KpiId::GrossDebt,
            category: KpiCategory::Leverage,
            name: "Gross bank debt",
            unit: KpiUnit::Currency,
            direction: Direction::LowerBetter,
            help: "Total bank debt, short plus long term.",
            deps: &[],
            eval: eval_gross_debt,
        },
    ]
}

/// The fixed, ordered indicator catalogue.
#[derive(Debug)]
pub struct KpiCatalogue {
    defs: Vec<KpiDef>,
    by_id: HashMap<KpiId, usize>,
}

impl KpiCatalogue {
    /// Builds the standard 12-indicator catalogue, validating that declared
    /// dependencies form a DAG.
    pub fn standard() -> Result<Self> {
        Self::from_defs(standard_defs())
    }

    fn from_defs(defs: Vec<KpiDef>) -> Result<Self> {
        let by_id: HashMap<KpiId, usize> = defs
            .iter()
            .enumerate()
            .map(|(i, def)| (def.id, i))
            .collect();
        let catalogue = Self { defs, by_id };
        catalogue.check_acyclic()?;
        Ok(catalogue)
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            catalogue: &KpiCatalogue,
            id: KpiId,
            marks: &mut HashMap<KpiId, Mark>,
        ) -> Result<()> {
            match marks.get(&id).copied().unwrap_or(Mark::Unvisited) {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    return Err(EngineError::KpiCycle(id.as_str().to_string()))
                }
                Mark::Unvisited => {}
            }
            marks.insert(id, Mark::InProgress);
            for dep in catalogue.get(id).deps {
                visit(catalogue, *dep, marks)?;
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for def in &self.defs {
            visit(self, def.id, &mut marks)?;
        }
        Ok(())
    }

    pub fn get(&self, id: KpiId) -> &KpiDef {
        // by_id covers every variant placed in the catalogue at construction
        &self.defs[self.by_id[&id]]
    }

    pub fn defs(&self) -> &[KpiDef] {
        &self.defs
    }

    pub fn defs_in_category(&self, category: KpiCategory) -> impl Iterator<Item = &KpiDef> {
        self.defs.iter().filter(move |d| d.category == category)
    }

    /// Evaluates one indicator for a fiscal year against an index snapshot.
    ///
    /// Returns `None` ("not available") instead of NaN or infinity whenever a
    /// ratio denominator is zero, negative where that is meaningless, or an
    /// upstream indicator is itself unavailable.
    pub fn evaluate(
        &self,
        id: KpiId,
        index: &AmountIndex,
        years: &[String],
        year: &str,
    ) -> Option<f64> {
        let ctx = EvalContext {
            catalogue: self,
            index,
            years,
        };
        let value = ctx.kpi(id, year)?;
        value.is_finite().then_some(value)
    }
}

/// Year-over-year change between a base and a comparison value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// base - comparison; `None` when either side is unavailable.
    pub absolute: Option<f64>,
    /// absolute / |comparison|; `None` when the comparison is exactly zero.
    pub percentage: Option<f64>,
}

pub fn delta_info(base: Option<f64>, comparison: Option<f64>) -> Delta {
    let (Some(base), Some(comparison)) = (base, comparison) else {
        return Delta {
            absolute: None,
            percentage: None,
        };
    };
    let absolute = base - comparison;
    let percentage = if comparison == 0.0 {
        None
    } else {
        Some(absolute / comparison.abs())
    };
    Delta {
        absolute: Some(absolute),
        percentage,
    }
}

/// Plain-language reading of an indicator value, for owner-facing summaries.
pub fn commentary(id: KpiId, value: Option<f64>) -> &'static str {
    let Some(v) = value.filter(|v| v.is_finite()) else {
        return "Figure not available.";
    };
    match id {
        KpiId::NetCash => {
            if v >= 0.0 {
                "Cash came in this year."
            } else {
                "Cash went out this year."
            }
        }
        KpiId::EbitdaMargin => {
            if v < 0.0 {
                "You are losing money on every 100 sold."
            } else if v < 0.05 {
                "Very tight margin: any setback hurts."
            } else if v < 0.12 {
                "Normal margin: watch costs and pricing."
            } else {
                "Good margin: you have a cushion to invest and absorb surprises."
            }
        }
        KpiId::WorkingCapital => {
            if v < 0.0 {
                "Negative cushion: delays can create real strain."
            } else {
                "You have a cushion to absorb the day-to-day."
            }
        }
        KpiId::DaysSalesOutstanding => {
            if v > 90.0 {
                "You collect very late: review terms and collection follow-up."
            } else if v > 60.0 {
                "Somewhat slow collection: improve the collections process."
            } else {
                "You collect reasonably fast."
            }
        }
        KpiId::CashRunwayDays => {
            if v < 15.0 {
                "Short runway: any stoppage puts you against the ropes."
            } else if v < 45.0 {
                "Medium runway: watch cash and fixed costs."
            } else {
                "Comfortable runway: good room to maneuver."
            }
        }
        KpiId::NetDebtToEbitda => {
            if v > 5.0 {
                "High debt for your repayment capacity."
            } else if v > 3.0 {
                "Moderate debt: control debt growth."
            } else {
                "Reasonable debt."
            }
        }
        _ => "Watch the trend: rising is good when it strengthens margin and cash.",
    }
}
