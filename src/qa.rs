use crate::index::AmountIndex;
use crate::schema::LineItem;
use crate::waterfall::build_waterfall;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Ok,
    Warn,
    Bad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaCheck {
    pub title: String,
    pub detail: String,
    pub status: CheckStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeMatch {
    Exact,
    Prefix,
}

/// One required concept code in the critical checklist.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CodeSpec {
    pub matcher: CodeMatch,
    pub code: &'static str,
    pub label: &'static str,
}

/// Concept codes the KPI catalogue and waterfall builder rely on. Presence is
/// tested against the raw rows' codes, regardless of amount validity.
pub const CRITICAL_CODES: [CodeSpec; 29] = [
    // P&L
    CodeSpec { matcher: CodeMatch::Exact, code: "PYG.MAIN.1", label: "Sales" },
    CodeSpec { matcher: CodeMatch::Exact, code: "PYG.MAIN.A.1", label: "Base operating result" },
    CodeSpec { matcher: CodeMatch::Exact, code: "PYG.MAIN.8", label: "Depreciation/EBITDA adjustments" },
    CodeSpec { matcher: CodeMatch::Exact, code: "PYG.MAIN.2", label: "Gross margin item 2" },
    CodeSpec { matcher: CodeMatch::Exact, code: "PYG.MAIN.3", label: "Gross margin item 3" },
    CodeSpec { matcher: CodeMatch::Exact, code: "PYG.MAIN.4", label: "Gross margin item 4" },
    CodeSpec { matcher: CodeMatch::Exact, code: "PYG.MAIN.6", label: "Fixed costs 6" },
    CodeSpec { matcher: CodeMatch::Exact, code: "PYG.MAIN.7", label: "Fixed costs 7" },
    CodeSpec { matcher: CodeMatch::Exact, code: "PYG.MAIN.13", label: "Interest (P&L)" },
    // Balance sheet
    CodeSpec { matcher: CodeMatch::Exact, code: "BAL.ACT.B", label: "Current assets" },
    CodeSpec { matcher: CodeMatch::Exact, code: "BAL.PNP.C", label: "Current liabilities" },
    CodeSpec { matcher: CodeMatch::Exact, code: "BAL.ACT.B.VII", label: "Cash and equivalents" },
    CodeSpec { matcher: CodeMatch::Exact, code: "BAL.ACT.B.III.1", label: "Trade receivables (1)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "BAL.ACT.B.III.2", label: "Trade receivables (2)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "BAL.PNP.B.II.1", label: "Long-term debt (1)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "BAL.PNP.B.II.2", label: "Long-term debt (2)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "BAL.PNP.C.III.1", label: "Short-term debt (1)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "BAL.PNP.C.III.2", label: "Short-term debt (2)" },
    // Cash flow
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.E", label: "Net cash for the period" },
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.1", label: "Result (cash flow)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.2", label: "Adjustments to the result (cash flow)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.3", label: "Working capital changes (cash flow)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.4", label: "Interest/taxes/other operating (cash flow)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.6", label: "Investment payments (cash flow)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.7", label: "Divestment collections (cash flow)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.9", label: "Equity (cash flow)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.10.a", label: "Debt issuance (cash flow)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.10.a.4.b", label: "Debt repayment/amortization (cash flow)" },
    CodeSpec { matcher: CodeMatch::Exact, code: "EFE.MAIN.10.a.4.b.11", label: "Dividends/shareholder remuneration (cash flow)" },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingCode {
    pub code: String,
    pub label: String,
}

/// The four-check reconciliation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaReport {
    pub year_coverage: QaCheck,
    pub critical_codes: QaCheck,
    pub cash_reconciliation: QaCheck,
    pub benchmarks: QaCheck,
    /// Populated when the critical-code check fails.
    pub missing_codes: Vec<MissingCode>,
    /// How many of the three mandatory checks (benchmarks excluded) are OK.
    pub ok_count: usize,
}

impl QaReport {
    pub fn checks(&self) -> [&QaCheck; 4] {
        [
            &self.year_coverage,
            &self.critical_codes,
            &self.cash_reconciliation,
            &self.benchmarks,
        ]
    }

    pub fn summary(&self, base_year: &str, row_count: usize) -> String {
        format!(
            "Base {} - checks OK: {}/3 - rows: {}",
            base_year, self.ok_count, row_count
        )
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn spec_is_present(rows: &[LineItem], spec: &CodeSpec) -> bool {
    rows.iter().any(|r| {
        let code = r.concept_code.trim();
        match spec.matcher {
            CodeMatch::Exact => code == spec.code,
            CodeMatch::Prefix => code.starts_with(spec.code),
        }
    })
}

/// Runs the four consistency checks for a base year.
///
/// No outcome is fatal: missing years and codes are Bad findings, a cash
/// mismatch beyond tolerance is a Warn-level data-quality flag, and an
/// unloaded benchmark set is a Warn on an optional feature.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    rows: &[LineItem],
    index: &AmountIndex,
    fiscal_years: &[String],
    base_year: &str,
    benchmarks_loaded: bool,
    benchmarks_enabled: bool,
    balancing_tolerance: f64,
    reconciliation_tolerance: f64,
) -> QaReport {
    let years_ok = fiscal_years.len() >= 2;
    let year_coverage = QaCheck {
        title: "Years detected".to_string(),
        detail: if years_ok {
            format!("OK: {}", fiscal_years.join(", "))
        } else {
            "At least 2 annual periods (YYYY) are needed to compare.".to_string()
        },
        status: if years_ok {
            CheckStatus::Ok
        } else {
            CheckStatus::Bad
        },
    };

    let missing_codes: Vec<MissingCode> = CRITICAL_CODES
        .iter()
        .filter(|spec| !spec_is_present(rows, spec))
        .map(|spec| MissingCode {
            code: spec.code.to_string(),
            label: spec.label.to_string(),
        })
        .collect();
    let codes_ok = missing_codes.is_empty();
    let critical_codes = QaCheck {
        title: "Critical codes".to_string(),
        detail: if codes_ok {
            "OK: the key lines for KPIs and the cash-flow blocks are present.".to_string()
        } else {
            format!("{} required lines are missing.", missing_codes.len())
        },
        status: if codes_ok {
            CheckStatus::Ok
        } else {
            CheckStatus::Bad
        },
    };

    let waterfall = build_waterfall(rows, index, base_year, balancing_tolerance);
    let net_blocks = waterfall.net_of_blocks();
    let cash_net = waterfall.net_cash_change;
    let diff = net_blocks - cash_net;
    let cash_ok = diff.abs() <= reconciliation_tolerance;
    let cash_reconciliation = QaCheck {
        title: "Cash reconciliation".to_string(),
        detail: if cash_ok {
            format!(
                "OK: sum of blocks = {:.2} and net cash for the period = {:.2}.",
                net_blocks, cash_net
            )
        } else {
            format!(
                "MISMATCH: sum of blocks = {:.2} but net cash for the period = {:.2} (difference {:.2}).",
                net_blocks, cash_net, diff
            )
        },
        status: if cash_ok {
            CheckStatus::Ok
        } else {
            CheckStatus::Warn
        },
    };

    let benchmarks = QaCheck {
        title: "Sector benchmarks".to_string(),
        detail: if benchmarks_loaded {
            if benchmarks_enabled {
                "Sector comparison is ON.".to_string()
            } else {
                "Benchmarks loaded but OFF (can be enabled).".to_string()
            }
        } else {
            "No benchmark set loaded (optional).".to_string()
        },
        status: if benchmarks_loaded {
            CheckStatus::Ok
        } else {
            CheckStatus::Warn
        },
    };

    let ok_count = [&year_coverage, &critical_codes, &cash_reconciliation]
        .iter()
        .filter(|c| c.status == CheckStatus::Ok)
        .count();

    QaReport {
        year_coverage,
        critical_codes,
        cash_reconciliation,
        benchmarks,
        missing_codes,
        ok_count,
    }
}
