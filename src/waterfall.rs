use crate::index::{parse_amount, AmountIndex};
use crate::schema::{LineItem, Statement};
use serde::{Deserialize, Serialize};

/// How many raw movements the investment/divestment blocks rank for display.
pub const TOP_MOVEMENTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockId {
    Operating,
    WorkingCapital,
    InterestAndTaxes,
    Investments,
    Divestments,
    Financing,
    Balancing,
}

/// A fixed breakdown line inside a block's detail view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailLine {
    pub label: String,
    pub inflow: f64,
    pub outflow: f64,
}

/// One raw movement ranked by magnitude; its own sign decides the side it
/// displays on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movement {
    pub name: String,
    pub amount: f64,
}

impl Movement {
    pub fn inflow(&self) -> f64 {
        self.amount.max(0.0)
    }

    pub fn outflow(&self) -> f64 {
        (-self.amount).max(0.0)
    }
}

/// Each block declares exactly one presentation-detail kind, so a renderer
/// can switch exhaustively instead of probing optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockDetail {
    FixedBreakdown(Vec<DetailLine>),
    RankedMovements(Vec<Movement>),
    FinancingBreakdown(Vec<DetailLine>),
    BalancingNote(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashflowBlock {
    pub id: BlockId,
    pub name: String,
    /// Direction-of-flow wording for chart legends.
    pub chart_label: String,
    pub inflow: f64,
    pub outflow: f64,
    pub net: f64,
    pub detail: BlockDetail,
}

/// The cash-flow decomposition for one fiscal year: six semantic blocks and,
/// when the displayed columns do not already reconcile, a synthetic balancing
/// row that never alters `net_cash_change`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashflowWaterfall {
    pub year: String,
    /// Authoritative net-cash-change figure, read from `EFE.MAIN.E`.
    pub net_cash_change: f64,
    pub blocks: Vec<CashflowBlock>,
    pub balancing_row: Option<CashflowBlock>,
}

impl CashflowWaterfall {
    /// Sum of the six primary blocks' nets, excluding the balancing row.
    /// This is the figure reconciled against `net_cash_change`.
    pub fn net_of_blocks(&self) -> f64 {
        self.blocks.iter().map(|b| b.net).sum()
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Inflow/outflow split of a signed net amount.
#[derive(Debug, Clone, Copy)]
struct Flow {
    inflow: f64,
    outflow: f64,
    net: f64,
}

impl Flow {
    /// Positive nets show as inflow, negative as outflow, zero as neither.
    fn from_net(net: f64) -> Self {
        Self {
            inflow: net.max(0.0),
            outflow: (-net).max(0.0),
            net,
        }
    }

    /// Capital deployed is always shown leaving, regardless of raw sign.
    fn force_out(net: f64) -> Self {
        let v = net.abs();
        Self {
            inflow: 0.0,
            outflow: v,
            net: -v,
        }
    }

    fn force_in(net: f64) -> Self {
        let v = net.abs();
        Self {
            inflow: v,
            outflow: 0.0,
            net: v,
        }
    }
}

fn detail_line(label: &str, net: f64) -> DetailLine {
    let flow = Flow::from_net(net);
    DetailLine {
        label: label.to_string(),
        inflow: flow.inflow,
        outflow: flow.outflow,
    }
}

fn operating_label(net: f64) -> &'static str {
    if net < 0.0 {
        "Going out from my business"
    } else if net > 0.0 {
        "Coming in from my business"
    } else {
        "My business (neutral)"
    }
}

fn working_capital_label(net: f64) -> &'static str {
    if net < 0.0 {
        "Going out to invest in working capital"
    } else if net > 0.0 {
        "Coming in from divesting working capital"
    } else {
        "Working capital (neutral)"
    }
}

/// Raw cash-flow statement rows usable for movement ranking in one year.
fn cashflow_leaf_rows<'a>(rows: &'a [LineItem], year: &str) -> Vec<&'a LineItem> {
    let year = year.trim();
    rows.iter()
        .filter(|r| {
            r.statement == Statement::Cashflow
                && r.period.trim() == year
                && r.node_kind.is_leaf_scannable()
                && parse_amount(&r.amount).is_some()
        })
        .collect()
}

/// Largest-magnitude raw rows under a concept-code prefix, descending by
/// absolute amount.
fn top_movements(leaf_rows: &[&LineItem], prefix: &str, n: usize) -> Vec<Movement> {
    let mut list: Vec<Movement> = leaf_rows
        .iter()
        .filter(|r| r.concept_code.trim().starts_with(prefix))
        .filter_map(|r| {
            parse_amount(&r.amount).map(|amount| Movement {
                name: r.label().to_string(),
                amount,
            })
        })
        .collect();
    list.sort_by(|a, b| {
        b.amount
            .abs()
            .partial_cmp(&a.amount.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    list.truncate(n);
    list
}

/// Builds the six-block waterfall for one fiscal year.
///
/// Block totals come from the index; the ranked movement lists rescan the raw
/// cash-flow rows, which is the one place the engine reads rows after
/// indexing.
pub fn build_waterfall(
    rows: &[LineItem],
    index: &AmountIndex,
    year: &str,
    balancing_tolerance: f64,
) -> CashflowWaterfall {
    let leaf_rows = cashflow_leaf_rows(rows, year);
    let net_cash_change = index.amount("EFE.MAIN.E", year);

    // Block 1: pre-tax result plus the adjustments subtotal, which already
    // nets all non-cash add-backs.
    let result = index.amount("EFE.MAIN.1", year);
    let adjustments = index.amount("EFE.MAIN.2", year);
    let operating = Flow::from_net(result + adjustments);
    let b1 = CashflowBlock {
        id: BlockId::Operating,
        name: "From my business (operating)".to_string(),
        chart_label: operating_label(operating.net).to_string(),
        inflow: operating.inflow,
        outflow: operating.outflow,
        net: operating.net,
        detail: BlockDetail::FixedBreakdown(vec![
            detail_line("Result (before taxes)", result),
            detail_line("Adjustments (depreciation, provisions, etc.)", adjustments),
        ]),
    };

    // Block 2: the working-capital subtotal as a single reported figure.
    let wc = Flow::from_net(index.amount("EFE.MAIN.3", year));
    let wc_name = if wc.net < 0.0 {
        "Investing in working capital"
    } else if wc.net > 0.0 {
        "Divesting from working capital"
    } else {
        "Working capital"
    };
    let b2 = CashflowBlock {
        id: BlockId::WorkingCapital,
        name: wc_name.to_string(),
        chart_label: working_capital_label(wc.net).to_string(),
        inflow: wc.inflow,
        outflow: wc.outflow,
        net: wc.net,
        detail: BlockDetail::FixedBreakdown(vec![
            detail_line("Inventory (stock)", index.amount("EFE.MAIN.3.a", year)),
            detail_line(
                "Customers (collections / delays)",
                index.amount("EFE.MAIN.3.b", year),
            ),
            detail_line(
                "Other current assets",
                index.amount("EFE.MAIN.3.c", year),
            ),
            detail_line(
                "Suppliers (financing you / getting paid)",
                index.amount("EFE.MAIN.3.d", year),
            ),
            detail_line(
                "Other current liabilities",
                index.amount("EFE.MAIN.3.e", year),
            ),
            detail_line(
                "Other non-current assets/liabilities",
                index.amount("EFE.MAIN.3.f", year),
            ),
        ]),
    };

    // Block 3: interest, dividends received, taxes and related flows.
    let other_ops = Flow::from_net(index.amount("EFE.MAIN.4", year));
    let b3 = CashflowBlock {
        id: BlockId::InterestAndTaxes,
        name: "Interest and taxes".to_string(),
        chart_label: if other_ops.net < 0.0 {
            "Going out for interest and taxes"
        } else {
            "Coming in from interest and taxes"
        }
        .to_string(),
        inflow: other_ops.inflow,
        outflow: other_ops.outflow,
        net: other_ops.net,
        detail: BlockDetail::FixedBreakdown(vec![
            detail_line("Interest payments", index.amount("EFE.MAIN.4.a", year)),
            detail_line("Dividends received", index.amount("EFE.MAIN.4.b", year)),
            detail_line("Interest received", index.amount("EFE.MAIN.4.c", year)),
            detail_line("Taxes", index.amount("EFE.MAIN.4.d", year)),
            detail_line(
                "Other payments/collections",
                index.amount("EFE.MAIN.4.e", year),
            ),
        ]),
    };

    // Block 4: always an outflow from the owner's point of view.
    let investing = Flow::force_out(index.amount("EFE.MAIN.6", year));
    let b4 = CashflowBlock {
        id: BlockId::Investments,
        name: "Investments".to_string(),
        chart_label: "Going out for investments".to_string(),
        inflow: investing.inflow,
        outflow: investing.outflow,
        net: investing.net,
        detail: BlockDetail::RankedMovements(top_movements(
            &leaf_rows,
            "EFE.MAIN.6",
            TOP_MOVEMENTS,
        )),
    };

    // Block 5: symmetric to block 4, always an inflow.
    let divesting = Flow::force_in(index.amount("EFE.MAIN.7", year));
    let b5 = CashflowBlock {
        id: BlockId::Divestments,
        name: "Divestments".to_string(),
        chart_label: "Coming in from divestments".to_string(),
        inflow: divesting.inflow,
        outflow: divesting.outflow,
        net: divesting.net,
        detail: BlockDetail::RankedMovements(top_movements(
            &leaf_rows,
            "EFE.MAIN.7",
            TOP_MOVEMENTS,
        )),
    };

    // Block 6: four independently evaluated financing sub-components.
    let equity = Flow::from_net(index.amount("EFE.MAIN.9", year));
    let debt_in = Flow::force_in(index.amount("EFE.MAIN.10.a", year));
    let debt_out = Flow::force_out(index.amount("EFE.MAIN.10.a.4.b", year));
    let dividends = Flow::force_out(index.amount("EFE.MAIN.10.a.4.b.11", year));

    let fin_in = equity.inflow + debt_in.inflow;
    let fin_out = equity.outflow + debt_out.outflow + dividends.outflow;
    let b6 = CashflowBlock {
        id: BlockId::Financing,
        name: "Financing".to_string(),
        chart_label: "Financing".to_string(),
        inflow: fin_in,
        outflow: fin_out,
        net: fin_in - fin_out,
        detail: BlockDetail::FinancingBreakdown(vec![
            DetailLine {
                label: "Incoming financing (loans / issuance)".to_string(),
                inflow: debt_in.inflow,
                outflow: 0.0,
            },
            DetailLine {
                label: "Outgoing repayment (amortization / cancellation)".to_string(),
                inflow: 0.0,
                outflow: debt_out.outflow,
            },
            DetailLine {
                label: "Outgoing dividends / shareholder remuneration".to_string(),
                inflow: 0.0,
                outflow: dividends.outflow,
            },
            DetailLine {
                label: "Equity (capital increases / other)".to_string(),
                inflow: equity.inflow,
                outflow: equity.outflow,
            },
        ]),
    };

    let blocks = vec![b1, b2, b3, b4, b5, b6];

    // Visual balancing only: redistributes the displayed inflow/outflow
    // split, never the real net.
    let total_in: f64 = blocks.iter().map(|b| b.inflow).sum();
    let total_out: f64 = blocks.iter().map(|b| b.outflow).sum();
    let diff = total_in - total_out;

    let balancing_row = if diff.abs() <= balancing_tolerance {
        None
    } else if diff > 0.0 {
        Some(CashflowBlock {
            id: BlockId::Balancing,
            name: "Cash retained (to balance)".to_string(),
            chart_label: "Cash retained".to_string(),
            inflow: 0.0,
            outflow: diff,
            net: -diff,
            detail: BlockDetail::BalancingNote(
                "Cash saved this year. Shown as an outflow to balance the columns.".to_string(),
            ),
        })
    } else {
        Some(CashflowBlock {
            id: BlockId::Balancing,
            name: "Cash drawn down (to balance)".to_string(),
            chart_label: "Cash drawn down".to_string(),
            inflow: -diff,
            outflow: 0.0,
            net: -diff,
            detail: BlockDetail::BalancingNote(
                "Cash was consumed this year. Shown as an inflow to balance the columns."
                    .to_string(),
            ),
        })
    };

    CashflowWaterfall {
        year: year.trim().to_string(),
        net_cash_change,
        blocks,
        balancing_row,
    }
}
