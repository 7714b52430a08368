use anyhow::Result;
use financial_kpi_engine::ingestion::{self, Record};
use financial_kpi_engine::*;

fn records_from_csv(data: &str) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(
            headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(records)
}

/// Two complete fiscal years for a small industrial company. The 2023
/// cash-flow blocks net to exactly the reported net cash change (280).
fn company_csv() -> &'static str {
    "\
concept_code,period,statement,amount,node_type,agg_rule,display_name
PYG.MAIN.1,2023,PYG,10000,SUBTOTAL,SUM,Sales
PYG.MAIN.2,2023,PYG,-2000,SUBTOTAL,SUM,
PYG.MAIN.3,2023,PYG,-500,SUBTOTAL,SUM,
PYG.MAIN.4,2023,PYG,-3000,SUBTOTAL,SUM,Cost of goods
PYG.MAIN.6,2023,PYG,-1500,SUBTOTAL,SUM,Staff
PYG.MAIN.7,2023,PYG,-800,SUBTOTAL,SUM,Other opex
PYG.MAIN.8,2023,PYG,-700,SUBTOTAL,SUM,Depreciation
PYG.MAIN.13,2023,PYG,-120,SUBTOTAL,SUM,Interest expense
PYG.MAIN.A.1,2023,PYG,1200,TOTAL,SUM,Operating result
BAL.ACT.B,2023,BAL,4000,SUBTOTAL,SUM,Current assets
BAL.PNP.C,2023,BAL,2500,SUBTOTAL,SUM,Current liabilities
BAL.ACT.B.VII,2023,BAL,900,DETAIL,SUM,Cash
BAL.ACT.B.III.1,2023,BAL,700,DETAIL,SUM,Trade receivables
BAL.ACT.B.III.2,2023,BAL,100,DETAIL,SUM,Other receivables
BAL.PNP.B.II.1,2023,BAL,1000,DETAIL,SUM,LT bank loans
BAL.PNP.B.II.2,2023,BAL,200,DETAIL,SUM,LT leases
BAL.PNP.C.III.1,2023,BAL,300,DETAIL,SUM,ST bank loans
BAL.PNP.C.III.2,2023,BAL,100,DETAIL,SUM,ST leases
EFE.MAIN.1,2023,EFE,500,SUBTOTAL,SUM,Result before taxes
EFE.MAIN.2,2023,EFE,120,SUBTOTAL,SUM,Adjustments
EFE.MAIN.3,2023,EFE,-80,SUBTOTAL,SUM,Working capital changes
EFE.MAIN.4,2023,EFE,-60,SUBTOTAL,SUM,Interest and taxes
EFE.MAIN.6,2023,EFE,-200,SUBTOTAL,SUM,Investments
EFE.MAIN.6.a,2023,EFE,-120,DETAIL,SUM,Machinery
EFE.MAIN.6.b,2023,EFE,-50,DETAIL,SUM,Vehicles
EFE.MAIN.6.c,2023,EFE,-30,DETAIL,SUM,Licenses
EFE.MAIN.7,2023,EFE,40,SUBTOTAL,SUM,Divestments
EFE.MAIN.7.a,2023,EFE,40,DETAIL,SUM,Warehouse sale
EFE.MAIN.9,2023,EFE,30,SUBTOTAL,SUM,Equity
EFE.MAIN.10.a,2023,EFE,100,SUBTOTAL,SUM,Debt issuance
EFE.MAIN.10.a.4.b,2023,EFE,-130,SUBTOTAL,SUM,Debt repayment
EFE.MAIN.10.a.4.b.11,2023,EFE,-40,SUBTOTAL,SUM,Dividends
EFE.MAIN.E,2023,EFE,280,TOTAL,SUM,Net cash change
PYG.MAIN.1,2022,PYG,8000,SUBTOTAL,SUM,Sales
PYG.MAIN.8,2022,PYG,-600,SUBTOTAL,SUM,Depreciation
PYG.MAIN.A.1,2022,PYG,900,TOTAL,SUM,Operating result
BAL.ACT.B.III.1,2022,BAL,600,DETAIL,SUM,Trade receivables
BAL.ACT.B.III.2,2022,BAL,100,DETAIL,SUM,Other receivables
EFE.MAIN.1,2022,EFE,400,SUBTOTAL,SUM,Result before taxes
EFE.MAIN.E,2022,EFE,400,TOTAL,SUM,Net cash change
"
}

fn load_company() -> Result<AnalysisSnapshot> {
    let records = records_from_csv(company_csv())?;
    Ok(AnalysisSnapshot::from_records(
        &records,
        EngineConfig::default(),
    )?)
}

#[test]
fn test_end_to_end_company_analysis() -> Result<()> {
    let snapshot = load_company()?;

    assert_eq!(snapshot.fiscal_years(), &["2022", "2023"]);
    let (base, comp) = snapshot.latest_years()?;
    assert_eq!((base, comp), ("2023", "2022"));

    let cards = snapshot.kpi_cards(base, comp);
    assert_eq!(cards.len(), 12);

    let card = |id: KpiId| cards.iter().find(|c| c.id == id).unwrap();

    assert_eq!(card(KpiId::Sales).base, Some(10000.0));
    assert_eq!(card(KpiId::Sales).comparison, Some(8000.0));
    assert_eq!(card(KpiId::Sales).delta.percentage, Some(0.25));

    // EBITDA 2023 = 1200 - (-700) = 1900; 2022 = 900 - (-600) = 1500
    assert_eq!(card(KpiId::Ebitda).base, Some(1900.0));
    assert_eq!(card(KpiId::Ebitda).comparison, Some(1500.0));
    assert_eq!(card(KpiId::EbitdaMargin).base, Some(0.19));

    // Gross margin (10000 - 2000 - 500 - 3000) / 10000
    assert_eq!(card(KpiId::GrossMargin).base, Some(0.45));
    assert_eq!(card(KpiId::FixedCosts).base, Some(2300.0));
    let bep = card(KpiId::BreakEven).base.unwrap();
    assert!((bep - 2300.0 / 0.45).abs() < 1e-9);

    assert_eq!(card(KpiId::WorkingCapital).base, Some(1500.0));

    // DSO averages receivables: avg(800, 700) / 10000 * 365
    let dso = card(KpiId::DaysSalesOutstanding).base.unwrap();
    assert!((dso - 27.375).abs() < 1e-9);
    // 2022 has no prior year loaded, so no averaging
    let dso_prev = card(KpiId::DaysSalesOutstanding).comparison.unwrap();
    assert!((dso_prev - 700.0 / 8000.0 * 365.0).abs() < 1e-9);

    // Runway: 900 / ((2300 + 120) / 365)
    let runway = card(KpiId::CashRunwayDays).base.unwrap();
    assert!((runway - 900.0 * 365.0 / 2420.0).abs() < 1e-9);

    assert_eq!(card(KpiId::GrossDebt).base, Some(1600.0));
    let leverage = card(KpiId::NetDebtToEbitda).base.unwrap();
    assert!((leverage - 700.0 / 1900.0).abs() < 1e-9);

    assert_eq!(card(KpiId::NetCash).base, Some(280.0));
    assert_eq!(card(KpiId::NetCash).commentary, "Cash came in this year.");

    Ok(())
}

#[test]
fn test_end_to_end_waterfall_and_balancing() -> Result<()> {
    let snapshot = load_company()?;
    let wf = snapshot.waterfall("2023");

    assert_eq!(wf.net_cash_change, 280.0);
    assert_eq!(wf.blocks.len(), 6);

    // Operating 620, working capital -80, interest/taxes -60, investments
    // -200 (forced out), divestments +40 (forced in), financing -40.
    let nets: Vec<f64> = wf.blocks.iter().map(|b| b.net).collect();
    assert_eq!(nets, vec![620.0, -80.0, -60.0, -200.0, 40.0, -40.0]);
    assert!((wf.net_of_blocks() - 280.0).abs() < 1e-9);

    // Ranked investment movements come from the raw detail rows.
    let BlockDetail::RankedMovements(top) = &wf.blocks[3].detail else {
        panic!("expected ranked movements on the investments block");
    };
    assert_eq!(top[0].name, "Investments");
    assert_eq!(top[1].name, "Machinery");
    assert_eq!(top[1].outflow(), 120.0);

    // Inflows exceed outflows by the retained 280, so a balancing outflow
    // appears and the displayed columns reconcile.
    let row = wf.balancing_row.as_ref().expect("balancing row");
    assert_eq!(row.outflow, 280.0);
    assert_eq!(row.net, -280.0);
    let total_in: f64 = wf.blocks.iter().map(|b| b.inflow).sum::<f64>() + row.inflow;
    let total_out: f64 = wf.blocks.iter().map(|b| b.outflow).sum::<f64>() + row.outflow;
    assert!((total_in - total_out).abs() < 1e-9);

    // A comparison year builds independently from the same snapshot.
    let prev = snapshot.waterfall("2022");
    assert_eq!(prev.net_cash_change, 400.0);
    assert_eq!(prev.blocks[0].net, 400.0);

    Ok(())
}

#[test]
fn test_end_to_end_qa_report() -> Result<()> {
    let snapshot = load_company()?;
    let report = snapshot.qa("2023");

    assert_eq!(report.year_coverage.status, CheckStatus::Ok);
    assert_eq!(report.critical_codes.status, CheckStatus::Ok);
    assert_eq!(report.cash_reconciliation.status, CheckStatus::Ok);
    assert_eq!(report.benchmarks.status, CheckStatus::Warn);
    assert_eq!(report.ok_count, 3);
    assert!(report.missing_codes.is_empty());
    assert!(report.summary("2023", 41).contains("3/3"));

    Ok(())
}

#[test]
fn test_qa_flags_missing_critical_code() -> Result<()> {
    let records: Vec<Record> = records_from_csv(company_csv())?
        .into_iter()
        .filter(|r| r.get("concept_code").map(String::as_str) != Some("PYG.MAIN.13"))
        .collect();
    let snapshot = AnalysisSnapshot::from_records(&records, EngineConfig::default())?;
    let report = snapshot.qa("2023");

    assert_eq!(report.critical_codes.status, CheckStatus::Bad);
    assert_eq!(report.missing_codes.len(), 1);
    assert_eq!(report.missing_codes[0].code, "PYG.MAIN.13");
    assert_eq!(report.ok_count, 2);

    Ok(())
}

#[test]
fn test_sector_benchmark_overlay() -> Result<()> {
    let mut snapshot = load_company()?;

    let sector_csv = "\
KPI,Min,Media,Max
EBITDA_M,\"0,05\",\"0,12\",\"0,25\"
DSO,20,45,80
ND_EB,\"0,5\",2,4
";
    let bands = ingestion::sector_bands_from_records(&records_from_csv(sector_csv)?);
    snapshot.set_bands(bands);
    assert!(snapshot.benchmarks_enabled());

    let report = snapshot.qa("2023");
    assert_eq!(report.benchmarks.status, CheckStatus::Ok);

    let cards = snapshot.kpi_cards("2023", "2022");
    let card = |id: KpiId| cards.iter().find(|c| c.id == id).unwrap();

    // 0.19 margin sits above the 0.12 sector median.
    assert_eq!(card(KpiId::EbitdaMargin).benchmark.tier, BenchmarkTier::AboveSector);
    // 27.4 days of DSO beats the 45-day median (lower is better).
    assert_eq!(
        card(KpiId::DaysSalesOutstanding).benchmark.tier,
        BenchmarkTier::AboveSector
    );
    // No band registered for Sales.
    assert_eq!(card(KpiId::Sales).benchmark.tier, BenchmarkTier::NotAvailable);

    Ok(())
}

#[test]
fn test_missing_columns_reject_whole_load() -> Result<()> {
    let csv_missing = "\
concept_code,period,statement,amount
PYG.MAIN.1,2023,PYG,1000
";
    let records = records_from_csv(csv_missing)?;
    let err = AnalysisSnapshot::from_records(&records, EngineConfig::default()).unwrap_err();
    match err {
        EngineError::MissingColumns(missing) => {
            assert_eq!(missing, vec!["node_type".to_string(), "agg_rule".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_locale_ambiguous_amounts_and_invalid_periods() -> Result<()> {
    let csv_data = "\
concept_code,period,statement,amount,node_type,agg_rule
PYG.MAIN.1,2023,PYG,\"1.234,56\",DETAIL,SUM
PYG.MAIN.1,2023,PYG,\"765,44\",DETAIL,SUM
PYG.MAIN.1,2023-Q4,PYG,99999,DETAIL,SUM
PYG.MAIN.1,2022,PYG,\"1,000.00\",DETAIL,SUM
PYG.MAIN.1,2022,PYG,bad-data,DETAIL,SUM
";
    let records = records_from_csv(csv_data)?;
    let snapshot = AnalysisSnapshot::from_records(&records, EngineConfig::default())?;

    // 1.234,56 + 765,44 = 2000.0; the quarterly row never enters the index.
    assert_eq!(snapshot.index().amount("PYG.MAIN.1", "2023"), 2000.0);
    // US-style grouping parses too; the unparsable row is dropped silently.
    assert_eq!(snapshot.index().amount("PYG.MAIN.1", "2022"), 1000.0);
    assert_eq!(snapshot.fiscal_years(), &["2022", "2023"]);

    Ok(())
}
