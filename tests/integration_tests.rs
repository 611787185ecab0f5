use repayment_engine::calculation::allocation::AllocationMode;
use repayment_engine::calculation::classify::{Classification, ProductType};
use repayment_engine::calculation::interest::{CalculationOptions, InterestCalculator, Note, OpsType};
use repayment_engine::checker::consistency::{CheckStatus, ConsistencyChecker};
use repayment_engine::config::EngineConfig;
use repayment_engine::core::dates::{add_days, ymd};
use repayment_engine::input::email::parse_email_summary;
use repayment_engine::input::schema::Normalizer;
use repayment_engine::rates::storage::{write_hibor_export, RateStore};
use repayment_engine::rates::table::{RateColumn, RateRecord, RateTable};
use repayment_engine::session::{AppState, ProcessOptions};
use repayment_engine::transfer::reconcile::MatchStatus;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// SOFR at 5.00 and HIBOR at 4.00 on every day of the range.
fn flat_rates(from: chrono::NaiveDate, to: chrono::NaiveDate) -> RateTable {
    let mut records = Vec::new();
    let mut date = from;
    while date <= to {
        records.push(RateRecord::new(date, dec!(5), dec!(4)));
        date = add_days(date, 1);
    }
    RateTable::from_records(records)
}

fn lms_report(drawdown_id: &str, repayment_date: &str) -> String {
    format!(
        "Payment Details
Drawdown ID\t{drawdown_id}
Repayment Currency\tUSD
SME Disbursement Date\t10/01/2024
Repayment Date\t{repayment_date}
Repayment Amount\t100,783.75
Bank Charge\t0.00
SME Information
Tenor (Days)\t30
MIT (Days)\t7
Interest Rate (% p.a.)\tSOFR + 4.5%
SME Transaction
Outstanding Principal\t100,000.00
Principal\t100,000.00
Interest\t791.66
Overdue Interest\t0.00
Return to borrower\t0.00
Funder Information
Funder ID\tFP0053
Funder Disbursement Date\t10/01/2024
Interest Rate (% p.a.)\t4.5
Funder Transaction
Interest (I + OI)\t791.66
Platform Fee\t(7.91)
FundPark Transaction
FundPark Spreading\t0.00
"
    )
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("repayment-engine-{}-{}", Uuid::new_v4(), name))
}

/// 36-column bank export line with the dbs-v1 cells filled in.
fn bank_line(debit: &str, currency: &str, key: &str, credit: &str, amount: &str) -> String {
    let mut cells = vec![String::new(); 36];
    cells[2] = debit.to_string();
    cells[3] = currency.to_string();
    cells[4] = key.to_string();
    cells[15] = credit.to_string();
    cells[27] = format!("\"{}\"", amount);
    cells.join(",")
}

/// Full pipeline: LMS text → trade → interest → checks → maker summary.
#[test]
fn full_pipeline_sofr_trade_checks_clean() {
    let state = AppState::with_rates(
        EngineConfig::default(),
        flat_rates(ymd(2023, 12, 1), ymd(2024, 3, 31)),
    );
    let ctx = state
        .process_trade(
            &lms_report("M-ABC-41056", "09/02/2024"),
            &ProcessOptions::new("Alex", ymd(2024, 2, 9)),
        )
        .unwrap();

    let result = ctx.result.as_ref().unwrap();
    assert_eq!(result.note, Note::Normal);
    assert_eq!(result.diagnostics.days, 30);
    assert_eq!(result.diagnostics.rate_sum, dec!(150));
    // (150 + 4.5 * 30) / 360 * 100,000 %
    assert_eq!(result.sme_interest, dec!(791.66));
    assert_eq!(result.funder_interest, dec!(791.66));
    assert_eq!(result.platform_fee, dec!(7.91));
    assert_eq!(result.spreading, Decimal::ZERO);

    let report = ctx.report.as_ref().unwrap();
    assert!(report.is_clean(), "unexpected findings: {}", report);

    let summary = ctx.summary.as_ref().unwrap();
    assert_eq!(summary.checker, "ok: 0.00");
    assert_eq!(summary.to_approval_row().funder_transfer(), Some(dec!(100799.57)));
}

/// Repaid five days late: overdue interest accrues unless the product
/// waives it.
#[test]
fn overdue_interest_depends_on_product() {
    let rates = flat_rates(ymd(2023, 12, 1), ymd(2024, 3, 31));
    let config = EngineConfig::default();
    let calculator = InterestCalculator::new(&rates, &config);
    let normalizer = Normalizer::default();

    let regular = normalizer.normalize_text(&lms_report("M-ABC-41056", "14/02/2024")).unwrap();
    let no_overdue = normalizer
        .normalize_text(&lms_report("M-ABC-COS-PL-41056", "14/02/2024"))
        .unwrap();

    let regular_class = Classification::of(&regular);
    let pl_class = Classification::of(&no_overdue);
    assert_eq!(regular_class.product, ProductType::Regular);
    assert_eq!(pl_class.product, ProductType::PlNoOverdue);

    let r = calculator
        .calculate(&regular, &regular_class, CalculationOptions::default())
        .unwrap();
    let p = calculator
        .calculate(&no_overdue, &pl_class, CalculationOptions::default())
        .unwrap();

    assert_eq!(r.note, Note::Overdue);
    assert_eq!(p.note, Note::Overdue);
    // (5 * 5 + 4.5 * 5) / 360 * 100,000 %
    assert_eq!(r.overdue_interest, dec!(131.94));
    assert_eq!(p.overdue_interest, Decimal::ZERO);
    assert_eq!(r.sme_interest, p.sme_interest);

    let report = ConsistencyChecker::new(&config).check(&regular, &r);
    assert_eq!(report.status, CheckStatus::Err);
}

#[test]
fn rollover_and_xdj_reach_the_calculation() {
    let state = AppState::with_rates(
        EngineConfig::default(),
        flat_rates(ymd(2023, 12, 1), ymd(2024, 3, 31)),
    );
    let mut options = ProcessOptions::new("Alex", ymd(2024, 2, 9));
    options.calculation = CalculationOptions {
        mode: AllocationMode::Xdj,
        ops: OpsType::Rollover,
    };
    let ctx = state
        .process_trade(&lms_report("M-ABC-41056", "09/02/2024"), &options)
        .unwrap();
    let result = ctx.result.unwrap();
    assert_eq!(result.mode, AllocationMode::Xdj);
    assert_eq!(result.diagnostics.repayment_date, ymd(2024, 2, 8));
    assert_eq!(result.diagnostics.days, 29);
    assert_eq!(ctx.summary.unwrap().nature, "Rollover");
}

/// Approval batch → posting lines → routed legs → bank reconciliation.
#[test]
fn transfer_batch_reconciles_against_bank_export() {
    let state = AppState::new(EngineConfig::default());
    let approval = "\
M-XXXX-41056\tRepayment\tFP0053\tUSD\t100,000.00\t791.66\t7.91\t0\t100,799.57
M-XXXX-41057\tRepayment\tFP0057\tUSD\t50,000.00\t400.00\t\t-50\t50,350.00
M-XXXX-41058\tRepayment\tFP9999\tHKD\t10,000.00\t\t\t12.5\t10,012.50
BAD-CODE\tRepayment\tFP0053\tUSD\tabc\t\t\t\t
";
    let legs = state.build_transfers(approval, ymd(2025, 6, 15)).unwrap();
    // 41056 has no spread; BAD-CODE has an unreadable principal and a blank spread
    assert_eq!(legs.len(), 6);
    assert_eq!(legs.iter().filter(|l| !l.valid).count(), 2);

    let unmapped = legs.iter().find(|l| l.trade_code == "M-XXXX-41058" && !l.valid).unwrap();
    assert_eq!(unmapped.issue, "Funder FP9999 not mapped");
    let bad = legs.iter().find(|l| l.trade_code == "BAD-CODE").unwrap();
    assert_eq!(
        bad.issue,
        "CODE missing (Trade Code must end with 5 digits); Amount not numeric"
    );

    let bank = [
        bank_line("001302691", "USD", "RPTXX41056010615", "001302895", "100,799.57"),
        bank_line("001302691", "USD", "RPTXX41057010615", "001302931", "50,400.02"),
        bank_line("001302691", "USD", "INTSP41057010615", "001302685", "50.00"),
        bank_line("001302691", "HKD", "INTSP41058010615", "001302685", "12.50"),
    ]
    .join("\n");
    let rows = state.read_bank_rows(bank.as_bytes()).unwrap();
    let report = state.reconcile(&legs, &rows);

    assert_eq!(report.rows.len(), 6);
    assert_eq!(report.count(MatchStatus::Ok), 2);
    assert_eq!(report.count(MatchStatus::AmountMismatch), 1);
    // negative spread flows from the spread account back to operations
    assert_eq!(report.count(MatchStatus::AccountDebitMismatch), 1);
    assert_eq!(report.count(MatchStatus::MissingInCsv), 2);
    assert!(!report.all_ok());
    assert!(report.to_string().starts_with("=== Bank Reconciliation ==="));
}

#[test]
fn email_summary_to_transfer_legs() {
    let email = "1. Repayment Details
Repayment Date\t20/06/2025
Trade Code\tM-XXXX-41056
Payment Currency\tUSD
Actual Received Amount\t117,472.25
2. Settlement to Funder
Funder Sub Account No.\tFP0053
Settled Loan Amount\t115,000.00
Settled Interest\t2,300.00
Settled PF\t
3. FundPark Allocation
FundPark Allocation Amount\t172.25
";
    let summary = parse_email_summary(email, ymd(2025, 6, 20), "Alex").unwrap();
    let state = AppState::new(EngineConfig::default());
    let legs = state.route_rows(&[summary.to_approval_row()], ymd(2025, 6, 20));
    assert_eq!(legs.len(), 2);
    assert!(legs.iter().all(|l| l.valid));
    assert_eq!(legs[0].amount, Some(dec!(117300.00)));
    assert_eq!(legs[1].amount, Some(dec!(172.25)));
}

/// Persist, reload and update the rate store on disk.
#[test]
fn rate_store_round_trip_and_update() {
    let path = temp_path("rates.csv");
    let store = RateStore::new(&path);
    let table = flat_rates(ymd(2024, 8, 10), ymd(2024, 8, 20));
    store.persist(&table).unwrap();

    let reloaded = store.load().unwrap();
    assert_eq!(reloaded, table);
    assert_eq!(
        reloaded.range_sum(RateColumn::Sofr, ymd(2024, 8, 10), ymd(2024, 8, 20)),
        dec!(50)
    );

    let mut state = AppState::open(EngineConfig::default(), store.clone()).unwrap();
    let sheet = "Calculation Date,SOFR (SME),HIBOR (SME)\n2024-08-19,9,9\n2024-08-21,5.1,4.1\n";
    let update = state.update_rates(sheet.as_bytes()).unwrap();
    assert_eq!(update.added, 1);
    assert_eq!(update.skipped, 1);
    assert_eq!(update.last_date, Some(ymd(2024, 8, 21)));
    assert_eq!(store.load().unwrap().len(), 12);

    let mut hibor = Vec::new();
    let rows = write_hibor_export(&mut hibor, &state.rates(), state.config().hibor_export_cutoff).unwrap();
    assert_eq!(rows, 3);

    fs::remove_file(&path).unwrap();
}

#[test]
fn config_file_overrides_defaults() {
    let path = temp_path("config.json");
    fs::write(&path, r#"{ "check_threshold": "0.5", "posting_tolerance": "0.01" }"#).unwrap();
    let config = EngineConfig::from_json_file(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(config.check_threshold, dec!(0.5));
    assert_eq!(config.posting_tolerance, dec!(0.01));
    assert_eq!(config.amount_match_tolerance, dec!(0.01));
    assert_eq!(config.cutover_date, ymd(2025, 6, 23));
}
