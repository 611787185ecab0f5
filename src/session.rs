//! Application state and the per-trade working context.
//!
//! [`AppState`] is the only long-lived piece: the retained rate table, the
//! store it came from, and the configuration. Everything produced while
//! working on one trade lives in a [`TradeContext`] that the caller owns and
//! can reset.

use crate::calculation::classify::{Classification, ClassificationOverrides};
use crate::calculation::interest::{CalculationError, CalculationOptions, CalculationResult, InterestCalculator};
use crate::checker::consistency::{ConsistencyChecker, ConsistencyReport};
use crate::checker::summary::MakerSummary;
use crate::config::EngineConfig;
use crate::core::dates::format_iso;
use crate::core::trade::TradeRecord;
use crate::input::schema::{NormalizeError, Normalizer};
use crate::rates::storage::{read_update_sheet, RateError, RateStore};
use crate::rates::table::RateTable;
use crate::transfer::approval::{parse_approval_text, ApprovalError, ApprovalRow};
use crate::transfer::bank_csv::{parse_bank_csv, BankCsvError, BankCsvRow};
use crate::transfer::posting::build_posting_lines;
use crate::transfer::reconcile::{ReconciliationReport, Reconciler};
use crate::transfer::routing::{route_all, TransferLeg};
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rates(#[from] RateError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    BankCsv(#[from] BankCsvError),
}

/// What the operator chose for one trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOptions {
    pub calculation: CalculationOptions,
    pub overrides: ClassificationOverrides,
    pub maker: String,
    /// Date stamped on the maker summary.
    pub date: NaiveDate,
}

impl ProcessOptions {
    pub fn new(maker: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            calculation: CalculationOptions::default(),
            overrides: ClassificationOverrides::default(),
            maker: maker.into(),
            date,
        }
    }
}

/// Working state of one trade, filled stage by stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeContext {
    pub run_id: Uuid,
    pub trade: Option<TradeRecord>,
    pub classification: Option<Classification>,
    pub result: Option<CalculationResult>,
    pub report: Option<ConsistencyReport>,
    pub summary: Option<MakerSummary>,
}

impl Default for TradeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TradeContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            trade: None,
            classification: None,
            result: None,
            report: None,
            summary: None,
        }
    }

    /// Forget the trade and start a fresh run.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_complete(&self) -> bool {
        self.summary.is_some()
    }
}

/// Rates after an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateUpdate {
    pub added: usize,
    pub skipped: usize,
    pub rows: usize,
    pub last_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct AppState {
    rates: Arc<RateTable>,
    store: Option<RateStore>,
    config: EngineConfig,
}

impl AppState {
    /// State with an empty table and no store.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_rates(config, RateTable::new())
    }

    pub fn with_rates(config: EngineConfig, rates: RateTable) -> Self {
        Self {
            rates: Arc::new(rates),
            store: None,
            config,
        }
    }

    /// Load the table from `store` and keep the store for later updates.
    pub fn open(config: EngineConfig, store: RateStore) -> Result<Self, SessionError> {
        let rates = store.load()?;
        Ok(Self {
            rates: Arc::new(rates),
            store: Some(store),
            config,
        })
    }

    /// Open the store named in the configuration, if any.
    pub fn from_config(config: EngineConfig) -> Result<Self, SessionError> {
        match config.rate_store.clone() {
            Some(path) => Self::open(config, RateStore::new(path)),
            None => Ok(Self::new(config)),
        }
    }

    /// Current table. Holders keep their snapshot across later updates.
    pub fn rates(&self) -> Arc<RateTable> {
        Arc::clone(&self.rates)
    }

    pub fn store(&self) -> Option<&RateStore> {
        self.store.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Merge an uploaded sheet. The merged table is persisted first and only
    /// then becomes current; on failure the current table is untouched.
    pub fn update_rates<R: Read>(&mut self, sheet: R) -> Result<RateUpdate, SessionError> {
        let outcome = match &self.store {
            Some(store) => store.apply_update(&self.rates, sheet)?,
            None => {
                warn!("no rate store configured; update kept in memory only");
                self.rates.merge(read_update_sheet(sheet)?)
            }
        };
        let update = RateUpdate {
            added: outcome.added,
            skipped: outcome.skipped,
            rows: outcome.table.len(),
            last_date: outcome.table.max_date(),
        };
        self.rates = Arc::new(outcome.table);
        info!(
            "rates now end {}",
            update.last_date.map(format_iso).unwrap_or_else(|| "nowhere".to_string())
        );
        Ok(update)
    }

    /// Normalize, classify, calculate, check and summarise one LMS report.
    pub fn process_trade(&self, text: &str, options: &ProcessOptions) -> Result<TradeContext, SessionError> {
        let mut context = TradeContext::new();
        let run = context.run_id;

        let trade = Normalizer::new(self.config.submission_sentinel).normalize_text(text)?;
        let classification = Classification::of(&trade).with_overrides(&options.overrides);
        if !options.overrides.is_empty() {
            info!("[{}] {} classification overridden to {}", run, trade.drawdown_id, classification);
        }

        let rates = self.rates();
        let result = InterestCalculator::new(&rates, &self.config).calculate(
            &trade,
            &classification,
            options.calculation,
        )?;
        let report = ConsistencyChecker::new(&self.config).check(&trade, &result);
        let summary = MakerSummary::from_calculation(&trade, &result, &report, &options.maker, options.date);
        info!("[{}] {} done: {}", run, trade.drawdown_id, report.summary_label());

        context.trade = Some(trade);
        context.classification = Some(classification);
        context.result = Some(result);
        context.report = Some(report);
        context.summary = Some(summary);
        Ok(context)
    }

    /// Approved rows to routed transfer legs.
    pub fn build_transfers(&self, approval_text: &str, posting_date: NaiveDate) -> Result<Vec<TransferLeg>, SessionError> {
        let rows = parse_approval_text(approval_text)?;
        Ok(self.route_rows(&rows, posting_date))
    }

    /// Routed legs for rows already in hand, such as a maker summary's.
    pub fn route_rows(&self, rows: &[ApprovalRow], posting_date: NaiveDate) -> Vec<TransferLeg> {
        let lines = build_posting_lines(rows, posting_date, self.config.posting_tolerance);
        let legs = route_all(&lines, &self.config.routing, self.config.posting_tolerance);
        info!(
            "{} approval row(s) -> {} leg(s), {} invalid",
            rows.len(),
            legs.len(),
            legs.iter().filter(|l| !l.valid).count()
        );
        legs
    }

    pub fn read_bank_rows<R: Read>(&self, reader: R) -> Result<Vec<BankCsvRow>, SessionError> {
        Ok(parse_bank_csv(reader, &self.config.bank_csv_layout)?)
    }

    pub fn reconcile(&self, legs: &[TransferLeg], bank_rows: &[BankCsvRow]) -> ReconciliationReport {
        Reconciler::new(self.config.amount_match_tolerance).reconcile(legs, bank_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::classify::FunderType;
    use crate::calculation::interest::OpsType;
    use crate::checker::consistency::CheckStatus;
    use crate::core::dates::ymd;
    use crate::rates::table::RateRecord;
    use crate::transfer::bank_csv::fixtures::bank_line;
    use crate::transfer::reconcile::MatchStatus;
    use rust_decimal_macros::dec;

    const FIXED_RATE_REPORT: &str = "Payment Details
Drawdown ID\tM-ABC-41056
Repayment Currency\tUSD
SME Disbursement Date\t10/01/2024
Repayment Date\t09/02/2024
Repayment Amount\t101,000.00
SME Information
Tenor (Days)\t30
MIT (Days)\t7
Interest Rate (% p.a.)\t12%
SME Transaction
Outstanding Principal\t100,000.00
Principal\t100,000.00
Interest\t1,000.00
Funder Information
Funder ID\tFP0053
Funder Transaction
Interest (I + OI)\t1,000.00
";

    fn state() -> AppState {
        AppState::new(EngineConfig::default())
    }

    #[test]
    fn test_process_trade_fills_context() {
        let ctx = state()
            .process_trade(FIXED_RATE_REPORT, &ProcessOptions::new("Alex", ymd(2024, 2, 9)))
            .unwrap();
        assert!(ctx.is_complete());
        let result = ctx.result.as_ref().unwrap();
        assert_eq!(result.sme_interest, dec!(1000));
        assert_eq!(result.funder_interest, dec!(1000));
        assert_eq!(ctx.report.as_ref().unwrap().status, CheckStatus::Ok);
        assert_eq!(ctx.summary.as_ref().unwrap().checker, "ok: 0.00");
    }

    #[test]
    fn test_overrides_and_ops_reach_calculation() {
        let mut options = ProcessOptions::new("Alex", ymd(2024, 2, 9));
        options.overrides.funder = Some(FunderType::Zero);
        options.calculation.ops = OpsType::Rollover;
        let ctx = state().process_trade(FIXED_RATE_REPORT, &options).unwrap();
        let result = ctx.result.unwrap();
        assert_eq!(result.classification.funder, FunderType::Zero);
        assert_eq!(result.funder_interest, dec!(0));
        assert_eq!(result.diagnostics.repayment_date, ymd(2024, 2, 8));
    }

    #[test]
    fn test_reset_starts_new_run() {
        let mut ctx = state()
            .process_trade(FIXED_RATE_REPORT, &ProcessOptions::new("Alex", ymd(2024, 2, 9)))
            .unwrap();
        let old = ctx.run_id;
        ctx.reset();
        assert_ne!(ctx.run_id, old);
        assert!(ctx.trade.is_none());
        assert!(!ctx.is_complete());
    }

    #[test]
    fn test_missing_fields_surface_as_error() {
        let err = state()
            .process_trade("Payment Details\nDrawdown ID\tM-1\n", &ProcessOptions::new("A", ymd(2024, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, SessionError::Normalize(NormalizeError::Fields(_))));
    }

    #[test]
    fn test_tenor_beyond_calendar_is_an_error() {
        let report = FIXED_RATE_REPORT.replace("Tenor (Days)\t30", "Tenor (Days)\t99999999999");
        let err = state()
            .process_trade(&report, &ProcessOptions::new("A", ymd(2024, 2, 9)))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Calculation(CalculationError::DateOutOfRange { field: "tenor", .. })
        ));
    }

    #[test]
    fn test_update_swaps_table_but_keeps_snapshots() {
        let mut app = AppState::with_rates(
            EngineConfig::default(),
            RateTable::from_records(vec![RateRecord::new(ymd(2024, 1, 1), dec!(5), dec!(4))]),
        );
        let snapshot = app.rates();
        let sheet = "Calculation Date,SOFR (SME),HIBOR (SME)\n2024-01-02,5.1,4.1\n";
        let update = app.update_rates(sheet.as_bytes()).unwrap();
        assert_eq!(update.added, 1);
        assert_eq!(update.rows, 2);
        assert_eq!(update.last_date, Some(ymd(2024, 1, 2)));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(app.rates().len(), 2);
    }

    #[test]
    fn test_failed_update_keeps_table() {
        let mut app = state();
        assert!(app.update_rates("Calculation Date,SOFR\n".as_bytes()).is_err());
        assert!(app.rates().is_empty());
    }

    #[test]
    fn test_transfers_and_reconciliation() {
        let app = state();
        let legs = app
            .build_transfers(
                "M-XXXX-41056\tRepayment\tFP0053\tUSD\t100,000.00\t1,000.00\t\t-50\t101,000.00\n",
                ymd(2025, 6, 15),
            )
            .unwrap();
        assert_eq!(legs.len(), 2);
        assert!(legs.iter().all(|l| l.valid));

        let bank = format!(
            "{}\n",
            bank_line("001302691", "USD", "RPTXX41056010615", "001302895", "101,000.00", "M-XXXX-41056")
        );
        let rows = app.read_bank_rows(bank.as_bytes()).unwrap();
        let report = app.reconcile(&legs, &rows);
        assert_eq!(report.count(MatchStatus::Ok), 1);
        assert_eq!(report.count(MatchStatus::MissingInCsv), 1);
    }
}
