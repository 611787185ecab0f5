//! # Interest calculator
//!
//! Accrues SME, overdue and funder interest for one trade from its dates, the
//! flat rate and the benchmark series, then hands the figures to
//! [`allocate`](crate::calculation::allocation::allocate).
//!
//! ## Day-count branches
//!
//! With `start` the calendar interest start and `repay` the effective
//! repayment date, exactly one branch applies:
//!
//! | Note      | Condition                    | Days       | Rate sum |
//! |-----------|------------------------------|------------|----------|
//! | `Mit`     | `repay <= start + mit`       | `mit`      | `(mit - days) * fill + sum(start, repay]` |
//! | `Overdue` | `repay > drawdown + tenor`   | `days`     | `sum(start, repay]`, plus overdue over `(due, repay]` |
//! | `Normal`  | otherwise                    | `days`     | `sum(start, repay]` |
//!
//! Interest is `trunc2((rate_sum + rate * days) / 360 * principal * 1%)`.

use crate::calculation::allocation::{allocate, AllocationMode};
use crate::calculation::classify::{Classification, ProductType};
use crate::config::EngineConfig;
use crate::core::dates::{add_days, days_between, try_add_days};
use crate::core::money::truncate_2dp;
use crate::core::trade::TradeRecord;
use crate::rates::table::{RateColumn, RateTable};
use chrono::NaiveDate;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DAY_COUNT_BASIS: Decimal = dec!(360);
const PERCENT: Decimal = dec!(0.01);

#[derive(Debug, Error, PartialEq)]
pub enum CalculationError {
    #[error("no {column} rate on {date}: the minimum-interest fill needs a row for the repayment date")]
    MissingFillRate { date: NaiveDate, column: RateColumn },

    #[error("trade {drawdown_id}: no funder rate recorded and none found in '{description}'")]
    MissingFunderRate {
        drawdown_id: String,
        description: String,
    },

    #[error("trade {drawdown_id}: {field} of {days} days runs past the supported calendar")]
    DateOutOfRange {
        drawdown_id: String,
        field: &'static str,
        days: i64,
    },

    #[error("trade {drawdown_id}: interest on principal {principal} does not fit a decimal")]
    AmountOverflow { drawdown_id: String, principal: Decimal },
}

/// What the repayment is booked as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpsType {
    #[default]
    Repayment,
    /// Rolled into a new drawdown; interest stops the day before.
    Rollover,
}

impl OpsType {
    pub fn effective_repayment_date(&self, repayment_date: NaiveDate) -> NaiveDate {
        match self {
            OpsType::Repayment => repayment_date,
            OpsType::Rollover => add_days(repayment_date, -1),
        }
    }
}

impl fmt::Display for OpsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpsType::Repayment => "Repayment",
            OpsType::Rollover => "Rollover",
        })
    }
}

impl FromStr for OpsType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "repayment" => Ok(OpsType::Repayment),
            "rollover" => Ok(OpsType::Rollover),
            other => Err(format!("unknown ops type '{other}'")),
        }
    }
}

/// Day-count branch that applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Note {
    Normal,
    #[serde(rename = "MIT")]
    Mit,
    Overdue,
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Note::Normal => "Normal",
            Note::Mit => "MIT",
            Note::Overdue => "Overdue",
        })
    }
}

/// How the funder's share was accrued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunderAccrual {
    /// Same start as the SME: the funder gets SME plus overdue interest.
    SameAsSme,
    /// Funded later but before the due date.
    OwnDrawdown,
    /// Funded after the due date: regular interest counted twice.
    FundedAfterDue,
}

/// Intermediate figures behind a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub repayment_date: NaiveDate,
    pub interest_start: NaiveDate,
    pub expected_repayment_date: NaiveDate,
    pub mit_repayment_date: NaiveDate,
    pub principal_basis: Decimal,
    pub flat_rate: Decimal,
    pub days: i64,
    pub rate_sum: Decimal,
    pub overdue_days: i64,
    pub overdue_rate_sum: Decimal,
    pub funder_accrual: FunderAccrual,
}

/// Output of one calculation pass. Interest figures are truncated to cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub note: Note,
    pub classification: Classification,
    pub mode: AllocationMode,
    pub ops: OpsType,
    pub sme_interest: Decimal,
    pub overdue_interest: Decimal,
    pub funder_interest: Decimal,
    pub platform_fee: Decimal,
    pub spreading: Decimal,
    pub diagnostics: Diagnostics,
}

impl CalculationResult {
    pub fn sme_total(&self) -> Decimal {
        self.sme_interest + self.overdue_interest
    }
}

impl fmt::Display for CalculationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.diagnostics;
        writeln!(f, "=== Interest Calculation ===")?;
        writeln!(f, "Classification:    {}", self.classification)?;
        writeln!(f, "Branch:            {} ({} days, rate sum {})", self.note, d.days, d.rate_sum)?;
        writeln!(
            f,
            "Period:            {} -> {} (due {})",
            d.interest_start, d.repayment_date, d.expected_repayment_date
        )?;
        writeln!(f, "Principal basis:   {}", d.principal_basis)?;
        writeln!(f, "SME interest:      {}", self.sme_interest)?;
        writeln!(f, "Overdue interest:  {}", self.overdue_interest)?;
        writeln!(f, "Funder interest:   {}", self.funder_interest)?;
        writeln!(f, "Platform fee:      {}", self.platform_fee)?;
        write!(f, "Spreading:         {}", self.spreading)
    }
}

/// Per-pass options chosen by the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationOptions {
    pub mode: AllocationMode,
    pub ops: OpsType,
}

/// Interest for `days` at `rate` plus the benchmark sum, on an ACT/360 basis.
/// `None` when an intermediate product overflows.
fn accrue(rate_sum: Decimal, rate: Decimal, days: i64, principal: Decimal) -> Option<Decimal> {
    let rate_days = rate.checked_mul(Decimal::from(days))?.checked_add(rate_sum)?;
    let interest = (rate_days / DAY_COUNT_BASIS)
        .checked_mul(principal)?
        .checked_mul(PERCENT)?;
    Some(truncate_2dp(interest))
}

/// Computes interest against a borrowed rate table.
///
/// # Examples
///
/// ```
/// use repayment_engine::calculation::interest::{InterestCalculator, CalculationOptions, Note};
/// use repayment_engine::calculation::classify::Classification;
/// use repayment_engine::config::EngineConfig;
/// use repayment_engine::input::schema::Normalizer;
/// use repayment_engine::rates::table::RateTable;
/// use rust_decimal_macros::dec;
///
/// let report = "Payment Details
/// Drawdown ID\tM-ABC-41056
/// SME Disbursement Date\t10/01/2024
/// Repayment Date\t09/02/2024
/// SME Information
/// Tenor (Days)\t30
/// MIT (Days)\t7
/// Interest Rate (% p.a.)\t12%
/// SME Transaction
/// Principal\t100,000.00
/// Funder Information
/// Funder ID\tFP0053
/// ";
/// let trade = Normalizer::default().normalize_text(report).unwrap();
/// let rates = RateTable::new();
/// let config = EngineConfig::default();
/// let calc = InterestCalculator::new(&rates, &config);
///
/// let result = calc
///     .calculate(&trade, &Classification::of(&trade), CalculationOptions::default())
///     .unwrap();
/// assert_eq!(result.note, Note::Normal);
/// // 12% for 30 days on 100,000
/// assert_eq!(result.sme_interest, dec!(1000));
/// ```
#[derive(Debug, Clone)]
pub struct InterestCalculator<'a> {
    rates: &'a RateTable,
    cutover_date: NaiveDate,
    submission_sentinel: NaiveDate,
}

impl<'a> InterestCalculator<'a> {
    pub fn new(rates: &'a RateTable, config: &EngineConfig) -> Self {
        Self {
            rates,
            cutover_date: config.cutover_date,
            submission_sentinel: config.submission_sentinel,
        }
    }

    /// Drawdowns on or after the cutover start accruing the day before.
    pub fn calendar_date(&self, drawdown: NaiveDate) -> NaiveDate {
        if drawdown >= self.cutover_date {
            add_days(drawdown, -1)
        } else {
            drawdown
        }
    }

    fn range_sum(&self, column: RateColumn, floating: bool, from: NaiveDate, to: NaiveDate) -> Decimal {
        if floating {
            self.rates.range_sum(column, from, to)
        } else {
            Decimal::ZERO
        }
    }

    pub fn calculate(
        &self,
        trade: &TradeRecord,
        classification: &Classification,
        options: CalculationOptions,
    ) -> Result<CalculationResult, CalculationError> {
        let repay = options.ops.effective_repayment_date(trade.repayment_date);
        let rate = trade
            .effective_funder_rate()
            .ok_or_else(|| CalculationError::MissingFunderRate {
                drawdown_id: trade.drawdown_id.clone(),
                description: trade.rate_description.clone(),
            })?;

        let shift = |date: NaiveDate, days: i64, field: &'static str| {
            try_add_days(date, days).ok_or_else(|| CalculationError::DateOutOfRange {
                drawdown_id: trade.drawdown_id.clone(),
                field,
                days,
            })
        };
        let sme_calendar = self.calendar_date(trade.sme_drawdown);
        let expected = shift(trade.sme_drawdown, trade.tenor_days, "tenor")?;
        let mit_repayment_date = shift(sme_calendar, trade.mit_days, "MIT")?;

        let (principal, start) = if classification.product == ProductType::Rfpo {
            let start = if trade.last_funder_submission != self.submission_sentinel {
                trade.last_funder_submission
            } else {
                sme_calendar
            };
            (trade.outstanding_principal, start)
        } else {
            (trade.principal, sme_calendar)
        };

        let column = classification.rate.column();
        let floating = classification.rate.is_floating();

        let mut days = days_between(start, repay);
        let mut rate_sum = self.range_sum(column, floating, start, repay);
        let mut overdue_days = 0;
        let mut overdue_rate_sum = Decimal::ZERO;

        let note = if repay <= mit_repayment_date {
            let fill = if floating {
                self.rates
                    .rate_on(column, repay)
                    .ok_or(CalculationError::MissingFillRate { date: repay, column })?
            } else {
                Decimal::ZERO
            };
            rate_sum += Decimal::from(trade.mit_days - days) * fill;
            days = trade.mit_days;
            Note::Mit
        } else if repay > expected {
            overdue_days = days_between(expected, repay);
            overdue_rate_sum = self.range_sum(column, floating, expected, repay);
            Note::Overdue
        } else {
            Note::Normal
        };
        debug!(
            "{}: {} branch, {} days, rate sum {}, overdue {} days / {}",
            trade.drawdown_id, note, days, rate_sum, overdue_days, overdue_rate_sum
        );

        let overflow = || CalculationError::AmountOverflow {
            drawdown_id: trade.drawdown_id.clone(),
            principal,
        };
        let sme_interest = accrue(rate_sum, rate, days, principal).ok_or_else(overflow)?;
        let overdue_interest = if note == Note::Overdue && classification.product.accrues_overdue() {
            accrue(overdue_rate_sum, rate, overdue_days, principal).ok_or_else(overflow)?
        } else {
            Decimal::ZERO
        };
        let sme_total = sme_interest.checked_add(overdue_interest).ok_or_else(overflow)?;

        let funder_calendar = self.calendar_date(trade.funder_drawdown);
        let (funder_accrual, funder_gross) =
            if classification.product == ProductType::Rfpo || funder_calendar == start {
                (FunderAccrual::SameAsSme, sme_total)
            } else {
                let funder_days = days_between(funder_calendar, repay);
                let funder_sum = self.range_sum(column, floating, funder_calendar, repay);
                let regular = accrue(funder_sum, rate, funder_days, principal).ok_or_else(overflow)?;
                if trade.funder_drawdown <= expected {
                    let gross = regular.checked_add(overdue_interest).ok_or_else(overflow)?;
                    (FunderAccrual::OwnDrawdown, gross)
                } else {
                    warn!(
                        "{}: funder drawdown {} is after the due date {}; funder interest doubled",
                        trade.drawdown_id, trade.funder_drawdown, expected
                    );
                    let doubled = regular.checked_mul(dec!(2)).ok_or_else(overflow)?;
                    (FunderAccrual::FundedAfterDue, doubled)
                }
            };

        let allocation = allocate(
            trade,
            classification.funder,
            options.mode,
            sme_interest,
            overdue_interest,
            funder_gross,
        );

        info!(
            "{} calculated [{}]: sme {} overdue {} funder {} spread {}",
            trade.drawdown_id,
            note,
            sme_interest,
            overdue_interest,
            allocation.funder_interest,
            allocation.spreading
        );

        Ok(CalculationResult {
            note,
            classification: *classification,
            mode: options.mode,
            ops: options.ops,
            sme_interest,
            overdue_interest,
            funder_interest: allocation.funder_interest,
            platform_fee: allocation.platform_fee,
            spreading: allocation.spreading,
            diagnostics: Diagnostics {
                repayment_date: repay,
                interest_start: start,
                expected_repayment_date: expected,
                mit_repayment_date,
                principal_basis: principal,
                flat_rate: rate,
                days,
                rate_sum,
                overdue_days,
                overdue_rate_sum,
                funder_accrual,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::classify::{FunderType, RateType};
    use crate::core::dates::ymd;
    use crate::core::funder::FunderId;
    use crate::core::trade::fixtures::sample_trade;
    use crate::rates::table::RateRecord;

    /// SOFR at 5.00 every day, HIBOR at 4.00, through 2025.
    fn flat_rates() -> RateTable {
        let mut date = ymd(2023, 12, 1);
        let mut records = Vec::new();
        while date <= ymd(2025, 12, 31) {
            records.push(RateRecord::new(date, dec!(5), dec!(4)));
            date = add_days(date, 1);
        }
        RateTable::from_records(records)
    }

    fn run(trade: &TradeRecord, rates: &RateTable) -> CalculationResult {
        InterestCalculator::new(rates, &EngineConfig::default())
            .calculate(trade, &Classification::of(trade), CalculationOptions::default())
            .unwrap()
    }

    #[test]
    fn test_due_date_repayment_is_normal() {
        let rates = flat_rates();
        let result = run(&sample_trade(), &rates);
        assert_eq!(result.note, Note::Normal);
        assert_eq!(result.diagnostics.days, 30);
        assert_eq!(result.diagnostics.rate_sum, dec!(150));
        // (150 + 4.5 * 30) / 360 * 100000 * 0.01 = 791.666..
        assert_eq!(result.sme_interest, dec!(791.66));
        assert_eq!(result.overdue_interest, Decimal::ZERO);
        assert_eq!(result.funder_interest, dec!(791.66));
        assert_eq!(result.diagnostics.funder_accrual, FunderAccrual::SameAsSme);
    }

    #[test]
    fn test_five_days_overdue_regular() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.repayment_date = ymd(2024, 2, 14);
        let result = run(&trade, &rates);
        assert_eq!(result.note, Note::Overdue);
        assert_eq!(result.diagnostics.overdue_days, 5);
        // (25 + 22.5) / 360 * 1000 = 131.944..
        assert_eq!(result.overdue_interest, dec!(131.94));
        assert_eq!(result.funder_interest, result.sme_interest + dec!(131.94));
    }

    #[test]
    fn test_five_days_overdue_no_overdue_product() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.repayment_date = ymd(2024, 2, 14);
        trade.drawdown_id = "M-ABC-COS-PL-41056".to_string();
        let result = run(&trade, &rates);
        assert_eq!(result.classification.product, ProductType::PlNoOverdue);
        assert_eq!(result.note, Note::Overdue);
        assert_eq!(result.overdue_interest, Decimal::ZERO);
    }

    #[test]
    fn test_mit_branch_fills_minimum_days() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.repayment_date = ymd(2024, 1, 13);
        let result = run(&trade, &rates);
        assert_eq!(result.note, Note::Mit);
        assert_eq!(result.diagnostics.days, 7);
        // 3 observed days plus 4 filled at the repayment-date rate
        assert_eq!(result.diagnostics.rate_sum, dec!(35));
        // (35 + 31.5) / 360 * 1000 = 184.722..
        assert_eq!(result.sme_interest, dec!(184.72));
    }

    #[test]
    fn test_mit_without_fill_rate_fails() {
        let rates = RateTable::from_records(vec![RateRecord::new(ymd(2024, 1, 11), dec!(5), dec!(4))]);
        let mut trade = sample_trade();
        trade.repayment_date = ymd(2024, 1, 13);
        let err = InterestCalculator::new(&rates, &EngineConfig::default())
            .calculate(&trade, &Classification::of(&trade), CalculationOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            CalculationError::MissingFillRate {
                date: ymd(2024, 1, 13),
                column: RateColumn::Sofr
            }
        );
    }

    #[test]
    fn test_fixed_rate_ignores_benchmark() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.rate_description = "12% p.a.".to_string();
        trade.funder_interest_rate = Decimal::ZERO;
        let result = run(&trade, &rates);
        assert_eq!(result.classification.rate, RateType::Fixed);
        assert_eq!(result.diagnostics.rate_sum, Decimal::ZERO);
        assert_eq!(result.sme_interest, dec!(1000));
    }

    #[test]
    fn test_hibor_reads_hibor_column() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.rate_description = "HIBOR + 4.5%".to_string();
        let result = run(&trade, &rates);
        assert_eq!(result.diagnostics.rate_sum, dec!(120));
    }

    #[test]
    fn test_cutover_shifts_interest_start() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.sme_drawdown = ymd(2025, 6, 23);
        trade.funder_drawdown = ymd(2025, 6, 23);
        trade.repayment_date = ymd(2025, 7, 23);
        let result = run(&trade, &rates);
        assert_eq!(result.diagnostics.interest_start, ymd(2025, 6, 22));
        assert_eq!(result.diagnostics.days, 31);
        // due date is counted from the uncalendared drawdown
        assert_eq!(result.diagnostics.expected_repayment_date, ymd(2025, 7, 23));
        assert_eq!(result.note, Note::Normal);
    }

    #[test]
    fn test_rollover_stops_a_day_early() {
        let rates = flat_rates();
        let trade = sample_trade();
        let result = InterestCalculator::new(&rates, &EngineConfig::default())
            .calculate(
                &trade,
                &Classification::of(&trade),
                CalculationOptions {
                    ops: OpsType::Rollover,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(result.diagnostics.repayment_date, ymd(2024, 2, 8));
        assert_eq!(result.diagnostics.days, 29);
    }

    #[test]
    fn test_rfpo_uses_outstanding_and_submission_date() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.drawdown_id = "M-ABC-IMP-RF-41056".to_string();
        trade.outstanding_principal = dec!(50000);
        trade.last_funder_submission = ymd(2024, 1, 20);
        let result = run(&trade, &rates);
        assert_eq!(result.diagnostics.principal_basis, dec!(50000));
        assert_eq!(result.diagnostics.interest_start, ymd(2024, 1, 20));
        assert_eq!(result.diagnostics.days, 20);
        assert_eq!(result.funder_interest, result.sme_interest);
    }

    #[test]
    fn test_later_funder_drawdown_accrues_separately() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.funder_drawdown = ymd(2024, 1, 20);
        let result = run(&trade, &rates);
        assert_eq!(result.diagnostics.funder_accrual, FunderAccrual::OwnDrawdown);
        // 20 days: (100 + 90) / 360 * 1000 = 527.77..
        assert_eq!(result.funder_interest, dec!(527.77));
    }

    #[test]
    fn test_funder_drawdown_after_due_is_doubled() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.repayment_date = ymd(2024, 2, 19);
        trade.funder_drawdown = ymd(2024, 2, 12);
        let result = run(&trade, &rates);
        assert_eq!(result.diagnostics.funder_accrual, FunderAccrual::FundedAfterDue);
        // 7 days: (35 + 31.5) / 360 * 1000 = 184.72, doubled
        assert_eq!(result.funder_interest, dec!(369.44));
    }

    #[test]
    fn test_zero_funder_forced_to_zero() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.funder_id = FunderId::new("FP0000");
        let result = run(&trade, &rates);
        assert_eq!(result.classification.funder, FunderType::Zero);
        assert_eq!(result.funder_interest, Decimal::ZERO);
        assert_eq!(result.spreading, result.sme_interest);
    }

    #[test]
    fn test_missing_funder_rate() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.funder_interest_rate = Decimal::ZERO;
        trade.rate_description = "SOFR".to_string();
        let err = InterestCalculator::new(&rates, &EngineConfig::default())
            .calculate(&trade, &Classification::of(&trade), CalculationOptions::default())
            .unwrap_err();
        assert!(matches!(err, CalculationError::MissingFunderRate { .. }));
    }

    #[test]
    fn test_tenor_past_calendar_is_an_error() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.tenor_days = 99_999_999_999;
        let err = InterestCalculator::new(&rates, &EngineConfig::default())
            .calculate(&trade, &Classification::of(&trade), CalculationOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            CalculationError::DateOutOfRange {
                drawdown_id: trade.drawdown_id.clone(),
                field: "tenor",
                days: 99_999_999_999,
            }
        );

        let mut trade = sample_trade();
        trade.mit_days = -99_999_999_999;
        let err = InterestCalculator::new(&rates, &EngineConfig::default())
            .calculate(&trade, &Classification::of(&trade), CalculationOptions::default())
            .unwrap_err();
        assert!(matches!(err, CalculationError::DateOutOfRange { field: "MIT", .. }));
    }

    #[test]
    fn test_huge_principal_overflows_cleanly() {
        let rates = flat_rates();
        let mut trade = sample_trade();
        trade.principal = Decimal::MAX;
        let err = InterestCalculator::new(&rates, &EngineConfig::default())
            .calculate(&trade, &Classification::of(&trade), CalculationOptions::default())
            .unwrap_err();
        assert!(matches!(err, CalculationError::AmountOverflow { .. }));
    }
}
