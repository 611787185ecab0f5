//! Comparing computed figures with the ones the LMS recorded.
//!
//! Three quantities are compared against a strict threshold and five business
//! rules are evaluated. Every rule is checked; none stops the others, and none
//! blocks the output. A breach is a finding for the reviewer, not an error.

use crate::calculation::classify::FunderType;
use crate::calculation::interest::CalculationResult;
use crate::config::EngineConfig;
use crate::core::money::round_2dp;
use crate::core::trade::TradeRecord;
use log::{info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Err,
}

impl CheckStatus {
    /// `ok` only when the gap is strictly below the threshold.
    pub fn of_gap(gap: Decimal, threshold: Decimal) -> Self {
        if gap < threshold {
            CheckStatus::Ok
        } else {
            CheckStatus::Err
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Err => "err",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantity {
    /// SME interest plus overdue interest.
    SmeTotal,
    FunderInterest,
    Spreading,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quantity::SmeTotal => "SME",
            Quantity::FunderInterest => "Funder",
            Quantity::Spreading => "Spreading",
        })
    }
}

/// One computed-versus-recorded comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityCheck {
    pub quantity: Quantity,
    pub calculated: Decimal,
    pub recorded: Decimal,
    /// `|calculated - recorded|`, unrounded.
    pub gap: Decimal,
    /// `calculated - recorded`, rounded to cents.
    pub difference: Decimal,
    pub status: CheckStatus,
}

impl fmt::Display for QuantityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.2}", self.status, self.difference)
    }
}

/// Range in which `outstanding - principal` signals a settlement that left a
/// small balance behind. Both bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettlementBand {
    pub lower: Decimal,
    pub upper: Decimal,
}

impl Default for SettlementBand {
    fn default() -> Self {
        Self {
            lower: dec!(0.01),
            upper: dec!(10),
        }
    }
}

impl SettlementBand {
    pub fn contains(&self, value: Decimal) -> bool {
        value > self.lower && value < self.upper
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Warning {
    PartialSettlement {
        outstanding_principal: Decimal,
        principal: Decimal,
    },
    CashFlowMismatch {
        left: Decimal,
        right: Decimal,
    },
    ReturnToBorrower {
        amount: Decimal,
    },
    MainFunderWithoutInterest,
    ZeroFunderWithInterest {
        amount: Decimal,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PartialSettlement {
                outstanding_principal,
                principal,
            } => write!(
                f,
                "Fully settle failed: outstanding principal {} exceeds principal {} by less than 10",
                outstanding_principal, principal
            ),
            Warning::CashFlowMismatch { left, right } => write!(
                f,
                "Cash flow mismatch: principal + funder interest - platform fee + spreading = {} but repayment - bank charge = {}",
                left.round_dp(2),
                right.round_dp(2)
            ),
            Warning::ReturnToBorrower { amount } => {
                write!(f, "Return to borrower should be 0, but is {}", amount)
            }
            Warning::MainFunderWithoutInterest => write!(
                f,
                "Funder code violation: funder type is 'Main' but funder interest is 0"
            ),
            Warning::ZeroFunderWithInterest { amount } => write!(
                f,
                "Funder code violation: funder type is 'Zero' but funder interest is {}",
                amount
            ),
        }
    }
}

/// Outcome of checking one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// SME, funder and spreading, in that order.
    pub checks: Vec<QuantityCheck>,
    pub warnings: Vec<Warning>,
    /// Largest of the three gaps.
    pub max_gap: Decimal,
    pub status: CheckStatus,
}

impl ConsistencyReport {
    pub fn check(&self, quantity: Quantity) -> Option<&QuantityCheck> {
        self.checks.iter().find(|c| c.quantity == quantity)
    }

    /// `"ok: 0.01"` style label over the worst gap.
    pub fn summary_label(&self) -> String {
        format!("{}: {:.2}", self.status, round_2dp(self.max_gap))
    }

    pub fn is_clean(&self) -> bool {
        self.status == CheckStatus::Ok && self.warnings.is_empty()
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Consistency Check ===")?;
        for check in &self.checks {
            writeln!(
                f,
                "{:<10} {} (calculated {}, recorded {})",
                format!("{}:", check.quantity),
                check,
                check.calculated,
                check.recorded
            )?;
        }
        write!(f, "Overall:   {}", self.summary_label())?;
        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f)?;
            write!(f, "Warnings ({}):", self.warnings.len())?;
            for warning in &self.warnings {
                writeln!(f)?;
                write!(f, "  - {}", warning)?;
            }
        }
        Ok(())
    }
}

/// Cross-checks a [`CalculationResult`] against the recorded trade.
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    threshold: Decimal,
    cash_flow_tolerance: Decimal,
    settlement_band: SettlementBand,
}

impl Default for ConsistencyChecker {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ConsistencyChecker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            threshold: config.check_threshold,
            cash_flow_tolerance: config.cash_flow_tolerance,
            settlement_band: config.partial_settlement_band,
        }
    }

    pub fn compare(&self, quantity: Quantity, calculated: Decimal, recorded: Decimal) -> QuantityCheck {
        let gap = (calculated - recorded).abs();
        QuantityCheck {
            quantity,
            calculated,
            recorded,
            gap,
            difference: round_2dp(calculated - recorded),
            status: CheckStatus::of_gap(gap, self.threshold),
        }
    }

    pub fn warnings(&self, trade: &TradeRecord, result: &CalculationResult) -> Vec<Warning> {
        let mut warnings = Vec::new();

        if self
            .settlement_band
            .contains(trade.outstanding_principal - trade.principal)
        {
            warnings.push(Warning::PartialSettlement {
                outstanding_principal: trade.outstanding_principal,
                principal: trade.principal,
            });
        }

        let left = trade.principal + trade.funder_recorded_interest - result.platform_fee
            + trade.spreading_recorded;
        let right = trade.repayment_amount - trade.bank_charge;
        if (left - right).abs() > self.cash_flow_tolerance {
            warnings.push(Warning::CashFlowMismatch { left, right });
        }

        if !trade.return_to_borrower.is_zero() {
            warnings.push(Warning::ReturnToBorrower {
                amount: trade.return_to_borrower,
            });
        }

        match result.classification.funder {
            FunderType::Main if trade.funder_recorded_interest.is_zero() => {
                warnings.push(Warning::MainFunderWithoutInterest)
            }
            FunderType::Zero if !trade.funder_recorded_interest.is_zero() => {
                warnings.push(Warning::ZeroFunderWithInterest {
                    amount: trade.funder_recorded_interest,
                })
            }
            _ => {}
        }

        warnings
    }

    pub fn check(&self, trade: &TradeRecord, result: &CalculationResult) -> ConsistencyReport {
        let checks = vec![
            self.compare(Quantity::SmeTotal, result.sme_total(), trade.sme_recorded_total()),
            self.compare(
                Quantity::FunderInterest,
                result.funder_interest,
                trade.funder_recorded_interest,
            ),
            self.compare(Quantity::Spreading, result.spreading, trade.spreading_recorded),
        ];
        let max_gap = checks
            .iter()
            .map(|c| c.gap)
            .max()
            .unwrap_or(Decimal::ZERO);
        let status = CheckStatus::of_gap(max_gap, self.threshold);
        let warnings = self.warnings(trade, result);

        for warning in &warnings {
            warn!("{}: {}", trade.drawdown_id, warning);
        }
        info!(
            "{} checked: {} with {} warning(s)",
            trade.drawdown_id,
            status,
            warnings.len()
        );

        ConsistencyReport {
            checks,
            warnings,
            max_gap,
            status,
        }
    }
}
