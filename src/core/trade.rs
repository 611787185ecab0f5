use crate::core::currency::CurrencyCode;
use crate::core::funder::FunderId;
use crate::core::money::last_number_in;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A normalized repayment of one loan drawdown.
///
/// Built once per trade entry by the normalizer and read-only afterwards.
/// Amounts are signed as recorded upstream except waived items, which are
/// always stored as non-positive costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub drawdown_id: String,
    pub funder_id: FunderId,
    pub currency: CurrencyCode,
    /// Free-text rate description, e.g. `"SOFR + 4.25%"`.
    pub rate_description: String,

    pub sme_drawdown: NaiveDate,
    pub funder_drawdown: NaiveDate,
    /// Sentinel 1999-01-01 when the report carries no submission date.
    pub last_funder_submission: NaiveDate,
    pub repayment_date: NaiveDate,

    pub tenor_days: i64,
    pub mit_days: i64,

    pub repayment_amount: Decimal,
    pub outstanding_principal: Decimal,
    pub principal: Decimal,
    pub bank_charge: Decimal,

    /// SME interest recorded by the upstream system.
    pub sme_recorded_interest: Decimal,
    /// SME overdue interest recorded by the upstream system.
    pub sme_recorded_overdue_interest: Decimal,
    pub return_to_borrower: Decimal,

    pub waived_bank_charge: Decimal,
    pub waived_sme_interest: Decimal,
    pub waived_sme_overdue_interest: Decimal,
    pub surcharge_total: Decimal,

    pub funder_recorded_interest: Decimal,
    /// Flat funder rate in % p.a.; zero when the report left it blank.
    pub funder_interest_rate: Decimal,
    /// Non-positive; nonzero only flags that a platform fee applies.
    pub platform_fee: Decimal,
    pub funder_allocation: Decimal,
    pub spreading_recorded: Decimal,
}

impl TradeRecord {
    /// The flat rate that drives the computation.
    ///
    /// Falls back to the last number in the rate description when no funder
    /// rate was recorded.
    pub fn effective_funder_rate(&self) -> Option<Decimal> {
        if !self.funder_interest_rate.is_zero() {
            Some(self.funder_interest_rate)
        } else {
            last_number_in(&self.rate_description)
        }
    }

    /// Total SME interest recorded upstream (regular plus overdue).
    pub fn sme_recorded_total(&self) -> Decimal {
        self.sme_recorded_interest + self.sme_recorded_overdue_interest
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample_trade;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_recorded_funder_rate_wins() {
        let trade = sample_trade();
        assert_eq!(trade.effective_funder_rate(), Some(dec!(4.5)));
    }

    #[test]
    fn test_rate_falls_back_to_description() {
        let mut trade = sample_trade();
        trade.funder_interest_rate = Decimal::ZERO;
        trade.rate_description = "SOFR + 3.75%".to_string();
        assert_eq!(trade.effective_funder_rate(), Some(dec!(3.75)));

        trade.rate_description = "SOFR".to_string();
        assert_eq!(trade.effective_funder_rate(), None);
    }
}
