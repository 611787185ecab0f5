//! The one-row maker summary handed to the approval sheet.

use crate::calculation::interest::CalculationResult;
use crate::checker::consistency::ConsistencyReport;
use crate::core::dates::format_iso;
use crate::core::money::AmountCell;
use crate::core::trade::TradeRecord;
use crate::transfer::approval::ApprovalRow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SUMMARY_COLUMNS: [&str; 14] = [
    "Date",
    "Nature",
    "Maker",
    "Repayment Date",
    "Drawdown ID",
    "Funder Code",
    "Currency",
    "Principal",
    "Interest",
    "Platform Fee",
    "Spreading",
    "Sub",
    "Total Amount",
    "Checker",
];

/// Nature recorded for settlements parsed from an email.
pub const EMAIL_NATURE: &str = "FP2.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakerSummary {
    pub date: NaiveDate,
    pub nature: String,
    pub maker: String,
    /// Kept as text: email summaries carry it verbatim.
    pub repayment_date: String,
    pub drawdown_id: String,
    pub funder_code: String,
    pub currency: String,
    pub principal: AmountCell,
    /// Funder interest as recorded.
    pub interest: AmountCell,
    /// Platform fee as computed.
    pub platform_fee: AmountCell,
    /// Spreading as recorded.
    pub spreading: AmountCell,
    /// Bank charge deducted from the receipt.
    pub sub: AmountCell,
    pub total_amount: AmountCell,
    pub checker: String,
}

impl MakerSummary {
    /// Summary of a checked calculation. Recorded figures are reported so the
    /// approver books what the LMS holds; the checker label shows how far the
    /// calculation disagreed.
    pub fn from_calculation(
        trade: &TradeRecord,
        result: &CalculationResult,
        report: &ConsistencyReport,
        maker: &str,
        date: NaiveDate,
    ) -> Self {
        Self {
            date,
            nature: result.ops.to_string(),
            maker: maker.to_string(),
            repayment_date: format_iso(result.diagnostics.repayment_date),
            drawdown_id: trade.drawdown_id.clone(),
            funder_code: trade.funder_id.to_string(),
            currency: trade.currency.to_string(),
            principal: trade.principal.into(),
            interest: trade.funder_recorded_interest.into(),
            platform_fee: result.platform_fee.into(),
            spreading: trade.spreading_recorded.into(),
            sub: trade.bank_charge.into(),
            total_amount: (trade.repayment_amount - trade.bank_charge).into(),
            checker: report.summary_label(),
        }
    }

    pub fn tsv_header() -> String {
        SUMMARY_COLUMNS.join("\t")
    }

    /// Cells in [`SUMMARY_COLUMNS`] order, tab-separated, for pasting.
    pub fn to_tsv_row(&self) -> String {
        [
            format_iso(self.date),
            self.nature.clone(),
            self.maker.clone(),
            self.repayment_date.clone(),
            self.drawdown_id.clone(),
            self.funder_code.clone(),
            self.currency.clone(),
            self.principal.to_string(),
            self.interest.to_string(),
            self.platform_fee.to_string(),
            self.spreading.to_string(),
            self.sub.to_string(),
            self.total_amount.to_string(),
            self.checker.clone(),
        ]
        .join("\t")
    }

    /// The row as it comes back from approval.
    pub fn to_approval_row(&self) -> ApprovalRow {
        ApprovalRow {
            trade_code: self.drawdown_id.clone(),
            nature: self.nature.clone(),
            funder_code: self.funder_code.as_str().into(),
            currency: self.currency.as_str().into(),
            principal: self.principal.clone(),
            interest: self.interest.clone(),
            platform_fee: self.platform_fee.clone(),
            spreading: self.spreading.clone(),
            total_amount: self.total_amount.clone(),
        }
    }
}

impl fmt::Display for MakerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Maker Summary ===")?;
        let cells = self.to_tsv_row();
        for (i, (column, value)) in SUMMARY_COLUMNS.iter().zip(cells.split('\t')).enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{:<15} {}", format!("{}:", column), value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::classify::Classification;
    use crate::calculation::interest::{CalculationOptions, InterestCalculator, OpsType};
    use crate::checker::consistency::ConsistencyChecker;
    use crate::config::EngineConfig;
    use crate::core::dates::ymd;
    use crate::core::trade::fixtures::sample_trade;
    use crate::rates::table::RateTable;
    use rust_decimal_macros::dec;

    fn summary(ops: OpsType) -> MakerSummary {
        let mut trade = sample_trade();
        trade.rate_description = "12%".to_string();
        trade.funder_interest_rate = dec!(12);
        trade.funder_recorded_interest = dec!(1000);
        trade.sme_recorded_interest = dec!(1000);
        trade.bank_charge = dec!(25);
        trade.repayment_amount = dec!(101025);
        let rates = RateTable::new();
        let config = EngineConfig::default();
        let result = InterestCalculator::new(&rates, &config)
            .calculate(
                &trade,
                &Classification::of(&trade),
                CalculationOptions {
                    ops,
                    ..Default::default()
                },
            )
            .unwrap();
        let report = ConsistencyChecker::new(&config).check(&trade, &result);
        MakerSummary::from_calculation(&trade, &result, &report, "Alex", ymd(2024, 2, 9))
    }

    #[test]
    fn test_summary_from_calculation() {
        let s = summary(OpsType::Repayment);
        assert_eq!(s.nature, "Repayment");
        assert_eq!(s.repayment_date, "2024-02-09");
        assert_eq!(s.interest, AmountCell::Number(dec!(1000)));
        assert_eq!(s.sub, AmountCell::Number(dec!(25)));
        assert_eq!(s.total_amount, AmountCell::Number(dec!(101000)));
        assert_eq!(s.checker, "ok: 0.00");
    }

    #[test]
    fn test_rollover_nature_and_date() {
        let s = summary(OpsType::Rollover);
        assert_eq!(s.nature, "Rollover");
        assert_eq!(s.repayment_date, "2024-02-08");
        assert!(s.checker.starts_with("err"));
    }

    #[test]
    fn test_tsv_row_matches_header() {
        let s = summary(OpsType::Repayment);
        let row = s.to_tsv_row();
        assert_eq!(row.split('\t').count(), SUMMARY_COLUMNS.len());
        assert!(row.starts_with("2024-02-09\tRepayment\tAlex\t2024-02-09\tM-ABC-41056\tFP0053\tUSD\t100000\t1000\t0\t0\t25\t101000\tok: 0.00"));
        assert_eq!(MakerSummary::tsv_header().split('\t').count(), 14);
    }

    #[test]
    fn test_to_approval_row_feeds_transfers() {
        let row = summary(OpsType::Repayment).to_approval_row();
        assert_eq!(row.trade_code, "M-ABC-41056");
        assert_eq!(row.funder_transfer(), Some(dec!(101000)));
        assert_eq!(row.spread_transfer(), Some(dec!(0)));
    }
}
