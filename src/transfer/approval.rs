//! Approved summary rows pasted back from the approval sheet.
//!
//! The paste has no header. Its columns are fixed, from Trade Code through
//! Total Amount. Cells are tab-separated when any line contains a tab and
//! comma-separated otherwise; quoted cells such as `"117,000.00"` keep
//! their separators. Short rows are padded with blanks and long rows are cut.

use crate::core::currency::CurrencyCode;
use crate::core::funder::FunderId;
use crate::core::money::{round_2dp, AmountCell};
use csv::ReaderBuilder;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const APPROVAL_COLUMNS: [&str; 9] = [
    "Trade Code",
    "Nature",
    "Funder Code",
    "Currency",
    "Principal",
    "Interest",
    "Platform Fee",
    "Spreading",
    "Total Amount",
];

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval batch has no rows")]
    Empty,

    #[error("approval batch is not delimited text: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRow {
    pub trade_code: String,
    pub nature: String,
    pub funder_code: FunderId,
    pub currency: CurrencyCode,
    pub principal: AmountCell,
    pub interest: AmountCell,
    pub platform_fee: AmountCell,
    pub spreading: AmountCell,
    pub total_amount: AmountCell,
}

fn sum_cells(cells: &[&AmountCell]) -> Option<Decimal> {
    cells.iter().try_fold(Decimal::ZERO, |acc, c| Some(acc + c.or_zero()?))
}

impl ApprovalRow {
    /// Build a row from its cells in [`APPROVAL_COLUMNS`] order. Missing
    /// trailing cells are blank.
    pub fn from_cells<S: AsRef<str>>(cells: &[S]) -> Self {
        let cell = |i: usize| cells.get(i).map(|c| c.as_ref().trim()).unwrap_or("");
        Self {
            trade_code: cell(0).to_string(),
            nature: cell(1).to_string(),
            funder_code: FunderId::new(cell(2)),
            currency: CurrencyCode::new(cell(3)),
            principal: AmountCell::parse(cell(4)),
            interest: AmountCell::parse(cell(5)),
            platform_fee: AmountCell::parse(cell(6)),
            spreading: AmountCell::parse(cell(7)),
            total_amount: AmountCell::parse(cell(8)),
        }
    }

    /// Transfer to the funder: principal + interest + platform fee, rounded to
    /// cents. Blank cells count as zero; an unreadable one gives `None`.
    pub fn funder_transfer(&self) -> Option<Decimal> {
        sum_cells(&[&self.principal, &self.interest, &self.platform_fee]).map(round_2dp)
    }

    /// Spread transfer, rounded to cents.
    pub fn spread_transfer(&self) -> Option<Decimal> {
        self.spreading.or_zero().map(round_2dp)
    }
}

/// Parse a pasted approval batch.
pub fn parse_approval_text(text: &str) -> Result<Vec<ApprovalRow>, ApprovalError> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return Err(ApprovalError::Empty);
    }
    let delimiter = if lines.iter().any(|l| l.contains('\t')) {
        b'\t'
    } else {
        b','
    };
    let joined = lines.join("\n");
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(joined.as_bytes());

    let mut rows = Vec::with_capacity(lines.len());
    for record in reader.records() {
        let record = record?;
        let cells: Vec<&str> = record.iter().collect();
        rows.push(ApprovalRow::from_cells(&cells));
    }
    debug!("parsed {} approval row(s)", rows.len());
    Ok(rows)
}
