//! Posting lines derived from approved rows.
//!
//! Each row yields up to two lines: `RPTXX` moves the funder's principal,
//! interest and fee, `INTSP` moves the platform spread. A line is emitted only
//! when its amount is above the posting tolerance in absolute value, or when
//! the amount could not be read at all, so the bad row stays visible.

use crate::core::currency::CurrencyCode;
use crate::core::funder::FunderId;
use crate::transfer::approval::ApprovalRow;
use chrono::NaiveDate;
use log::debug;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Literal between the code and the posting day.
pub const KEY_SEQUENCE: &str = "01";

/// Five trailing digits carried into the posting key.
static CODE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{5}$").expect("trade code suffix pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostingType {
    Rptxx,
    Intsp,
}

impl PostingType {
    pub fn prefix(&self) -> &'static str {
        match self {
            PostingType::Rptxx => "RPTXX",
            PostingType::Intsp => "INTSP",
        }
    }
}

impl fmt::Display for PostingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingLine {
    pub posting_type: PostingType,
    /// Empty when the trade code does not end in five digits.
    pub posting_key: String,
    pub code: Option<String>,
    pub trade_code: String,
    pub funder_code: FunderId,
    pub currency: CurrencyCode,
    /// `None` when a source cell was not a number.
    pub amount: Option<Decimal>,
}

/// Trailing five digits of a trade code, if it ends in at least five.
///
/// ```
/// use repayment_engine::transfer::posting::trade_code_suffix;
///
/// assert_eq!(trade_code_suffix("M-XXXX-41056"), Some("41056"));
/// assert_eq!(trade_code_suffix("M-XXXX-4105"), None);
/// ```
pub fn trade_code_suffix(trade_code: &str) -> Option<&str> {
    CODE_SUFFIX.find(trade_code.trim()).map(|m| m.as_str())
}

/// `PREFIX + code + "01" + MMDD`.
pub fn posting_key(posting_type: PostingType, code: &str, posting_date: NaiveDate) -> String {
    format!(
        "{}{}{}{}",
        posting_type.prefix(),
        code,
        KEY_SEQUENCE,
        posting_date.format("%m%d")
    )
}

fn line_for(
    row: &ApprovalRow,
    posting_type: PostingType,
    amount: Option<Decimal>,
    code: Option<&str>,
    posting_date: NaiveDate,
) -> PostingLine {
    PostingLine {
        posting_type,
        posting_key: code
            .map(|c| posting_key(posting_type, c, posting_date))
            .unwrap_or_default(),
        code: code.map(str::to_string),
        trade_code: row.trade_code.clone(),
        funder_code: row.funder_code.clone(),
        currency: row.currency.clone(),
        amount,
    }
}

fn should_emit(amount: Option<Decimal>, tolerance: Decimal) -> bool {
    match amount {
        Some(a) => a.abs() > tolerance,
        None => true,
    }
}

/// Derive posting lines for a batch, keyed on `posting_date`'s month and day.
pub fn build_posting_lines(
    rows: &[ApprovalRow],
    posting_date: NaiveDate,
    tolerance: Decimal,
) -> Vec<PostingLine> {
    let mut lines = Vec::with_capacity(rows.len() * 2);
    for row in rows {
        let code = trade_code_suffix(&row.trade_code);
        let funder_amount = row.funder_transfer();
        if should_emit(funder_amount, tolerance) {
            lines.push(line_for(row, PostingType::Rptxx, funder_amount, code, posting_date));
        }
        let spread_amount = row.spread_transfer();
        if should_emit(spread_amount, tolerance) {
            lines.push(line_for(row, PostingType::Intsp, spread_amount, code, posting_date));
        }
    }
    debug!("{} posting line(s) from {} row(s)", lines.len(), rows.len());
    lines
}
