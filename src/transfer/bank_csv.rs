//! Headerless bank export, read by fixed column letters.
//!
//! The export carries no header row, so each field is located by its
//! spreadsheet column letter. The letters live in one versioned
//! [`ColumnLayout`]; a format change on the bank side is a new layout.

use crate::core::money::parse_lenient_amount;
use csv::ReaderBuilder;
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Characters of the key column compared against posting keys.
pub const KEY_LENGTH: usize = 10;

#[derive(Debug, Error)]
pub enum BankCsvError {
    #[error("cannot read bank file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bank CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid column letter '{letter}'")]
    InvalidColumn { letter: String },
}

/// Zero-based index of a spreadsheet column letter: `A` is 0, `AB` is 27.
///
/// ```
/// use repayment_engine::transfer::bank_csv::col_letter_to_index;
///
/// assert_eq!(col_letter_to_index("C").unwrap(), 2);
/// assert_eq!(col_letter_to_index("ab").unwrap(), 27);
/// assert_eq!(col_letter_to_index("AJ").unwrap(), 35);
/// assert!(col_letter_to_index("A1").is_err());
/// ```
pub fn col_letter_to_index(letter: &str) -> Result<usize, BankCsvError> {
    let upper = letter.trim().to_uppercase();
    if upper.is_empty() {
        return Err(BankCsvError::InvalidColumn {
            letter: letter.to_string(),
        });
    }
    let mut index = 0usize;
    for ch in upper.chars() {
        if !ch.is_ascii_uppercase() {
            return Err(BankCsvError::InvalidColumn {
                letter: letter.to_string(),
            });
        }
        index = index * 26 + (ch as usize - 'A' as usize + 1);
    }
    Ok(index - 1)
}

/// Column letters of each field in one version of the bank export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub version: String,
    pub debit_account: String,
    pub currency: String,
    /// Source of the join key; only the first ten characters are used.
    pub key: String,
    pub credit_account: String,
    pub amount: String,
    pub trade_code: String,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self::dbs_v1()
    }
}

impl ColumnLayout {
    pub fn dbs_v1() -> Self {
        Self {
            version: "dbs-v1".to_string(),
            debit_account: "C".to_string(),
            currency: "D".to_string(),
            key: "E".to_string(),
            credit_account: "P".to_string(),
            amount: "AB".to_string(),
            trade_code: "AJ".to_string(),
        }
    }

    fn resolve(&self) -> Result<ColumnIndexes, BankCsvError> {
        Ok(ColumnIndexes {
            debit_account: col_letter_to_index(&self.debit_account)?,
            currency: col_letter_to_index(&self.currency)?,
            key: col_letter_to_index(&self.key)?,
            credit_account: col_letter_to_index(&self.credit_account)?,
            amount: col_letter_to_index(&self.amount)?,
            trade_code: col_letter_to_index(&self.trade_code)?,
        })
    }
}

struct ColumnIndexes {
    debit_account: usize,
    currency: usize,
    key: usize,
    credit_account: usize,
    amount: usize,
    trade_code: usize,
}

/// One bank row, cells trimmed. Cells past the end of a short row are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankCsvRow {
    pub row_index: usize,
    /// First ten characters of `key_source`.
    pub key: String,
    pub key_source: String,
    pub debit_account: String,
    pub credit_account: String,
    pub currency: String,
    /// `None` when the amount cell is empty or not a number.
    pub amount: Option<Decimal>,
    pub amount_raw: String,
    pub trade_code: String,
}

/// Parse a bank export. Invalid UTF-8 is replaced rather than rejected.
pub fn parse_bank_csv<R: Read>(mut reader: R, layout: &ColumnLayout) -> Result<Vec<BankCsvRow>, BankCsvError> {
    let columns = layout.resolve()?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let text = String::from_utf8_lossy(&bytes);

    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (row_index, record) in csv_reader.records().enumerate() {
        let record = record?;
        if record.is_empty() {
            continue;
        }
        let cell = |i: usize| record.get(i).map(str::trim).unwrap_or("").to_string();
        let key_source = cell(columns.key);
        let amount_raw = cell(columns.amount);
        let amount = parse_lenient_amount(&amount_raw);
        if key_source.is_empty() {
            warn!("bank row {} has no key; it can never match", row_index);
        }
        if amount.is_none() && !amount_raw.is_empty() {
            warn!("bank row {}: amount '{}' is not a number", row_index, amount_raw);
        }
        rows.push(BankCsvRow {
            row_index,
            key: key_source.chars().take(KEY_LENGTH).collect(),
            key_source,
            debit_account: cell(columns.debit_account),
            credit_account: cell(columns.credit_account),
            currency: cell(columns.currency),
            amount,
            amount_raw,
            trade_code: cell(columns.trade_code),
        });
    }
    debug!("read {} bank row(s) with layout {}", rows.len(), layout.version);
    Ok(rows)
}

pub fn read_bank_csv(path: impl AsRef<Path>, layout: &ColumnLayout) -> Result<Vec<BankCsvRow>, BankCsvError> {
    let file = fs::File::open(path)?;
    parse_bank_csv(file, layout)
}


#[cfg(test)]
mod tests {
    use super::fixtures::bank_line;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_column_letters() {
        assert_eq!(col_letter_to_index("A").unwrap(), 0);
        assert_eq!(col_letter_to_index("Z").unwrap(), 25);
        assert_eq!(col_letter_to_index("AA").unwrap(), 26);
        assert_eq!(col_letter_to_index(" p ").unwrap(), 15);
        assert!(matches!(
            col_letter_to_index(""),
            Err(BankCsvError::InvalidColumn { .. })
        ));
    }

    #[test]
    fn test_parse_by_letters() {
        let text = format!(
            "{}\n{}\n",
            bank_line("001302691", "USD", "RPTXX41056010615", "001302895", "USD 117,472.25", "M-XXXX-41056"),
            bank_line("001302685", "USD", "INTSP41056010615", "001302691", "(50.00)", "")
        );
        let rows = parse_bank_csv(text.as_bytes(), &ColumnLayout::dbs_v1()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "RPTXX41056");
        assert_eq!(rows[0].key_source, "RPTXX41056010615");
        assert_eq!(rows[0].debit_account, "001302691");
        assert_eq!(rows[0].credit_account, "001302895");
        assert_eq!(rows[0].amount, Some(dec!(117472.25)));
        assert_eq!(rows[0].trade_code, "M-XXXX-41056");
        assert_eq!(rows[1].amount, Some(dec!(-50.00)));
    }

    #[test]
    fn test_short_rows_read_as_empty_cells() {
        let rows = parse_bank_csv("a,b,001302691,USD\n".as_bytes(), &ColumnLayout::dbs_v1()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].currency, "USD");
        assert_eq!(rows[0].key, "");
        assert_eq!(rows[0].amount, None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut bytes = b"x,y,001302691,USD,RPTXX\xff12345".to_vec();
        bytes.push(b'\n');
        let rows = parse_bank_csv(&bytes[..], &ColumnLayout::dbs_v1()).unwrap();
        assert_eq!(rows[0].key.chars().count(), 10);
        assert!(rows[0].key.starts_with("RPTXX\u{FFFD}"));
    }

    #[test]
    fn test_bad_layout_is_fatal() {
        let mut layout = ColumnLayout::dbs_v1();
        layout.amount = "A-B".to_string();
        assert!(matches!(
            parse_bank_csv("".as_bytes(), &layout),
            Err(BankCsvError::InvalidColumn { .. })
        ));
    }
}
