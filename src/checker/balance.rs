//! Funder balance comparison: LMS ledger against the bank statement.
//!
//! Each funder directory entry (funder, account, currency) is looked up in
//! the bank balances by account and currency and in the LMS balances by
//! funder and currency. Offshore renminbi is folded into CNY on both balance
//! sides before the lookup. Only entries whose balances disagree, or whose
//! balance is missing on either side, are reported.

use crate::core::currency::CurrencyCode;
use crate::core::funder::FunderId;
use crate::core::money::parse_lenient_amount;
use csv::{ReaderBuilder, StringRecord};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

pub const DIRECTORY_FUNDER: &str = "Funder list";
pub const DIRECTORY_ACCOUNT: &str = "Account no.";
pub const ACCOUNT_NUMBER: &str = "Account Number";
pub const FUNDER_ID: &str = "Funder ID";
pub const CURRENCY: &str = "Currency";
pub const AVAILABLE_BALANCE: &str = "Available Balance";

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("cannot read balance file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed balance CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("{file} is missing required column '{column}'")]
    MissingColumn {
        file: &'static str,
        column: &'static str,
    },
}

/// One settlement account of a funder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunderAccount {
    pub funder: FunderId,
    pub account: String,
    pub currency: CurrencyCode,
}

/// A balance keyed by account number (bank) or funder id (LMS).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub holder: String,
    pub currency: CurrencyCode,
    /// `None` when the cell is blank or unreadable.
    pub balance: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceDifference {
    pub funder: FunderId,
    pub account: String,
    pub currency: CurrencyCode,
    pub lms_amount: Option<Decimal>,
    pub bank_amount: Option<Decimal>,
    /// `lms - bank`; `None` when either side is missing.
    pub difference: Option<Decimal>,
}

impl BalanceDifference {
    pub fn is_match(&self) -> bool {
        self.difference == Some(Decimal::ZERO)
    }
}

/// Header-addressed reader shared by the three balance files.
fn read_rows<R: Read>(
    reader: R,
    file: &'static str,
    columns: &[&'static str],
) -> Result<Vec<Vec<String>>, BalanceError> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: StringRecord = rdr.headers()?.clone();
    let indexes = columns
        .iter()
        .map(|&column| {
            headers
                .iter()
                .position(|h| h.trim() == column)
                .ok_or(BalanceError::MissingColumn { file, column })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let cells: Vec<String> = indexes
            .iter()
            .map(|&i| record.get(i).map(str::trim).unwrap_or("").to_string())
            .collect();
        if cells.iter().all(String::is_empty) {
            continue;
        }
        rows.push(cells);
    }
    debug!("read {} row(s) from {}", rows.len(), file);
    Ok(rows)
}

/// Funder directory: `Funder list`, `Account no.`, `Currency`.
pub fn parse_funder_directory<R: Read>(reader: R) -> Result<Vec<FunderAccount>, BalanceError> {
    Ok(read_rows(reader, "funder directory", &[DIRECTORY_FUNDER, DIRECTORY_ACCOUNT, CURRENCY])?
        .into_iter()
        .map(|cells| FunderAccount {
            funder: FunderId::new(&cells[0]),
            account: cells[1].clone(),
            currency: CurrencyCode::new(&cells[2]),
        })
        .collect())
}

fn parse_balances<R: Read>(
    reader: R,
    file: &'static str,
    holder_column: &'static str,
) -> Result<Vec<BalanceEntry>, BalanceError> {
    Ok(read_rows(reader, file, &[holder_column, CURRENCY, AVAILABLE_BALANCE])?
        .into_iter()
        .map(|cells| {
            let balance = parse_lenient_amount(&cells[2]);
            if balance.is_none() && !cells[2].is_empty() {
                warn!("{}: balance '{}' for {} is not a number", file, cells[2], cells[0]);
            }
            BalanceEntry {
                holder: cells[0].clone(),
                currency: CurrencyCode::new(&cells[1]).normalized(),
                balance,
            }
        })
        .collect())
}

/// Bank statement: `Account Number`, `Currency`, `Available Balance`.
pub fn parse_bank_balances<R: Read>(reader: R) -> Result<Vec<BalanceEntry>, BalanceError> {
    parse_balances(reader, "bank balances", ACCOUNT_NUMBER)
}

/// LMS ledger: `Funder ID`, `Currency`, `Available Balance`.
pub fn parse_lms_balances<R: Read>(reader: R) -> Result<Vec<BalanceEntry>, BalanceError> {
    parse_balances(reader, "LMS balances", FUNDER_ID)
}

fn index<'a>(entries: &'a [BalanceEntry], upper_case_holder: bool) -> HashMap<(String, CurrencyCode), &'a BalanceEntry> {
    let mut map = HashMap::new();
    for entry in entries {
        let holder = if upper_case_holder {
            entry.holder.to_uppercase()
        } else {
            entry.holder.clone()
        };
        let key = (holder, entry.currency.clone());
        if map.contains_key(&key) {
            warn!("duplicate balance for {} {}; keeping the first", key.0, key.1);
            continue;
        }
        map.insert(key, entry);
    }
    map
}

/// Every directory entry with both balances looked up.
pub fn compare_balances(
    directory: &[FunderAccount],
    bank: &[BalanceEntry],
    lms: &[BalanceEntry],
) -> Vec<BalanceDifference> {
    let bank_index = index(bank, false);
    let lms_index = index(lms, true);

    directory
        .iter()
        .map(|entry| {
            let bank_amount = bank_index
                .get(&(entry.account.clone(), entry.currency.clone()))
                .and_then(|b| b.balance);
            let lms_amount = lms_index
                .get(&(entry.funder.as_str().to_string(), entry.currency.clone()))
                .and_then(|b| b.balance);
            let difference = match (lms_amount, bank_amount) {
                (Some(l), Some(b)) => Some(l - b),
                _ => None,
            };
            BalanceDifference {
                funder: entry.funder.clone(),
                account: entry.account.clone(),
                currency: entry.currency.clone(),
                lms_amount,
                bank_amount,
                difference,
            }
        })
        .collect()
}

/// Outcome of one balance comparison pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub compared: usize,
    /// Entries that do not match, in directory order.
    pub differences: Vec<BalanceDifference>,
}

impl BalanceReport {
    pub fn build(directory: &[FunderAccount], bank: &[BalanceEntry], lms: &[BalanceEntry]) -> Self {
        let all = compare_balances(directory, bank, lms);
        let compared = all.len();
        let differences: Vec<_> = all.into_iter().filter(|d| !d.is_match()).collect();
        info!(
            "balance comparison: {} account(s), {} difference(s)",
            compared,
            differences.len()
        );
        Self {
            compared,
            differences,
        }
    }

    pub fn from_files(
        directory: impl AsRef<Path>,
        bank: impl AsRef<Path>,
        lms: impl AsRef<Path>,
    ) -> Result<Self, BalanceError> {
        let directory = parse_funder_directory(File::open(directory)?)?;
        let bank = parse_bank_balances(File::open(bank)?)?;
        let lms = parse_lms_balances(File::open(lms)?)?;
        Ok(Self::build(&directory, &bank, &lms))
    }
}

impl fmt::Display for BalanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<Decimal>| v.map(|d| format!("{:.2}", d)).unwrap_or_else(|| "-".to_string());
        writeln!(f, "=== Funder Balance ===")?;
        write!(
            f,
            "Accounts compared: {}, differences: {}",
            self.compared,
            self.differences.len()
        )?;
        for d in &self.differences {
            write!(
                f,
                "\n  {} {} {}: LMS {} bank {} difference {}  Difference Warning",
                d.funder,
                d.account,
                d.currency,
                show(d.lms_amount),
                show(d.bank_amount),
                show(d.difference)
            )?;
        }
        Ok(())
    }
}
