//! # Reconciliation of transfer legs against the bank export
//!
//! Legs are left-joined to bank rows on the first ten characters of the
//! posting key. Every leg appears at least once; a key matching several bank
//! rows yields one row per match. An empty key never matches.
//!
//! A matched pair is checked in a fixed order and the first failure is the
//! reported status: debit account, credit account, currency, then amount.

use crate::core::currency::CurrencyCode;
use crate::transfer::bank_csv::{BankCsvRow, KEY_LENGTH};
use crate::transfer::routing::TransferLeg;
use log::info;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Ok,
    MissingInCsv,
    AccountDebitMismatch,
    AccountCreditMismatch,
    CurrencyMismatch,
    AmountMismatch,
    /// Status label that could not be attributed; never produced by matching.
    Unknown,
}

impl MatchStatus {
    pub const ALL: [MatchStatus; 7] = [
        MatchStatus::Ok,
        MatchStatus::MissingInCsv,
        MatchStatus::AccountDebitMismatch,
        MatchStatus::AccountCreditMismatch,
        MatchStatus::CurrencyMismatch,
        MatchStatus::AmountMismatch,
        MatchStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Ok => "OK",
            MatchStatus::MissingInCsv => "MISSING_IN_CSV",
            MatchStatus::AccountDebitMismatch => "ACCOUNT_DEBIT_MISMATCH",
            MatchStatus::AccountCreditMismatch => "ACCOUNT_CREDIT_MISMATCH",
            MatchStatus::CurrencyMismatch => "CURRENCY_MISMATCH",
            MatchStatus::AmountMismatch => "AMOUNT_MISMATCH",
            MatchStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| format!("unknown match status '{s}'"))
    }
}

/// One leg, with the bank row it joined to if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRow {
    pub status: MatchStatus,
    /// First ten characters of the leg's posting key.
    pub key: String,
    pub leg: TransferLeg,
    pub bank: Option<BankCsvRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub rows: Vec<ReconciliationRow>,
    pub counts: BTreeMap<MatchStatus, usize>,
}

impl ReconciliationReport {
    pub fn count(&self, status: MatchStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn all_ok(&self) -> bool {
        !self.rows.is_empty() && self.count(MatchStatus::Ok) == self.rows.len()
    }

    pub fn exceptions(&self) -> impl Iterator<Item = &ReconciliationRow> {
        self.rows.iter().filter(|r| r.status != MatchStatus::Ok)
    }
}

fn show(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Bank Reconciliation ===")?;
        writeln!(f, "Rows:  {}", self.rows.len())?;
        for (status, count) in &self.counts {
            writeln!(f, "  {:<24} {}", status.as_str(), count)?;
        }
        let exceptions: Vec<_> = self.exceptions().collect();
        if exceptions.is_empty() {
            return write!(f, "All legs matched.");
        }
        write!(f, "\nExceptions:")?;
        for row in exceptions {
            let amount = row.leg.amount.map(|a| a.to_string());
            let bank_amount = row.bank.as_ref().and_then(|b| b.amount).map(|a| a.to_string());
            write!(
                f,
                "\n  [{}] {} key '{}' amount {} vs {} debit {} vs {} credit {} vs {}",
                row.status,
                row.leg.trade_code,
                row.key,
                show(amount.as_deref()),
                show(bank_amount.as_deref()),
                show(row.leg.debit_account.as_deref()),
                show(row.bank.as_ref().map(|b| b.debit_account.as_str())),
                show(row.leg.credit_account.as_deref()),
                show(row.bank.as_ref().map(|b| b.credit_account.as_str())),
            )?;
        }
        Ok(())
    }
}

/// Joins transfer legs to bank rows and grades each pair.
#[derive(Debug, Clone)]
pub struct Reconciler {
    amount_tolerance: Decimal,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(dec!(0.01))
    }
}

impl Reconciler {
    pub fn new(amount_tolerance: Decimal) -> Self {
        Self { amount_tolerance }
    }

    /// Grade a matched pair. Currencies compare as [`CurrencyCode`]s, so case
    /// and padding do not matter. Amounts agree within the tolerance, inclusive.
    pub fn grade(&self, leg: &TransferLeg, bank: &BankCsvRow) -> MatchStatus {
        let amount_ok = match (leg.amount, bank.amount) {
            (Some(ours), Some(theirs)) => (ours - theirs).abs() <= self.amount_tolerance,
            _ => false,
        };
        if leg.debit_account.as_deref() != Some(bank.debit_account.as_str()) {
            MatchStatus::AccountDebitMismatch
        } else if leg.credit_account.as_deref() != Some(bank.credit_account.as_str()) {
            MatchStatus::AccountCreditMismatch
        } else if CurrencyCode::new(&leg.currency) != CurrencyCode::new(&bank.currency) {
            MatchStatus::CurrencyMismatch
        } else if !amount_ok {
            MatchStatus::AmountMismatch
        } else {
            MatchStatus::Ok
        }
    }

    pub fn reconcile(&self, legs: &[TransferLeg], bank_rows: &[BankCsvRow]) -> ReconciliationReport {
        let mut by_key: HashMap<&str, Vec<&BankCsvRow>> = HashMap::new();
        for row in bank_rows.iter().filter(|r| !r.key.is_empty()) {
            by_key.entry(row.key.as_str()).or_default().push(row);
        }

        let mut rows = Vec::with_capacity(legs.len());
        for leg in legs {
            let key: String = leg.posting_key.chars().take(KEY_LENGTH).collect();
            match by_key.get(key.as_str()) {
                Some(matches) if !key.is_empty() => {
                    for bank in matches {
                        rows.push(ReconciliationRow {
                            status: self.grade(leg, bank),
                            key: key.clone(),
                            leg: leg.clone(),
                            bank: Some((*bank).clone()),
                        });
                    }
                }
                _ => rows.push(ReconciliationRow {
                    status: MatchStatus::MissingInCsv,
                    key,
                    leg: leg.clone(),
                    bank: None,
                }),
            }
        }

        let mut counts = BTreeMap::new();
        for row in &rows {
            *counts.entry(row.status).or_insert(0) += 1;
        }
        info!(
            "reconciled {} leg(s) against {} bank row(s): {} ok",
            legs.len(),
            bank_rows.len(),
            counts.get(&MatchStatus::Ok).copied().unwrap_or(0)
        );

        ReconciliationReport { rows, counts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::funder::FunderId;
    use crate::transfer::posting::{PostingLine, PostingType};
    use crate::transfer::routing::{route, AccountRouting};

    fn leg(key: &str, amount: Decimal) -> TransferLeg {
        TransferLeg {
            posting_type: PostingType::Rptxx,
            trade_code: "M-XXXX-12345".to_string(),
            posting_key: key.to_string(),
            currency: "USD".to_string(),
            amount: Some(amount),
            debit_account: Some("001302691".to_string()),
            credit_account: Some("001302895".to_string()),
            valid: true,
            issue: String::new(),
        }
    }

    fn bank(key_source: &str, amount: Decimal) -> BankCsvRow {
        BankCsvRow {
            row_index: 0,
            key: key_source.chars().take(KEY_LENGTH).collect(),
            key_source: key_source.to_string(),
            debit_account: "001302691".to_string(),
            credit_account: "001302895".to_string(),
            currency: "USD".to_string(),
            amount: Some(amount),
            amount_raw: amount.to_string(),
            trade_code: String::new(),
        }
    }

    #[test]
    fn test_amount_within_tolerance() {
        let key = format!("{}{}", "RPTXX1234501", "0615");
        let report = Reconciler::default().reconcile(
            &[leg(&key, dec!(100.000))],
            &[bank("RPTXX1234501XYZ", dec!(100.005))],
        );
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].key, "RPTXX12345");
        assert_eq!(report.rows[0].status, MatchStatus::Ok);
        assert!(report.all_ok());
    }

    #[test]
    fn test_amount_outside_tolerance() {
        let report = Reconciler::default().reconcile(
            &[leg("RPTXX12345010615", dec!(100))],
            &[bank("RPTXX12345010615", dec!(100.02))],
        );
        assert_eq!(report.rows[0].status, MatchStatus::AmountMismatch);
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let report = Reconciler::default().reconcile(
            &[leg("RPTXX12345010615", dec!(100))],
            &[bank("RPTXX12345010615", dec!(100.01))],
        );
        assert_eq!(report.rows[0].status, MatchStatus::Ok);
    }

    #[test]
    fn test_currency_case_is_ignored() {
        let line = PostingLine {
            posting_type: PostingType::Rptxx,
            posting_key: "RPTXX12345010615".to_string(),
            code: Some("12345".to_string()),
            trade_code: "M-XXXX-12345".to_string(),
            funder_code: FunderId::new("FP0053"),
            currency: CurrencyCode::new("usd"),
            amount: Some(dec!(100)),
        };
        let routed = route(&line, &AccountRouting::default(), dec!(0.000001));
        let mut row = bank("RPTXX12345010615", dec!(100));
        row.currency = " usd".to_string();
        let report = Reconciler::default().reconcile(&[routed], &[row]);
        assert_eq!(report.rows[0].status, MatchStatus::Ok);
    }

    #[test]
    fn test_first_failing_check_wins() {
        let mut row = bank("RPTXX12345010615", dec!(1));
        row.debit_account = "X".to_string();
        row.credit_account = "Y".to_string();
        row.currency = "HKD".to_string();
        let reconciler = Reconciler::default();
        let l = leg("RPTXX12345010615", dec!(100));
        assert_eq!(reconciler.grade(&l, &row), MatchStatus::AccountDebitMismatch);
        row.debit_account = "001302691".to_string();
        assert_eq!(reconciler.grade(&l, &row), MatchStatus::AccountCreditMismatch);
        row.credit_account = "001302895".to_string();
        assert_eq!(reconciler.grade(&l, &row), MatchStatus::CurrencyMismatch);
        row.currency = "USD".to_string();
        assert_eq!(reconciler.grade(&l, &row), MatchStatus::AmountMismatch);
    }

    #[test]
    fn test_missing_and_duplicate_matches() {
        let legs = [leg("RPTXX11111010615", dec!(1)), leg("RPTXX22222010615", dec!(2))];
        let rows = [
            bank("RPTXX22222010615", dec!(2)),
            bank("RPTXX22222010615", dec!(3)),
        ];
        let report = Reconciler::default().reconcile(&legs, &rows);
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.count(MatchStatus::MissingInCsv), 1);
        assert_eq!(report.count(MatchStatus::Ok), 1);
        assert_eq!(report.count(MatchStatus::AmountMismatch), 1);
        assert!(!report.all_ok());
        assert_eq!(report.exceptions().count(), 2);
    }

    #[test]
    fn test_empty_keys_never_join() {
        let mut invalid = leg("", dec!(1));
        invalid.valid = false;
        let report = Reconciler::default().reconcile(&[invalid], &[bank("", dec!(1))]);
        assert_eq!(report.rows[0].status, MatchStatus::MissingInCsv);
    }

    #[test]
    fn test_invalid_leg_without_amount_mismatches() {
        let mut l = leg("RPTXX12345010615", dec!(1));
        l.amount = None;
        let report = Reconciler::default().reconcile(&[l], &[bank("RPTXX12345010615", dec!(1))]);
        assert_eq!(report.rows[0].status, MatchStatus::AmountMismatch);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(MatchStatus::MissingInCsv.to_string(), "MISSING_IN_CSV");
        assert_eq!("amount_mismatch".parse::<MatchStatus>(), Ok(MatchStatus::AmountMismatch));
        assert_eq!(
            serde_json::to_string(&MatchStatus::AccountDebitMismatch).unwrap(),
            "\"ACCOUNT_DEBIT_MISMATCH\""
        );
        assert!("nope".parse::<MatchStatus>().is_err());
    }
}
