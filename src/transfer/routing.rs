//! Account routing: posting line to debit/credit transfer leg.

use crate::core::funder::FunderId;
use crate::transfer::posting::{PostingLine, PostingType};
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Settlement accounts. Funder keys are upper-case funder ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountRouting {
    /// Collection account every transfer leaves from (`...2691`).
    pub operating_account: String,
    /// Platform spread account (`...2685`).
    pub spread_account: String,
    #[serde(deserialize_with = "funder_keys")]
    pub funder_accounts: BTreeMap<String, String>,
}

/// Funder keys from a config file are read the way [`FunderId`] stores them.
fn funder_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(funder, account)| (FunderId::new(&funder).as_str().to_string(), account))
        .collect())
}

impl Default for AccountRouting {
    fn default() -> Self {
        let funder_accounts = [
            ("FP0000", "001302728"),
            ("FP0056", "001302922"),
            ("FP0053", "001302895"),
            ("FP0057", "001302931"),
        ]
        .into_iter()
        .map(|(funder, account)| (funder.to_string(), account.to_string()))
        .collect();
        Self {
            operating_account: "001302691".to_string(),
            spread_account: "001302685".to_string(),
            funder_accounts,
        }
    }
}

impl AccountRouting {
    pub fn funder_account(&self, funder: &FunderId) -> Option<&str> {
        self.funder_accounts.get(funder.as_str()).map(String::as_str)
    }
}

/// A routed transfer. Invalid legs carry no accounts or amount, only the
/// reasons in `issue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferLeg {
    pub posting_type: PostingType,
    pub trade_code: String,
    pub posting_key: String,
    pub currency: String,
    /// Always non-negative when present.
    pub amount: Option<Decimal>,
    pub debit_account: Option<String>,
    pub credit_account: Option<String>,
    pub valid: bool,
    /// Reasons joined with `"; "`, empty for a valid leg.
    pub issue: String,
}

/// Route one posting line.
///
/// Checks run in a fixed order and all failing ones are reported:
/// missing code, unreadable amount, blank currency, amount within
/// `tolerance` of zero (only if still valid), then the funder mapping.
pub fn route(line: &PostingLine, routing: &AccountRouting, tolerance: Decimal) -> TransferLeg {
    let mut issues: Vec<String> = Vec::new();

    if line.code.is_none() {
        issues.push("CODE missing (Trade Code must end with 5 digits)".to_string());
    }
    if line.amount.is_none() {
        issues.push("Amount not numeric".to_string());
    }
    if line.currency.is_blank() {
        issues.push("Missing Currency".to_string());
    }
    if issues.is_empty() && line.amount.map_or(false, |a| a.abs() <= tolerance) {
        issues.push("Amount ~ 0".to_string());
    }

    let mut accounts = None;
    if issues.is_empty() {
        if let Some(amount) = line.amount {
            accounts = match line.posting_type {
                PostingType::Rptxx => match routing.funder_account(&line.funder_code) {
                    Some(target) => Some((routing.operating_account.clone(), target.to_string(), amount.abs())),
                    None => {
                        warn!("{}: funder {} has no settlement account", line.trade_code, line.funder_code);
                        issues.push(format!("Funder {} not mapped", line.funder_code));
                        None
                    }
                },
                PostingType::Intsp if amount < Decimal::ZERO => Some((
                    routing.spread_account.clone(),
                    routing.operating_account.clone(),
                    amount.abs(),
                )),
                PostingType::Intsp => Some((
                    routing.operating_account.clone(),
                    routing.spread_account.clone(),
                    amount,
                )),
            };
        }
    }

    let valid = issues.is_empty() && accounts.is_some();
    let (debit_account, credit_account, amount) = match accounts {
        Some((debit, credit, amount)) if valid => (Some(debit), Some(credit), Some(amount)),
        _ => (None, None, None),
    };

    TransferLeg {
        posting_type: line.posting_type,
        trade_code: line.trade_code.clone(),
        posting_key: line.posting_key.clone(),
        currency: line.currency.as_str().to_string(),
        amount,
        debit_account,
        credit_account,
        valid,
        issue: issues.join("; "),
    }
}

pub fn route_all(lines: &[PostingLine], routing: &AccountRouting, tolerance: Decimal) -> Vec<TransferLeg> {
    lines
        .iter()
        .map(|line| route(line, routing, tolerance))
        .collect()
}
