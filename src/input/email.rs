//! Settlement emails in the numbered-section format.
//!
//! ```text
//! 1. Repayment Details
//! Repayment Date      20/06/2025
//! Trade Code          M-XXXX-41056
//! 2. Settlement to Funder
//! Funder Sub Account No.
//! FP0053
//! ```
//!
//! A field is either `key<TAB>value` on one line or a key line followed by
//! its value on the next non-blank line. Keys are matched case-, punctuation-
//! and whitespace-insensitively, and the known misspellings of "Actual
//! Received Amount" are accepted.

use crate::checker::summary::{MakerSummary, EMAIL_NATURE};
use crate::core::money::AmountCell;
use chrono::NaiveDate;
use log::{debug, warn};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

static SECTION_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9])\.\s*(.+)$").expect("section heading pattern"));
static KEY_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.:]").expect("key punctuation pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

pub const REPAYMENT_DETAILS: &str = "1. Repayment Details";
pub const SETTLEMENT_TO_FUNDER: &str = "2. Settlement to Funder";
pub const FUNDPARK_ALLOCATION: &str = "3. FundPark Allocation";
pub const RETURN_TO_BORROWER: &str = "4. Return to Borrower";

/// Normalized spelling → canonical key.
const CANONICAL_KEYS: &[(&str, &str)] = &[
    ("1 repayment details", REPAYMENT_DETAILS),
    ("2 settlement to funder", SETTLEMENT_TO_FUNDER),
    ("3 fundpark allocation", FUNDPARK_ALLOCATION),
    ("4 return to borrower", RETURN_TO_BORROWER),
    ("repayment date", "Repayment Date"),
    ("trade code", "Trade Code"),
    ("payment currency", "Payment Currency"),
    ("actual received amount", "Actual Received Amount"),
    ("actural receviced amount", "Actual Received Amount"),
    ("actural received amount", "Actual Received Amount"),
    ("actual receviced amount", "Actual Received Amount"),
    ("payment type", "Payment Type"),
    ("drawdown id", "Drawdown ID"),
    ("funder sub account no", "Funder Sub Account No"),
    ("settled loan amount", "Settled Loan Amount"),
    ("settled interest", "Settled Interest"),
    ("settled pf", "Settled PF"),
    ("funder allocation", "Funder Allocation"),
    ("fundpark allocation amount", "FundPark Allocation Amount"),
    ("rtb amount", "RTB Amount"),
    ("bank name", "Bank Name"),
    ("bank a/c name", "Bank A/C Name"),
    ("bank a/c number", "Bank A/C Number"),
    ("swift code", "SWIFT Code"),
];

#[derive(Debug, Error, PartialEq)]
pub enum EmailError {
    #[error("no numbered section found in email text")]
    NoSections,
}

/// Lower-case, drop `.` and `:`, collapse whitespace.
pub fn normalize_key(key: &str) -> String {
    let lower = key.to_lowercase();
    let stripped = KEY_PUNCTUATION.replace_all(&lower, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

fn canonical(raw: &str) -> String {
    let normalized = normalize_key(raw);
    CANONICAL_KEYS
        .iter()
        .find(|(spelling, _)| *spelling == normalized)
        .map(|(_, key)| key.to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

/// `"2.Settlement to Funder"` → `"2. Settlement to Funder"`.
fn section_heading(line: &str) -> Option<String> {
    let caps = SECTION_HEADING.captures(line)?;
    Some(format!("{}. {}", &caps[1], &caps[2]))
}

/// Fields of an email grouped by canonical section name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailSections {
    sections: HashMap<String, HashMap<String, String>>,
}

impl EmailSections {
    pub fn parse(text: &str) -> Result<Self, EmailError> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            i += 1;
            if line.is_empty() {
                continue;
            }
            if let Some(heading) = section_heading(line) {
                let name = canonical(&heading);
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let Some(section) = current.as_ref() else {
                continue;
            };

            let (key, value) = match line.split_once('\t') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => {
                    let value = match lines[i..].iter().position(|l| !l.is_empty()) {
                        Some(offset) if section_heading(lines[i + offset]).is_some() => "",
                        Some(offset) => {
                            let value = lines[i + offset];
                            i += offset + 1;
                            value
                        }
                        None => {
                            i = lines.len();
                            ""
                        }
                    };
                    (line, value)
                }
            };
            sections
                .entry(section.clone())
                .or_default()
                .insert(canonical(key), value.to_string());
        }

        if sections.is_empty() {
            return Err(EmailError::NoSections);
        }
        debug!("email sections: {:?}", sections.keys().collect::<Vec<_>>());
        Ok(Self { sections })
    }

    /// Field value, or empty when the section or key is absent.
    pub fn get(&self, section: &str, key: &str) -> &str {
        self.sections
            .get(section)
            .and_then(|fields| fields.get(key))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }
}

/// Maker summary for a settlement email. The checker column stays blank: the
/// figures come from the email, not from a calculation.
pub fn parse_email_summary(text: &str, date: NaiveDate, maker: &str) -> Result<MakerSummary, EmailError> {
    let email = EmailSections::parse(text)?;
    for section in [REPAYMENT_DETAILS, SETTLEMENT_TO_FUNDER, FUNDPARK_ALLOCATION] {
        if !email.has_section(section) {
            warn!("email has no '{}' section; its fields are left blank", section);
        }
    }
    let amount = |section: &str, key: &str| AmountCell::parse(email.get(section, key));

    Ok(MakerSummary {
        date,
        nature: EMAIL_NATURE.to_string(),
        maker: maker.to_string(),
        repayment_date: email.get(REPAYMENT_DETAILS, "Repayment Date").to_string(),
        drawdown_id: email.get(REPAYMENT_DETAILS, "Trade Code").to_string(),
        funder_code: email.get(SETTLEMENT_TO_FUNDER, "Funder Sub Account No").to_string(),
        currency: email.get(REPAYMENT_DETAILS, "Payment Currency").to_string(),
        principal: amount(SETTLEMENT_TO_FUNDER, "Settled Loan Amount"),
        interest: amount(SETTLEMENT_TO_FUNDER, "Settled Interest"),
        platform_fee: amount(SETTLEMENT_TO_FUNDER, "Settled PF"),
        spreading: amount(FUNDPARK_ALLOCATION, "FundPark Allocation Amount"),
        sub: AmountCell::Blank,
        total_amount: amount(REPAYMENT_DETAILS, "Actual Received Amount"),
        checker: String::new(),
    })
}
