//! Sectioned LMS report text.
//!
//! A report is a sequence of sections. Each section opens with a title line
//! made only of letters and spaces (`Payment Details`), followed by
//! tab-separated `field<TAB>value` lines. Lines without a tab are ignored.

use crate::core::dates::parse_day_first;
use crate::core::money::parse_accounting_amount;
use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::LazyLock;

static SECTION_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z ]+$").expect("section title pattern"));

/// A value typed from its field name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Date(NaiveDate),
    Days(i64),
    Number(Decimal),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Days(d) => Some(Decimal::from(*d)),
            _ => None,
        }
    }
}

/// One `field<TAB>value` line with the section it appeared under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LmsEntry {
    pub section: String,
    pub field: String,
    pub raw: String,
    /// `None` when the cell was blank or could not be read as its field type.
    pub value: Option<FieldValue>,
}

/// Parsed report: every entry in order of appearance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LmsDocument {
    entries: Vec<LmsEntry>,
}

fn is_section_title(line: &str) -> bool {
    SECTION_TITLE.is_match(line)
}

/// Type a raw cell from the name of its field.
///
/// Field names containing `date` are dates (day-first), the funder
/// `Interest (I + OI)` total is a plain number, names containing `days` are
/// integers, anything else is an accounting amount when it reads as one and
/// text otherwise.
pub fn infer_value(field: &str, raw: &str) -> Option<FieldValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let lower = field.to_lowercase();
    if lower.contains("date") {
        parse_day_first(raw).map(FieldValue::Date)
    } else if field.contains("Interest (I + OI)") {
        Decimal::from_str(&raw.replace(',', ""))
            .ok()
            .map(FieldValue::Number)
    } else if lower.contains("days") {
        raw.replace(',', "").parse::<i64>().ok().map(FieldValue::Days)
    } else {
        Some(
            parse_accounting_amount(raw)
                .map(FieldValue::Number)
                .unwrap_or_else(|| FieldValue::Text(raw.to_string())),
        )
    }
}

impl LmsDocument {
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text.trim().lines().collect();
        let mut entries = Vec::new();
        let mut section = String::new();

        for (i, line) in lines.iter().enumerate() {
            // `Bank Charge<TAB>` with a blank value is a field line, not a title
            let line = line.trim_end_matches('\r');
            let is_last = i + 1 == lines.len();
            if i == 0 || (is_section_title(line) && !is_last) {
                section = line.trim().to_string();
                continue;
            }
            let mut parts = line.split('\t');
            if let (Some(field), Some(value)) = (parts.next(), parts.next()) {
                let field = field.trim().to_string();
                let raw = value.trim().to_string();
                let value = infer_value(&field, &raw);
                entries.push(LmsEntry {
                    section: section.clone(),
                    field,
                    raw,
                    value,
                });
            }
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[LmsEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry named `field` under `section`, both matched exactly.
    pub fn pick(&self, section: &str, field: &str) -> Option<&LmsEntry> {
        self.entries
            .iter()
            .find(|e| e.section == section && e.field == field)
    }

    pub fn section(&self, section: &str) -> impl Iterator<Item = &LmsEntry> {
        let section = section.to_string();
        self.entries.iter().filter(move |e| e.section == section)
    }
}
