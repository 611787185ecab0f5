//! Decimal helpers shared by the calculator, the checker and the transfer builder.
//!
//! Every amount in the engine is a [`Decimal`]. Reports carry two decimals,
//! but intermediate results keep full precision until one of the defined
//! truncation or rounding points below.

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+\.?[0-9]*").expect("number pattern"));
static NON_AMOUNT_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.\-]").expect("amount character pattern"));

/// Truncate toward zero at two decimals: `trunc(x * 100) / 100`.
///
/// This is truncation, not rounding. Interest figures are cut, never rounded up.
///
/// ```
/// use repayment_engine::core::money::truncate_2dp;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(truncate_2dp(dec!(1.2399)), dec!(1.23));
/// assert_eq!(truncate_2dp(dec!(-1.2399)), dec!(-1.23));
/// ```
pub fn truncate_2dp(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Round to two decimals, half to even.
pub fn round_2dp(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Parse an amount the way LMS reports print them.
///
/// Thousands separators are dropped and an accounting negative such as
/// `(1,234.50)` becomes `-1234.50`. Returns `None` when the text is not a number.
pub fn parse_accounting_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let paren_negative = trimmed.starts_with('(') && trimmed.ends_with(')');
    let cleaned: String = trimmed
        .trim_matches(|c| c == '(' || c == ')')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let value = Decimal::from_str(cleaned.trim()).ok()?;
    Some(if paren_negative { -value } else { value })
}

/// Lenient amount parser for bank exports.
///
/// On top of [`parse_accounting_amount`] it tolerates currency symbols and
/// text prefixes (`USD 1,000.00`, `$12`), keeping only digits, separators and
/// the minus sign before parsing.
pub fn parse_lenient_amount(raw: &str) -> Option<Decimal> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let paren_negative = s.starts_with('(') && s.ends_with(')');
    if paren_negative {
        s = &s[1..s.len() - 1];
    }
    let cleaned = NON_AMOUNT_CHAR.replace_all(s, "");
    if cleaned.is_empty() || cleaned == "-" || cleaned == "." {
        return None;
    }
    let value = Decimal::from_str(&cleaned).ok()?;
    Some(if paren_negative { -value } else { value })
}

/// Last decimal number embedded in free text, e.g. `4.25` in `"SOFR + 4.25%"`.
pub fn last_number_in(text: &str) -> Option<Decimal> {
    NUMBER
        .find_iter(text)
        .last()
        .and_then(|m| Decimal::from_str(m.as_str().trim_end_matches('.')).ok())
}

/// A pasted amount cell: blank, a number, or text that is not a number.
///
/// Blank cells count as zero when amounts are summed. Unreadable cells poison
/// any sum they take part in, so the row that carries them can be flagged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum AmountCell {
    #[default]
    Blank,
    Number(Decimal),
    Invalid(String),
}

impl AmountCell {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            AmountCell::Blank
        } else {
            parse_accounting_amount(raw)
                .map(AmountCell::Number)
                .unwrap_or_else(|| AmountCell::Invalid(raw.to_string()))
        }
    }

    pub fn number(&self) -> Option<Decimal> {
        match self {
            AmountCell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Value for summing: blank is zero, unreadable is `None`.
    pub fn or_zero(&self) -> Option<Decimal> {
        match self {
            AmountCell::Blank => Some(Decimal::ZERO),
            AmountCell::Number(n) => Some(*n),
            AmountCell::Invalid(_) => None,
        }
    }
}

impl From<Decimal> for AmountCell {
    fn from(value: Decimal) -> Self {
        AmountCell::Number(value)
    }
}

impl fmt::Display for AmountCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountCell::Blank => Ok(()),
            AmountCell::Number(n) => write!(f, "{}", n),
            AmountCell::Invalid(raw) => f.write_str(raw),
        }
    }
}
