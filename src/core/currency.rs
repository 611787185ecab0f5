use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 4217-style currency code as it appears on LMS reports and bank files.
///
/// Codes are stored trimmed and upper-cased so that `"usd "` from a pasted
/// report compares equal to `"USD"` from a bank export. No conversion between
/// currencies is ever performed; the code is only compared.
///
/// # Examples
///
/// ```
/// use repayment_engine::core::currency::CurrencyCode;
///
/// let usd = CurrencyCode::new(" usd");
/// assert_eq!(usd, CurrencyCode::new("USD"));
/// assert_eq!(usd.as_str(), "USD");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A blank code means the source row carried no currency at all.
    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }

    /// Offshore renminbi is booked as CNY on the funder ledgers.
    pub fn normalized(&self) -> Self {
        if self.0 == "CNH" {
            Self("CNY".to_string())
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_code_equality() {
        let a = CurrencyCode::new("USD");
        let b = CurrencyCode::new("usd");
        assert_eq!(a, b);
    }

    #[test]
    fn test_blank_currency() {
        assert!(CurrencyCode::new("   ").is_blank());
        assert!(!CurrencyCode::new("HKD").is_blank());
    }

    #[test]
    fn test_cnh_normalizes_to_cny() {
        assert_eq!(CurrencyCode::new("CNH").normalized(), CurrencyCode::new("CNY"));
        assert_eq!(CurrencyCode::new("USD").normalized(), CurrencyCode::new("USD"));
    }
}
