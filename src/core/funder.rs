use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a funding party, e.g. `FP0053`.
///
/// Funder ids key both the interest classification (zero-interest funders)
/// and the settlement account routing of transfer instructions.
///
/// # Examples
///
/// ```
/// use repayment_engine::core::funder::FunderId;
///
/// let funder = FunderId::new(" fp0053 ");
/// assert_eq!(funder.as_str(), "FP0053");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunderId(String);

impl FunderId {
    /// Create a funder identifier. Surrounding whitespace is dropped and the
    /// code is upper-cased, since pasted reports are not consistent about either.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_uppercase())
    }

    /// Returns the string representation of this funder ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FunderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FunderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
