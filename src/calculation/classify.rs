//! Trade classification from identifiers and rate text.
//!
//! All matching is case-insensitive substring matching on the upper-cased
//! identifier. A [`Classification`] is a plain value: callers may override any
//! of its three parts before handing it to the calculator.

use crate::core::funder::FunderId;
use crate::core::trade::TradeRecord;
use crate::rates::table::RateColumn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Drawdown code fragments of products that never accrue overdue interest.
pub const NO_OVERDUE_CODES: &[&str] = &[
    "-COS-PL", "-COSB-PL", "-VEH-PL", "-3CP-PL", "PLCOS", "PLPV", "PL3C", "NSDPL",
];

/// Drawdown code fragments of receivable and purchase-order financing.
pub const RFPO_CODES: &[&str] = &["-IMP-RF", "-IMP-PO", "-LOG-RF"];
pub const RFPO_PREFIXES: &[&str] = &["F-", "P-"];

/// Funders that earn no interest on their allocation.
pub const ZERO_RATE_FUNDERS: &[&str] = &["FP0056", "FP0000"];
/// Funders known to earn interest. They resolve to [`FunderType::Main`] like
/// any unlisted funder.
pub const NONZERO_RATE_FUNDERS: &[&str] = &["FP0057", "FP0053"];

#[derive(Debug, Error, PartialEq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseTypeError {
    kind: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductType {
    Regular,
    #[serde(rename = "PL-novd")]
    PlNoOverdue,
    #[serde(rename = "RFPO")]
    Rfpo,
}

impl ProductType {
    pub fn from_drawdown_id(drawdown_id: &str) -> Self {
        let id = drawdown_id.trim().to_uppercase();
        if NO_OVERDUE_CODES.iter().any(|code| id.contains(code)) {
            ProductType::PlNoOverdue
        } else if RFPO_CODES.iter().any(|code| id.contains(code))
            || RFPO_PREFIXES.iter().any(|prefix| id.starts_with(prefix))
        {
            ProductType::Rfpo
        } else {
            ProductType::Regular
        }
    }

    /// Overdue interest is only ever charged on regular products.
    pub fn accrues_overdue(&self) -> bool {
        matches!(self, ProductType::Regular)
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProductType::Regular => "Regular",
            ProductType::PlNoOverdue => "PL-novd",
            ProductType::Rfpo => "RFPO",
        })
    }
}

impl FromStr for ProductType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "regular" => Ok(ProductType::Regular),
            "pl-novd" | "plnovd" => Ok(ProductType::PlNoOverdue),
            "rfpo" => Ok(ProductType::Rfpo),
            _ => Err(ParseTypeError {
                kind: "product type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateType {
    #[serde(rename = "SOFR+")]
    SofrPlus,
    #[serde(rename = "HIBOR+")]
    HiborPlus,
    Fixed,
}

impl RateType {
    pub fn from_description(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("sofr") {
            RateType::SofrPlus
        } else if lower.contains("hibor") {
            RateType::HiborPlus
        } else {
            RateType::Fixed
        }
    }

    /// Benchmark series read for this rate type. Fixed trades still name a
    /// column, but their range sums are discarded.
    pub fn column(&self) -> RateColumn {
        match self {
            RateType::HiborPlus => RateColumn::Hibor,
            _ => RateColumn::Sofr,
        }
    }

    pub fn is_floating(&self) -> bool {
        !matches!(self, RateType::Fixed)
    }
}

impl fmt::Display for RateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RateType::SofrPlus => "SOFR+",
            RateType::HiborPlus => "HIBOR+",
            RateType::Fixed => "Fixed",
        })
    }
}

impl FromStr for RateType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().trim_end_matches('+') {
            "sofr" => Ok(RateType::SofrPlus),
            "hibor" => Ok(RateType::HiborPlus),
            "fixed" => Ok(RateType::Fixed),
            _ => Err(ParseTypeError {
                kind: "rate type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunderType {
    Main,
    Zero,
    /// Only reachable through an explicit override.
    Fixed,
}

impl FunderType {
    pub fn from_funder_id(funder_id: &FunderId) -> Self {
        if ZERO_RATE_FUNDERS.contains(&funder_id.as_str()) {
            FunderType::Zero
        } else {
            FunderType::Main
        }
    }
}

impl fmt::Display for FunderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FunderType::Main => "Main",
            FunderType::Zero => "Zero",
            FunderType::Fixed => "Fixed",
        })
    }
}

impl FromStr for FunderType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" => Ok(FunderType::Main),
            "zero" => Ok(FunderType::Zero),
            "fixed" => Ok(FunderType::Fixed),
            _ => Err(ParseTypeError {
                kind: "funder type",
                value: s.to_string(),
            }),
        }
    }
}

/// Product, rate and funder type of one trade.
///
/// # Examples
///
/// ```
/// use repayment_engine::calculation::classify::{Classification, ProductType, RateType, FunderType};
/// use repayment_engine::core::funder::FunderId;
///
/// let c = Classification::derive("M-ABC-IMP-RF-41056", &FunderId::new("FP0056"), "HIBOR + 3%");
/// assert_eq!(c.product, ProductType::Rfpo);
/// assert_eq!(c.rate, RateType::HiborPlus);
/// assert_eq!(c.funder, FunderType::Zero);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub product: ProductType,
    pub rate: RateType,
    pub funder: FunderType,
}

impl Classification {
    pub fn derive(drawdown_id: &str, funder_id: &FunderId, rate_description: &str) -> Self {
        Self {
            product: ProductType::from_drawdown_id(drawdown_id),
            rate: RateType::from_description(rate_description),
            funder: FunderType::from_funder_id(funder_id),
        }
    }

    pub fn of(trade: &TradeRecord) -> Self {
        Self::derive(&trade.drawdown_id, &trade.funder_id, &trade.rate_description)
    }

    /// Replace whichever parts the caller supplied.
    pub fn with_overrides(self, overrides: &ClassificationOverrides) -> Self {
        Self {
            product: overrides.product.unwrap_or(self.product),
            rate: overrides.rate.unwrap_or(self.rate),
            funder: overrides.funder.unwrap_or(self.funder),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} / {}", self.product, self.rate, self.funder)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationOverrides {
    pub product: Option<ProductType>,
    pub rate: Option<RateType>,
    pub funder: Option<FunderType>,
}

impl ClassificationOverrides {
    pub fn is_empty(&self) -> bool {
        self.product.is_none() && self.rate.is_none() && self.funder.is_none()
    }
}
