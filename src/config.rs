//! Engine configuration.
//!
//! Every field defaults to the business constant in force; a JSON file only
//! needs to name the values it changes.

use crate::checker::consistency::SettlementBand;
use crate::core::dates::ymd;
use crate::transfer::bank_csv::ColumnLayout;
use crate::transfer::routing::AccountRouting;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A computed figure agrees with the recorded one when the gap is
    /// strictly below this.
    pub check_threshold: Decimal,
    /// Allowed slack in the repayment cash-flow identity.
    pub cash_flow_tolerance: Decimal,
    /// Transfer leg against bank row.
    pub amount_match_tolerance: Decimal,
    /// Posting amounts at or below this are not posted.
    pub posting_tolerance: Decimal,
    pub partial_settlement_band: SettlementBand,
    /// Drawdowns from this date on accrue from the previous calendar day.
    pub cutover_date: NaiveDate,
    /// Stands in for a missing last funder submission date.
    pub submission_sentinel: NaiveDate,
    pub routing: AccountRouting,
    pub bank_csv_layout: ColumnLayout,
    /// The HIBOR export only carries dates after this one.
    pub hibor_export_cutoff: NaiveDate,
    pub rate_store: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_threshold: dec!(0.02),
            cash_flow_tolerance: dec!(0.001),
            amount_match_tolerance: dec!(0.01),
            posting_tolerance: dec!(0.000001),
            partial_settlement_band: SettlementBand::default(),
            cutover_date: ymd(2025, 6, 23),
            submission_sentinel: ymd(1999, 1, 1),
            routing: AccountRouting::default(),
            bank_csv_layout: ColumnLayout::default(),
            hibor_export_cutoff: ymd(2024, 8, 18),
            rate_store: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }
}
