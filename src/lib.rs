//! # repayment-engine
//!
//! Interest calculation and transfer reconciliation for loan repayments.
//!
//! A pasted LMS repayment report is normalized into a typed trade, its SME,
//! overdue and funder interest are recomputed from the daily SOFR/HIBOR
//! table, and the result is checked against what the LMS recorded. Approved
//! settlements are then turned into bank transfer legs and matched against
//! the bank's export.
//!
//! ## Architecture
//!
//! - **core**: identifiers, money and date helpers, the trade record
//! - **rates**: the daily benchmark rate table and its flat-file store
//! - **input**: LMS report and settlement email parsing
//! - **calculation**: classification, interest accrual and allocation
//! - **checker**: consistency checks, maker summary, funder balances
//! - **transfer**: posting lines, account routing, bank CSV reconciliation
//! - **config**: tolerances, dates, accounts and the bank column layout
//! - **session**: retained application state and the per-trade context

pub mod calculation;
pub mod checker;
pub mod config;
pub mod core;
pub mod input;
pub mod rates;
pub mod session;
pub mod transfer;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::calculation::allocation::AllocationMode;
    pub use crate::calculation::classify::{Classification, ClassificationOverrides, FunderType, ProductType, RateType};
    pub use crate::calculation::interest::{CalculationOptions, CalculationResult, InterestCalculator, Note, OpsType};
    pub use crate::checker::consistency::{CheckStatus, ConsistencyChecker, ConsistencyReport};
    pub use crate::checker::summary::MakerSummary;
    pub use crate::config::EngineConfig;
    pub use crate::core::currency::CurrencyCode;
    pub use crate::core::funder::FunderId;
    pub use crate::core::trade::TradeRecord;
    pub use crate::input::schema::Normalizer;
    pub use crate::rates::storage::RateStore;
    pub use crate::rates::table::{RateColumn, RateRecord, RateTable};
    pub use crate::session::{AppState, ProcessOptions, TradeContext};
    pub use crate::transfer::reconcile::{MatchStatus, ReconciliationReport, Reconciler};
    pub use crate::transfer::routing::TransferLeg;
}
