//! Foundational types: identifiers, money and date helpers, the trade record.

pub mod currency;
pub mod dates;
pub mod funder;
pub mod money;
pub mod trade;
