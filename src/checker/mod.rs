//! Reviewing a calculation before it is booked.
//!
//! [`consistency`] compares computed against recorded figures, [`summary`]
//! renders the maker row, and [`balance`] reconciles funder balances between
//! the LMS and the bank.

pub mod balance;
pub mod consistency;
pub mod summary;
