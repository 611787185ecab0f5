//! Trade classification, interest accrual and allocation.

pub mod allocation;
pub mod classify;
pub mod interest;
