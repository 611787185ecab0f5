//! From approved rows to bank-matched transfer legs.
//!
//! approval rows → [`posting`] lines → [`routing`] legs → [`reconcile`]
//! against the [`bank_csv`] export.

pub mod approval;
pub mod bank_csv;
pub mod posting;
pub mod reconcile;
pub mod routing;
