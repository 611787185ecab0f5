//! Turning pasted LMS reports and settlement emails into typed records.

pub mod email;
pub mod lms;
pub mod schema;
