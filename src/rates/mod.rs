//! Daily benchmark rates (SOFR, HIBOR): the in-memory table and its flat-file store.

pub mod storage;
pub mod table;
