//! # fairshare-core
//! Foundation types and traits for the fairshare usage ledger.

pub mod constants;
pub mod error;
pub mod jobs;
pub mod store;
pub mod traits;
pub mod types;
