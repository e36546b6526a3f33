//! # fairshare-ledger: persistent usage ledger and update facade.
//!
//! Composes the fairshare subsystems into a usable ledger:
//! - [`storage::RocksLedger`]: ledger state backed by RocksDB
//! - [`jobs::JsonlJobSource`]: completed jobs read from a JSON-lines archive
//! - [`ledger::UsageLedger`]: update pass, clear-usage, and administration
//! - [`config::LedgerConfig`]: ledger configuration

pub mod config;
pub mod jobs;
pub mod ledger;
pub mod storage;

pub use config::LedgerConfig;
pub use jobs::JsonlJobSource;
pub use ledger::{UsageLedger, UsagePassReport, UsageReport};
pub use storage::RocksLedger;
