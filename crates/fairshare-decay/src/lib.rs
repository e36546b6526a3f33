//! # fairshare-decay: usage decay and bank-tree aggregation engine.
//!
//! Pure computation over ledger records; no I/O:
//! - **Usage bins**: each association keeps a fixed number of usage periods.
//!   When a half-life period rolls over, period `i` is scaled by `0.5^(i+1)`
//!   and shifted one slot older; the oldest period is forgotten.
//! - **Decay clock**: one pass-global decision whether `now` has left the
//!   current half-life window.
//! - **Association updater**: folds new jobs and picks one of four
//!   [`UsageCase`]s per association.
//! - **Bank tree**: post-order sum of association usage up to the root bank,
//!   over an arena with explicit cycle detection.

pub mod aggregate;
pub mod bins;
pub mod clock;
pub mod updater;

pub use aggregate::{BankTree, BankUsage};
pub use bins::UsageBinSet;
pub use clock::{check_timestamp, DecayClock, PassWindow};
pub use updater::{AssociationUpdate, AssociationUsageUpdater, UsageCase};
