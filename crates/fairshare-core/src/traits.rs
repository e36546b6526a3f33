//! Trait interfaces for the fairshare ledger.
//!
//! - [`JobSource`]: completed job records (the scheduler's job archive)
//! - [`LedgerStore`](crate::store::LedgerStore): persistent ledger state,
//!   defined next to its in-memory implementation in [`crate::store`]

use crate::error::LedgerError;
use crate::types::{Association, JobRecord};

/// Selects the jobs that are new for one association.
#[derive(Debug, Clone, PartialEq)]
pub struct JobQuery {
    pub userid: u32,
    pub bank: String,
    /// Also match jobs submitted without a bank (the association is the
    /// user's default one).
    pub include_unbanked: bool,
    /// Only jobs that started strictly after this time.
    pub started_after: f64,
    /// Only jobs that completed strictly after this time.
    pub completed_after: Option<f64>,
}

impl JobQuery {
    /// Query for jobs of `association` newer than its watermark, honoring
    /// the owning bank's `ignore_older_than`.
    pub fn for_association(
        association: &Association,
        last_job_timestamp: f64,
        ignore_older_than: Option<f64>,
    ) -> Self {
        Self {
            userid: association.userid,
            bank: association.bank.clone(),
            include_unbanked: association.is_default(),
            started_after: last_job_timestamp,
            completed_after: ignore_older_than,
        }
    }

    /// Whether `job` satisfies this query.
    ///
    /// Records missing a timestamp are not filtered on it, so they reach the
    /// updater and get reported there instead of vanishing silently.
    pub fn matches(&self, job: &JobRecord) -> bool {
        if job.userid != self.userid {
            return false;
        }
        let bank_matches = match job.bank.as_deref() {
            Some(bank) => bank == self.bank,
            None => self.include_unbanked,
        };
        if !bank_matches {
            return false;
        }
        if job.t_run.is_some_and(|t| t <= self.started_after) {
            return false;
        }
        match (self.completed_after, job.t_inactive) {
            (Some(floor), Some(t)) => t > floor,
            _ => true,
        }
    }
}

/// Supplier of completed job records.
///
/// Implemented by [`MemoryJobSource`](crate::jobs::MemoryJobSource) for tests
/// and by the JSON-lines archive reader in the ledger crate.
pub trait JobSource {
    /// All completed jobs matching `query`, in any order.
    fn completed_jobs(&self, query: &JobQuery) -> Result<Vec<JobRecord>, LedgerError>;
}
