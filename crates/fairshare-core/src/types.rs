//! Ledger records: associations, banks, usage bins, the ledger header, and
//! completed job records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{half_life_period_secs, round_usage};
use crate::error::JobRecordError;

/// Unique identity of an association: a (username, bank) pair.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct AssociationKey {
    pub username: String,
    pub bank: String,
}

impl AssociationKey {
    pub fn new(username: impl Into<String>, bank: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            bank: bank.into(),
        }
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.username, self.bank)
    }
}

/// A user's membership in a bank, the unit of fairshare accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Association {
    pub username: String,
    /// Numeric user id; matches [`JobRecord::userid`].
    pub userid: u32,
    pub bank: String,
    /// The bank charged for this user's jobs submitted without a bank.
    pub default_bank: String,
    /// Logically disabled associations keep their usage history.
    pub active: bool,
    /// Historical (decayed) usage total.
    pub job_usage: f64,
    /// Derived elsewhere from `job_usage`; stored, never computed here.
    pub fairshare: f64,
}

impl Association {
    pub fn new(username: impl Into<String>, userid: u32, bank: impl Into<String>) -> Self {
        let bank = bank.into();
        Self {
            username: username.into(),
            userid,
            default_bank: bank.clone(),
            bank,
            active: true,
            job_usage: 0.0,
            fairshare: 0.5,
        }
    }

    pub fn key(&self) -> AssociationKey {
        AssociationKey::new(self.username.clone(), self.bank.clone())
    }

    /// Whether this association is the user's default one.
    pub fn is_default(&self) -> bool {
        self.bank == self.default_bank
    }
}

/// A node in the bank tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Bank {
    pub name: String,
    /// `None` for the root bank.
    pub parent_bank: Option<String>,
    pub active: bool,
    /// Aggregate usage of everything under this bank.
    pub job_usage: f64,
    /// Derived elsewhere; stored, never computed here.
    pub priority: f64,
    /// Jobs completed at or before this timestamp are excluded from usage.
    pub ignore_older_than: Option<f64>,
}

impl Bank {
    pub fn new(name: impl Into<String>, parent_bank: Option<String>) -> Self {
        Self {
            name: name.into(),
            parent_bank,
            active: true,
            job_usage: 0.0,
            priority: 0.0,
            ignore_older_than: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_bank.as_deref().is_none_or(str::is_empty)
    }
}

/// Persisted usage history of one association.
///
/// `periods[0]` is the current period; higher indices are older.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UsageBins {
    /// Completion time of the most recently folded job.
    pub last_job_timestamp: f64,
    pub periods: Vec<f64>,
}

impl UsageBins {
    /// All-zero history with `usage_periods` bins.
    pub fn zeroed(usage_periods: usize) -> Self {
        Self {
            last_job_timestamp: 0.0,
            periods: vec![0.0; usage_periods],
        }
    }
}

/// The single global ledger record: the decay clock and the fixed bin count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct LedgerHeader {
    /// End of the current half-life period.
    pub end_half_life_period: f64,
    /// Configured half-life, in weeks.
    pub priority_decay_half_life: u32,
    /// Number of usage periods per association, fixed at creation.
    pub usage_periods: usize,
}

impl LedgerHeader {
    /// Header for a ledger created at `now`: the first period ends one
    /// half-life later.
    pub fn starting_at(now: f64, priority_decay_half_life: u32, usage_periods: usize) -> Self {
        Self {
            end_half_life_period: now + half_life_period_secs(priority_decay_half_life),
            priority_decay_half_life,
            usage_periods,
        }
    }
}

/// A completed job, as supplied by a [`JobSource`](crate::traits::JobSource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub jobid: u64,
    pub userid: u32,
    /// `None` when the job was submitted without a bank.
    #[serde(default)]
    pub bank: Option<String>,
    pub nnodes: u32,
    #[serde(default)]
    pub t_run: Option<f64>,
    #[serde(default)]
    pub t_inactive: Option<f64>,
}

impl JobRecord {
    /// Wall-clock run time, `t_inactive - t_run`.
    pub fn elapsed(&self) -> Result<f64, JobRecordError> {
        let t_run = self
            .t_run
            .ok_or(JobRecordError::MissingRunTime { jobid: self.jobid })?;
        let t_inactive = self
            .t_inactive
            .ok_or(JobRecordError::MissingInactiveTime { jobid: self.jobid })?;
        if !t_run.is_finite() || !t_inactive.is_finite() {
            return Err(JobRecordError::NonFiniteTime { jobid: self.jobid });
        }
        if t_inactive < t_run {
            return Err(JobRecordError::NegativeElapsed {
                jobid: self.jobid,
                t_run,
                t_inactive,
            });
        }
        Ok(t_inactive - t_run)
    }

    /// Usage this job adds to its association: `nnodes * elapsed`, rounded.
    pub fn usage_contribution(&self) -> Result<f64, JobRecordError> {
        Ok(round_usage(self.nnodes as f64 * self.elapsed()?))
    }
}
