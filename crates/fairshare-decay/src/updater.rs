//! Per-association usage update.
//!
//! Each association lands in exactly one [`UsageCase`], chosen from two
//! facts: whether any well-formed new job was folded, and whether the pass
//! is still inside the current half-life window.

use ordered_float::OrderedFloat;
use tracing::{debug, warn};

use fairshare_core::constants::DECAY_FACTOR;
use fairshare_core::store::LedgerWrite;
use fairshare_core::types::{AssociationKey, JobRecord, UsageBins};

use crate::bins::UsageBinSet;
use crate::clock::PassWindow;

/// The four update cases of an association within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UsageCase {
    /// No new jobs, same window: history unchanged, nothing written.
    NoChangeInWindow,
    /// No new jobs, window rolled over: decay only.
    DecayOnly,
    /// New jobs, same window: add to the current period.
    AppendInWindow,
    /// New jobs, window rolled over: decay, then start the new period with
    /// the new usage.
    AppendAcrossWindow,
}

impl UsageCase {
    pub fn classify(has_new_jobs: bool, in_current_window: bool) -> Self {
        match (has_new_jobs, in_current_window) {
            (false, true) => Self::NoChangeInWindow,
            (false, false) => Self::DecayOnly,
            (true, true) => Self::AppendInWindow,
            (true, false) => Self::AppendAcrossWindow,
        }
    }

    /// Whether this case changes stored usage.
    pub fn writes_back(self) -> bool {
        self != Self::NoChangeInWindow
    }
}

/// Outcome of updating one association.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationUpdate {
    pub key: AssociationKey,
    pub case: UsageCase,
    /// Bins after the update.
    pub bins: UsageBins,
    /// Historical usage after the update.
    pub job_usage: f64,
    pub jobs_folded: usize,
    pub jobs_skipped: usize,
}

impl AssociationUpdate {
    /// Ledger writes for this update; empty for [`UsageCase::NoChangeInWindow`].
    pub fn writes(&self) -> Vec<LedgerWrite> {
        if !self.case.writes_back() {
            return Vec::new();
        }
        vec![
            LedgerWrite::PutUsageBins {
                key: self.key.clone(),
                bins: self.bins.clone(),
            },
            LedgerWrite::SetAssociationUsage {
                key: self.key.clone(),
                job_usage: self.job_usage,
            },
        ]
    }
}

/// Folds new jobs into an association's bins and applies decay.
#[derive(Debug, Clone)]
pub struct AssociationUsageUpdater {
    decay_factor: f64,
}

impl Default for AssociationUsageUpdater {
    fn default() -> Self {
        Self::new()
    }
}

impl AssociationUsageUpdater {
    pub fn new() -> Self {
        Self {
            decay_factor: DECAY_FACTOR,
        }
    }

    pub fn decay_factor(&self) -> f64 {
        self.decay_factor
    }

    /// Update one association.
    ///
    /// `jobs` are the association's new jobs in any order; they are folded in
    /// ascending `t_inactive`. Malformed records are logged and skipped.
    pub fn update(
        &self,
        key: AssociationKey,
        bins: UsageBins,
        mut jobs: Vec<JobRecord>,
        window: &PassWindow,
    ) -> AssociationUpdate {
        let mut set = UsageBinSet::from_bins(bins);
        jobs.sort_by_key(|job| OrderedFloat(job.t_inactive.unwrap_or(f64::NEG_INFINITY)));

        let mut jobs_folded = 0;
        let mut jobs_skipped = 0;
        for job in &jobs {
            match job.usage_contribution() {
                Ok(contribution) => {
                    let completed_at = job.t_inactive.unwrap_or(set.last_job_timestamp());
                    set.fold_job(contribution, completed_at);
                    jobs_folded += 1;
                }
                Err(e) => {
                    warn!(association = %key, error = %e, "skipping malformed job record");
                    jobs_skipped += 1;
                }
            }
        }

        let case = UsageCase::classify(jobs_folded > 0, window.in_current_window());
        match case {
            UsageCase::NoChangeInWindow => {}
            UsageCase::AppendInWindow => set.absorb_incoming(),
            UsageCase::DecayOnly | UsageCase::AppendAcrossWindow => {
                set.apply_decay(self.decay_factor);
            }
        }
        let job_usage = set.historical_total();

        debug!(
            association = %key,
            ?case,
            job_usage,
            jobs_folded,
            jobs_skipped,
            last_job_timestamp = set.last_job_timestamp(),
            "association usage updated"
        );

        AssociationUpdate {
            key,
            case,
            bins: set.to_bins(),
            job_usage,
            jobs_folded,
            jobs_skipped,
        }
    }
}
