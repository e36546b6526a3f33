//! Per-association usage history with half-life decay.
//!
//! Period 0 holds the current half-life window; period `i` holds usage from
//! `i` windows ago. On rollover every period `i` is multiplied by
//! `factor^(i+1)` and moves to `i + 1`; whatever falls off the end is gone.

use fairshare_core::types::UsageBins;

/// Working copy of an association's usage bins during an update pass.
///
/// New job usage is held as an incoming contribution until the updater
/// settles it, either straight into period 0 ([`absorb_incoming`]) or into
/// the fresh period 0 produced by a rollover ([`apply_decay`]).
///
/// [`absorb_incoming`]: UsageBinSet::absorb_incoming
/// [`apply_decay`]: UsageBinSet::apply_decay
#[derive(Debug, Clone, PartialEq)]
pub struct UsageBinSet {
    last_job_timestamp: f64,
    periods: Vec<f64>,
    incoming: f64,
}

impl UsageBinSet {
    /// All-zero history with `usage_periods` bins.
    pub fn new(usage_periods: usize) -> Self {
        Self::from_bins(UsageBins::zeroed(usage_periods))
    }

    pub fn from_bins(bins: UsageBins) -> Self {
        Self {
            last_job_timestamp: bins.last_job_timestamp,
            periods: bins.periods,
            incoming: 0.0,
        }
    }

    /// Persistable form. Unsettled incoming usage is not included.
    pub fn to_bins(&self) -> UsageBins {
        UsageBins {
            last_job_timestamp: self.last_job_timestamp,
            periods: self.periods.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn periods(&self) -> &[f64] {
        &self.periods
    }

    pub fn last_job_timestamp(&self) -> f64 {
        self.last_job_timestamp
    }

    /// Usage folded since the last settle.
    pub fn incoming(&self) -> f64 {
        self.incoming
    }

    /// Accumulate one job's contribution and raise the watermark to
    /// `completion_time` if it is later.
    pub fn fold_job(&mut self, contribution: f64, completion_time: f64) {
        self.incoming += contribution;
        if completion_time > self.last_job_timestamp {
            self.last_job_timestamp = completion_time;
        }
    }

    /// Settle incoming usage into the current period without decay.
    pub fn absorb_incoming(&mut self) {
        if let Some(current) = self.periods.first_mut() {
            *current += self.incoming;
        }
        self.incoming = 0.0;
    }

    /// Roll over one half-life window.
    ///
    /// Period `i` becomes period `i + 1` scaled by `factor^(i+1)`, the oldest
    /// period is dropped, and period 0 receives the incoming usage undecayed.
    /// Returns the sum of the retained decayed periods (incoming excluded).
    pub fn apply_decay(&mut self, factor: f64) -> f64 {
        let n = self.periods.len();
        if n == 0 {
            self.incoming = 0.0;
            return 0.0;
        }

        let decayed: Vec<f64> = self
            .periods
            .iter()
            .take(n - 1)
            .enumerate()
            .map(|(i, usage)| usage * factor.powi(i as i32 + 1))
            .collect();
        let retained: f64 = decayed.iter().sum();

        self.periods.clear();
        self.periods.push(self.incoming);
        self.periods.extend(decayed);
        self.incoming = 0.0;
        retained
    }

    /// Sum of all periods: the association's historical usage.
    pub fn historical_total(&self) -> f64 {
        self.periods.iter().sum()
    }

    /// Zero every period and any incoming usage. The watermark is kept.
    pub fn clear(&mut self) {
        self.periods.iter_mut().for_each(|p| *p = 0.0);
        self.incoming = 0.0;
    }
}
