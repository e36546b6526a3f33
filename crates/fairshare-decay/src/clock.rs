//! The half-life decay clock.
//!
//! A pass is still inside the current window while
//! `end_half_life_period > now - hl_period`. The decision is made once per
//! pass and shared by every association, so no two associations can disagree
//! about a boundary that falls mid-pass.

use fairshare_core::constants::half_life_period_secs;
use fairshare_core::error::IntegrityError;
use fairshare_core::types::LedgerHeader;

/// Reject a pass or clear timestamp that is not a finite number of seconds.
///
/// # Errors
///
/// [`IntegrityError::InvalidParameter`] for NaN or an infinity.
pub fn check_timestamp(now: f64) -> Result<f64, IntegrityError> {
    if now.is_finite() {
        Ok(now)
    } else {
        Err(IntegrityError::InvalidParameter(format!("timestamp {now} is not finite")))
    }
}

/// The pass-global window decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassWindow {
    /// Wall-clock time of the pass, Unix seconds.
    pub now: f64,
    /// Whether `now` left the current half-life window.
    pub new_window: bool,
}

impl PassWindow {
    pub fn in_current_window(&self) -> bool {
        !self.new_window
    }
}

/// End of the current half-life period plus the configured half-life.
///
/// A plain value: the ledger loads it from the header, threads it through a
/// pass, and stores the advanced clock in the same commit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayClock {
    end_half_life_period: f64,
    half_life_weeks: u32,
}

impl DecayClock {
    /// # Errors
    ///
    /// [`IntegrityError::InvalidParameter`] if `half_life_weeks` is zero or
    /// `end_half_life_period` is not finite.
    pub fn new(end_half_life_period: f64, half_life_weeks: u32) -> Result<Self, IntegrityError> {
        if half_life_weeks == 0 {
            return Err(IntegrityError::InvalidParameter(
                "priority_decay_half_life must be at least one week".into(),
            ));
        }
        if !end_half_life_period.is_finite() {
            return Err(IntegrityError::InvalidParameter(format!(
                "end_half_life_period {end_half_life_period} is not finite"
            )));
        }
        Ok(Self {
            end_half_life_period,
            half_life_weeks,
        })
    }

    pub fn from_header(header: &LedgerHeader) -> Result<Self, IntegrityError> {
        Self::new(header.end_half_life_period, header.priority_decay_half_life)
    }

    /// Same boundary, different half-life.
    pub fn with_half_life(self, half_life_weeks: u32) -> Result<Self, IntegrityError> {
        Self::new(self.end_half_life_period, half_life_weeks)
    }

    pub fn end_half_life_period(&self) -> f64 {
        self.end_half_life_period
    }

    pub fn half_life_weeks(&self) -> u32 {
        self.half_life_weeks
    }

    /// Length of one period in seconds.
    pub fn hl_period(&self) -> f64 {
        half_life_period_secs(self.half_life_weeks)
    }

    pub fn in_current_window(&self, now: f64) -> bool {
        self.end_half_life_period > now - self.hl_period()
    }

    /// Decide the window for a pass running at `now`.
    pub fn observe(&self, now: f64) -> PassWindow {
        PassWindow {
            now,
            new_window: !self.in_current_window(now),
        }
    }

    /// The clock after a pass at `now`.
    ///
    /// If `now` left the window, the boundary moves forward by whole periods
    /// until `now` is inside the window again. Periods skipped entirely are
    /// not decayed separately; the pass applies one rollover.
    ///
    /// # Errors
    ///
    /// [`IntegrityError::InvalidParameter`] if `now` is not finite, or is so
    /// large that one period no longer moves the boundary.
    pub fn advanced(&self, now: f64) -> Result<Self, IntegrityError> {
        let now = check_timestamp(now)?;
        let hl = self.hl_period();
        let behind = now - hl - self.end_half_life_period;
        if behind < 0.0 {
            return Ok(*self);
        }
        let periods = (behind / hl).floor() + 1.0;
        let mut end = self.end_half_life_period + periods * hl;
        // Float rounding can land exactly on the boundary.
        if end <= now - hl {
            end += hl;
        }
        if !self.with_end(end).in_current_window(now) {
            return Err(IntegrityError::InvalidParameter(format!(
                "timestamp {now} is beyond the decay clock's resolution"
            )));
        }
        Self::new(end, self.half_life_weeks)
    }

    fn with_end(self, end_half_life_period: f64) -> Self {
        Self {
            end_half_life_period,
            ..self
        }
    }

    /// Header carrying this clock and the ledger's fixed bin count.
    pub fn to_header(&self, usage_periods: usize) -> LedgerHeader {
        LedgerHeader {
            end_half_life_period: self.end_half_life_period,
            priority_decay_half_life: self.half_life_weeks,
            usage_periods,
        }
    }
}
