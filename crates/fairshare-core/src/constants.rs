//! Ledger constants. All timestamps are Unix seconds as `f64`.

/// Seconds in one week. The half-life period is configured in weeks.
pub const SECONDS_PER_WEEK: f64 = 604_800.0;

/// Per-period decay base: usage loses half its weight each half-life.
pub const DECAY_FACTOR: f64 = 0.5;

/// Default number of usage periods (bins) kept per association.
pub const DEFAULT_USAGE_PERIODS: usize = 4;

/// Default `priority_decay_half_life`, in weeks.
pub const DEFAULT_HALF_LIFE_WEEKS: u32 = 1;

/// Decimal places each job's usage contribution is rounded to before summation.
pub const USAGE_ROUNDING_DECIMALS: i32 = 5;

/// Length of one half-life period in seconds.
///
/// # Examples
///
/// ```
/// use fairshare_core::constants::half_life_period_secs;
/// assert_eq!(half_life_period_secs(2), 1_209_600.0);
/// ```
pub fn half_life_period_secs(half_life_weeks: u32) -> f64 {
    half_life_weeks as f64 * SECONDS_PER_WEEK
}

/// Round a usage value to [`USAGE_ROUNDING_DECIMALS`] decimal places.
///
/// # Examples
///
/// ```
/// use fairshare_core::constants::round_usage;
/// assert_eq!(round_usage(1.000_004_9), 1.0);
/// assert_eq!(round_usage(2.123_456), 2.12346);
/// ```
pub fn round_usage(value: f64) -> f64 {
    let scale = 10f64.powi(USAGE_ROUNDING_DECIMALS);
    (value * scale).round() / scale
}
