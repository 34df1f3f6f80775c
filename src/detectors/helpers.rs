//! Rounding and percent-change arithmetic shared by the detector and the rollup.

/// Default entry slippage multiplier (0.1% above the signal close).
pub const DEFAULT_SLIPPAGE: f64 = 1.001;
/// Default number of trades kept per signal date.
pub const DEFAULT_MAX_TRADES_PER_DAY: usize = 2;
/// Bars in one detection window (d0..=d4).
pub const WINDOW: usize = 5;

/// Round to 2 decimals, half-up on the scaled value.
///
/// `round2(1.005)` is whatever `1.005 * 100.0` rounds to; no decimal correction is applied.
#[inline]
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0 + 0.5).floor() / 100.0;
    // -0.0 would print as "-0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Percent change from `from` to `to`, rounded to 2 decimals.
///
/// Returns `None` when `from` is zero or either side is not finite.
#[inline]
pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 || !from.is_finite() || !to.is_finite() {
        return None;
    }
    let change = round2((to - from) / from * 100.0);
    change.is_finite().then_some(change)
}

/// Add `next` to a running total and round, the stepwise way the rollup accumulates.
#[inline]
pub fn add_round2(acc: f64, next: f64) -> f64 {
    round2(acc + next)
}
