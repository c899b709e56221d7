//! Randomized pacing between publish operations.
//!
//! Publishing in rapid bursts is what platform abuse detection looks for, so
//! the upload job sleeps a random duration between items. The bounds are
//! injected configuration rather than a hardcoded constant so tests can run
//! with millisecond ranges.
//!
//! # Example
//!
//! ```
//! # use crosspost::cooldown::CooldownRange;
//! # use std::time::Duration;
//! let range = CooldownRange::new(Duration::from_secs(300), Duration::from_secs(1500));
//! let cooldown = range.sample();
//! assert!(cooldown >= Duration::from_secs(300));
//! assert!(cooldown <= Duration::from_secs(1500));
//! ```
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// An inclusive range of cooldown durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownRange {
    min: Duration,
    max: Duration,
}

impl CooldownRange {
    /// The observed production pacing: five to twenty-five minutes.
    pub const DEFAULT: Self = Self {
        min: Duration::from_secs(300),
        max: Duration::from_secs(1500),
    };

    /// Constructs a range. If `max < min` the bounds are swapped.
    pub const fn new(min: Duration, max: Duration) -> Self {
        if max.as_millis() < min.as_millis() {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    /// A degenerate range that always yields the same duration.
    pub const fn fixed(duration: Duration) -> Self {
        Self {
            min: duration,
            max: duration,
        }
    }

    /// Draws a uniformly random duration from the inclusive range.
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let millis =
            rand::thread_rng().gen_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

impl Default for CooldownRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

pub(crate) enum WaitOutcome {
    Elapsed,
    Cancelled,
}

/// Sleeps through `total` in `tick`-sized steps, observing the cancellation
/// token each step so cancellation latency is bounded by the tick, not the
/// full cooldown. `on_tick` is invoked with the remaining duration after each
/// completed tick.
pub(crate) async fn tick_wait<F>(
    total: Duration,
    tick: Duration,
    token: &CancellationToken,
    mut on_tick: F,
) -> WaitOutcome
where
    F: FnMut(Duration),
{
    let tick = tick.max(Duration::from_millis(1));
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if token.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        let step = tick.min(remaining);
        tokio::select! {
            _ = token.cancelled() => return WaitOutcome::Cancelled,
            _ = tokio::time::sleep(step) => {}
        }
        remaining = remaining.saturating_sub(step);
        if remaining > Duration::ZERO {
            on_tick(remaining);
        }
    }
    WaitOutcome::Elapsed
}
