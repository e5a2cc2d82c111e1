//! Send pacing for broadcasts.
//!
//! Waits a random interval after every delivered message to stay clear
//! of Telegram's flood limits, and sleeps out flood waits when they happen
//! anyway. All waits are cooperative `tokio` sleeps.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Default lower bound of the pause between messages.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(300);

/// Default upper bound of the pause between messages.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(1500);

/// Random inter-message delay within `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    min: Duration,
    max: Duration,
}

impl Default for Pacer {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_DELAY,
            max: DEFAULT_MAX_DELAY,
        }
    }
}

impl Pacer {
    /// Creates a pacer; the bounds are swapped if given in reverse.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// A pacer that never waits between messages.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn bounds(&self) -> (Duration, Duration) {
        (self.min, self.max)
    }

    /// Picks the next delay uniformly from the bounds.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    /// Waits after a successful send. Returns the time waited.
    pub async fn pause(&self) -> Duration {
        let delay = self.next_delay();
        if !delay.is_zero() {
            debug!("Pacing: waiting {:?} before next message", delay);
            tokio::time::sleep(delay).await;
        }
        delay
    }

    /// Sleeps out a flood wait demanded by Telegram.
    pub async fn flood_wait(&self, wait: Duration) {
        warn!("Received flood wait from Telegram: {:?}", wait);
        tokio::time::sleep(wait).await;
    }
}
