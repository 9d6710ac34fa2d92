//! Reconnect Backoff
//!
//! Caller-side retry pacing for the binary. The stream client itself never
//! reconnects; the binary asks this policy how long to wait after an
//! unexpected `Disconnected` before calling `refresh(true)` again.
//!
//! Delays grow geometrically from the initial delay up to the cap. Each
//! returned delay is spread by a random jitter.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::ReconnectSettings;

/// Default jitter as a fraction of the delay (±20%).
pub const DEFAULT_JITTER: f64 = 0.2;

/// Exponential backoff with jitter.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use quote_stream::application::reconnect::ReconnectBackoff;
///
/// let mut backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(1))
///     .with_jitter(0.0);
///
/// assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
/// assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
///
/// backoff.reset();
/// assert_eq!(backoff.attempts(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    max_attempts: u32,
    next: Duration,
    attempts: u32,
}

impl ReconnectBackoff {
    /// Doubling backoff from `initial` capped at `max`, unlimited attempts.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: 2.0,
            jitter: DEFAULT_JITTER,
            max_attempts: 0,
            next: initial,
            attempts: 0,
        }
    }

    /// Backoff from configuration.
    #[must_use]
    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self::new(settings.initial_delay, settings.max_delay)
            .with_multiplier(settings.multiplier)
            .with_max_attempts(settings.max_attempts)
    }

    /// Replace the growth factor. Values below 1.0 are raised to 1.0.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        self
    }

    /// Replace the jitter fraction, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Limit the number of attempts (0 = unlimited).
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the next attempt, or `None` once attempts run out.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        self.attempts += 1;

        let delay = self.next;
        self.next = Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
            .map_or(self.max, |grown| grown.min(self.max));

        Some(self.spread(delay))
    }

    /// Start over after a successful connection.
    pub const fn reset(&mut self) {
        self.next = self.initial;
        self.attempts = 0;
    }

    /// Attempts handed out since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the attempt limit has been reached.
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        self.max_attempts > 0 && self.attempts >= self.max_attempts
    }

    fn spread(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn grows_and_caps_without_jitter() {
        let mut backoff = ReconnectBackoff::new(millis(100), millis(500)).with_jitter(0.0);
        let delays: Vec<Duration> = (0..5).filter_map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            [millis(100), millis(200), millis(400), millis(500), millis(500)]
        );
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn jitter_stays_in_band() {
        let mut backoff = ReconnectBackoff::new(millis(1_000), millis(1_000)).with_jitter(0.2);
        for _ in 0..100 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= millis(800) && delay <= millis(1_200), "{delay:?}");
        }
    }

    #[test]
    fn attempts_run_out() {
        let mut backoff = ReconnectBackoff::new(millis(10), millis(10)).with_max_attempts(2);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.exhausted());
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert!(!backoff.exhausted());
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn from_settings_applies_values() {
        let settings = ReconnectSettings {
            enabled: true,
            initial_delay: millis(50),
            max_delay: millis(120),
            multiplier: 3.0,
            max_attempts: 4,
        };
        let mut backoff = ReconnectBackoff::from_settings(&settings).with_jitter(0.0);
        assert_eq!(backoff.next_delay(), Some(millis(50)));
        assert_eq!(backoff.next_delay(), Some(millis(120)));
    }

    #[test]
    fn degenerate_inputs_are_sanitized() {
        let mut backoff = ReconnectBackoff::new(millis(10), millis(5))
            .with_multiplier(f64::NAN)
            .with_jitter(-1.0);
        assert_eq!(backoff.next_delay(), Some(millis(10)));
        assert_eq!(backoff.next_delay(), Some(millis(10)));
    }
}
