use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter, used for worker restarts and stream
/// reconnection.
///
/// Delay for attempt `n` is `min(cap, initial * 2^n)` plus or minus
/// `jitter_factor` of that value. A run that lasted at least `stable_after`
/// counts as healthy and resets the sequence.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    cap: Duration,
    jitter_factor: f64,
    stable_after: Duration,
    attempt: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 0.1)
    }
}

impl ExponentialBackoff {
    /// Negative jitter factors are clamped to zero.
    pub fn new(initial: Duration, cap: Duration, jitter_factor: f64) -> Self {
        Self {
            initial,
            cap,
            jitter_factor: jitter_factor.max(0.0),
            stable_after: Duration::from_secs(60),
            attempt: 0,
        }
    }

    /// Minimum run length after which the next failure starts from the
    /// initial delay again.
    pub fn with_stable_after(mut self, stable_after: Duration) -> Self {
        self.stable_after = stable_after;
        self
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt);
        let capped = self.initial.saturating_mul(factor).min(self.cap);

        let spread = capped.as_secs_f64() * self.jitter_factor;
        let jitter = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };

        self.attempt = self.attempt.saturating_add(1);
        Duration::from_secs_f64((capped.as_secs_f64() + jitter).max(0.0))
    }

    /// Delay to wait after a run of the given length ended in failure.
    pub fn delay_after_run(&mut self, ran_for: Duration) -> Duration {
        if ran_for >= self.stable_after {
            self.reset();
        }
        self.next_delay()
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
