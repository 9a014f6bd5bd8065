use std::time::Duration;

use rand::Rng;

/// Delay before the single retry of a failed remote write. With jitter the
/// delay is drawn uniformly from `0..=base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), true)
    }
}

impl Backoff {
    pub fn new(base: Duration, jitter: bool) -> Self {
        Self { base, jitter }
    }

    /// No waiting at all; used where retries must not slow a caller down.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, false)
    }

    pub fn delay(&self) -> Duration {
        self.delay_with_rng(&mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if !self.jitter || self.base.is_zero() {
            return self.base;
        }
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rng.gen_range(0..=base_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn without_jitter_waits_the_base_delay() {
        let backoff = Backoff::new(Duration::from_millis(250), false);
        assert_eq!(backoff.delay(), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_within_base() {
        let backoff = Backoff::new(Duration::from_millis(400), true);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..16 {
            assert!(backoff.delay_with_rng(&mut rng) <= Duration::from_millis(400));
        }
    }

    #[test]
    fn immediate_never_waits() {
        assert_eq!(Backoff::immediate().delay(), Duration::ZERO);
    }
}
