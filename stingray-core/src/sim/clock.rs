//! Time control and random number generation for deterministic runs.

use std::time::Duration;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{Result, StingrayError};

/// Virtual clock for simulation time control.
///
/// Tracks elapsed time since simulation start as a plain [`Duration`],
/// independent of wall-clock time. Time only moves forward and is advanced
/// exclusively by the scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualClock {
    now: Duration,
}

impl VirtualClock {
    /// Creates a clock at simulation time zero.
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
        }
    }

    /// Returns current simulation time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Advances simulation time to a specific instant.
    ///
    /// # Errors
    ///
    /// - `StingrayError::InvalidDelay` - If the target time is in the past
    pub fn advance_to(&mut self, target: Duration) -> Result<()> {
        if target < self.now {
            return Err(StingrayError::InvalidDelay {
                reason: format!(
                    "virtual clock cannot move backwards ({:?} -> {target:?})",
                    self.now
                ),
            });
        }
        self.now = target;
        Ok(())
    }
}

/// Converts a seconds value from configuration into a virtual-time duration.
///
/// # Errors
///
/// - `StingrayError::InvalidDelay` - If the value is negative, NaN, or infinite
pub fn duration_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| StingrayError::InvalidDelay {
        reason: format!("{secs} seconds is not a valid non-negative duration"),
    })
}

/// Deterministic random number generator for reproducible runs.
///
/// Uses the ChaCha8 algorithm; the same seed always produces the same
/// sequence of draws, which keeps terminal placement and link-loss decisions
/// identical across runs.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Creates a deterministic RNG from a seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Returns the seed used for this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates a random number in range [0, 1).
    pub fn random_f64(&mut self) -> f64 {
        self.rng.next_u64() as f64 / u64::MAX as f64
    }

    /// Generates a random value in range [min, max).
    pub fn random_range(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        min + self.random_f64() * (max - min)
    }

    /// Generates a random boolean with the given probability of `true`.
    pub fn random_bool(&mut self, probability: f64) -> bool {
        self.random_f64() < probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_forward() {
        let mut clock = VirtualClock::new();
        clock.advance_to(Duration::from_secs(3)).unwrap();
        assert_eq!(clock.now(), Duration::from_secs(3));

        clock.advance_to(Duration::from_secs(3)).unwrap();
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn clock_rejects_backwards_movement() {
        let mut clock = VirtualClock::new();
        clock.advance_to(Duration::from_secs(10)).unwrap();

        let result = clock.advance_to(Duration::from_secs(5));
        assert!(matches!(result, Err(StingrayError::InvalidDelay { .. })));
        assert_eq!(clock.now(), Duration::from_secs(10));
    }

    #[test]
    fn negative_seconds_are_rejected() {
        assert!(matches!(
            duration_from_secs(-1.0),
            Err(StingrayError::InvalidDelay { .. })
        ));
        assert!(duration_from_secs(f64::NAN).is_err());
        assert_eq!(duration_from_secs(1.5).unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn rng_is_reproducible() {
        let mut rng1 = DeterministicRng::from_seed(12345);
        let mut rng2 = DeterministicRng::from_seed(12345);

        let values1: Vec<f64> = (0..10).map(|_| rng1.random_range(0.0, 100.0)).collect();
        let values2: Vec<f64> = (0..10).map(|_| rng2.random_range(0.0, 100.0)).collect();

        assert_eq!(values1, values2);
    }

    #[test]
    fn rng_bool_extremes() {
        let mut rng = DeterministicRng::from_seed(7);
        for _ in 0..100 {
            assert!(!rng.random_bool(0.0));
        }
        for _ in 0..100 {
            assert!(rng.random_bool(1.1));
        }
    }
}
