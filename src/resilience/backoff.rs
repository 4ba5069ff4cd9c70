//! Exponential backoff with jitter, compatible with the v1 AWS SDK.
//!
//! # Algorithm
//! ```text
//! min_delay = 500ms if throttled else 30ms
//! actual_retry_count = floor(log2(min_delay as nanoseconds)) + 1
//! if actual_retry_count < 63 - attempt:
//!     delay = 2^attempt * jitter(min_delay)
//!     if delay > max_retry_delay: delay = jitter(max_retry_delay / 2)
//! else:
//!     delay = jitter(max_retry_delay / 2)
//! jitter(d) is uniform in [d, 2d)
//! ```
//!
//! `log2` is taken over the nanosecond count of `min_delay`. The legacy SDK
//! does the same and the resulting thresholds are kept as they are.

use std::error::Error as StdError;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::resilience::errors::{self, BoxError};
use crate::resilience::retries::BackoffDelayer;
use crate::sync::MutexKV;

/// MutexKV key guarding the shared random source.
pub const SEEDED_RAND_KEY: &str = "seeded-rand";

/// Floor for non-throttling errors.
pub const MIN_DELAY: Duration = Duration::from_millis(30);

/// Floor for throttling errors.
pub const MIN_THROTTLE_DELAY: Duration = Duration::from_millis(500);

/// Decides whether an error is a throttling response.
pub trait ThrottleClassifier: Send + Sync {
    fn is_throttle(&self, err: &(dyn StdError + 'static)) -> bool;
}

impl<F> ThrottleClassifier for F
where
    F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync,
{
    fn is_throttle(&self, err: &(dyn StdError + 'static)) -> bool {
        self(err)
    }
}

/// Classifies by service error code and HTTP 429.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultThrottleClassifier;

impl ThrottleClassifier for DefaultThrottleClassifier {
    fn is_throttle(&self, err: &(dyn StdError + 'static)) -> bool {
        errors::is_throttle_error(err)
    }
}

/// Pseudo-random source shared by every backoff computation.
///
/// Draws are serialized through the [`SEEDED_RAND_KEY`] lock of the injected
/// [`MutexKV`], so other code holding that key excludes jitter draws too. That
/// key lock is the coordination point. The inner `Mutex` only provides
/// interior mutability for the generator and is uncontended, since every
/// draw already holds the key.
#[derive(Debug)]
pub struct SharedRand {
    kv: Arc<MutexKV>,
    rng: Mutex<StdRng>,
}

impl SharedRand {
    /// Seed from OS entropy.
    pub fn new(kv: Arc<MutexKV>) -> Self {
        Self {
            kv,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic source, for tests and reproducible runs.
    pub fn with_seed(kv: Arc<MutexKV>, seed: u64) -> Self {
        Self {
            kv,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Uniform duration in `[d, 2d)`. Zero stays zero.
    pub fn jitter(&self, d: Duration) -> Duration {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX / 2);
        if nanos == 0 {
            return Duration::ZERO;
        }

        let _guard = self.kv.lock(SEEDED_RAND_KEY);
        let extra = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..nanos);

        Duration::from_nanos(nanos.saturating_add(extra))
    }
}

/// The v1-compatible backoff policy.
#[derive(Clone)]
pub struct JitterBackoff {
    max_retry_delay: Duration,
    rand: Arc<SharedRand>,
    classifier: Arc<dyn ThrottleClassifier>,
}

impl std::fmt::Debug for JitterBackoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitterBackoff")
            .field("max_retry_delay", &self.max_retry_delay)
            .finish_non_exhaustive()
    }
}

impl JitterBackoff {
    /// Create a policy drawing jitter from a fresh source guarded by `kv`.
    pub fn new(max_retry_delay: Duration, kv: Arc<MutexKV>) -> Self {
        Self::with_rand(max_retry_delay, Arc::new(SharedRand::new(kv)))
    }

    /// Create a policy drawing jitter from an existing shared source.
    pub fn with_rand(max_retry_delay: Duration, rand: Arc<SharedRand>) -> Self {
        Self {
            max_retry_delay,
            rand,
            classifier: Arc::new(DefaultThrottleClassifier),
        }
    }

    /// Replace the throttle classifier.
    pub fn with_throttle_classifier(mut self, classifier: impl ThrottleClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    /// Delay before retry number `attempt` (0-based) after `err`.
    pub fn delay(&self, attempt: u32, err: Option<&(dyn StdError + 'static)>) -> Duration {
        let min_delay = match err {
            Some(e) if self.classifier.is_throttle(e) => MIN_THROTTLE_DELAY,
            _ => MIN_DELAY,
        };

        if actual_retry_count(min_delay) < 63 - i64::from(attempt) {
            let base = self.rand.jitter(min_delay).as_nanos();
            let delay = base.saturating_mul(1u128 << attempt);
            if delay > self.max_retry_delay.as_nanos() {
                return self.rand.jitter(self.max_retry_delay / 2);
            }
            // delay <= max_retry_delay, which fits a Duration.
            return u64::try_from(delay)
                .map(Duration::from_nanos)
                .unwrap_or(self.max_retry_delay);
        }

        self.rand.jitter(self.max_retry_delay / 2)
    }
}

impl BackoffDelayer for JitterBackoff {
    fn backoff_delay(
        &self,
        attempt: u32,
        err: Option<&(dyn StdError + 'static)>,
    ) -> Result<Duration, BoxError> {
        Ok(self.delay(attempt, err))
    }
}

/// `floor(log2(nanoseconds)) + 1`.
fn actual_retry_count(min_delay: Duration) -> i64 {
    (min_delay.as_nanos() as f64).log2().floor() as i64 + 1
}
