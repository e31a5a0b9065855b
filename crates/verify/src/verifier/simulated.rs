use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Verifier;
use crate::error::VerifyError;
use crate::query::ValidQuery;

/// Hard ceiling on any simulated delay.
pub const MAX_SIMULATED_DELAY: Duration = Duration::from_secs(60);

/// How the simulated authority behaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationProfile {
    /// Upper bound of the uniformly drawn delay. Capped at
    /// [`MAX_SIMULATED_DELAY`].
    pub max_delay: Duration,
    /// Probability of a `true` verdict.
    pub approval_probability: f64,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        SimulationProfile {
            max_delay: MAX_SIMULATED_DELAY,
            approval_probability: 0.5,
            seed: None,
        }
    }
}

/// Stand-in for the slow, unpredictable external cadastral registry.
///
/// Each answer draws a delay uniformly from `[0, max_delay]` (millisecond
/// resolution) and, independently, a verdict. The input does not influence
/// either draw.
pub struct SimulatedAuthority {
    max_delay: Duration,
    approval_probability: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedAuthority {
    pub fn new(profile: SimulationProfile) -> Self {
        let approval_probability = if profile.approval_probability.is_finite() {
            profile.approval_probability.clamp(0.0, 1.0)
        } else {
            0.5
        };
        let rng = match profile.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        SimulatedAuthority {
            max_delay: profile.max_delay.min(MAX_SIMULATED_DELAY),
            approval_probability,
            rng: Mutex::new(rng),
        }
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Draw the next delay and verdict without waiting.
    pub fn draw(&self) -> (Duration, bool) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let delay = Duration::from_millis(rng.gen_range(0..=max_ms));
        let verdict = rng.gen_bool(self.approval_probability);
        (delay, verdict)
    }

    /// Wait the drawn delay, then return the drawn verdict.
    pub async fn answer(&self) -> bool {
        let (delay, verdict) = self.draw();
        tokio::time::sleep(delay).await;
        verdict
    }
}

impl Default for SimulatedAuthority {
    fn default() -> Self {
        Self::new(SimulationProfile::default())
    }
}

#[async_trait]
impl Verifier for SimulatedAuthority {
    async fn verify(&self, query: &ValidQuery) -> Result<bool, VerifyError> {
        tracing::debug!(
            cadastral_number = query.cadastral_number(),
            "simulated authority consulted"
        );
        Ok(self.answer().await)
    }

    fn verifier_id(&self) -> &str {
        "simulated"
    }
}
