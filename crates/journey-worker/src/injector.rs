use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use journey_protocol::FeatureFlagSet;
use rand::Rng;
use tokio::time::Instant;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Bernoulli fault injection with an optional per-minute cap.
#[derive(Debug, Default)]
pub struct FaultInjector {
    recent: Mutex<VecDeque<Instant>>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw once against `errorsPerTransaction`. Returns false without drawing
    /// when injection is off for the request or the minute's budget is spent.
    pub fn should_fail(&self, flags: &FeatureFlagSet, enabled_for_request: bool) -> bool {
        if !enabled_for_request || !flags.error_injection_enabled() {
            return false;
        }
        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        while recent
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= RATE_WINDOW)
        {
            recent.pop_front();
        }
        if flags.errors_per_minute > 0 && recent.len() >= flags.errors_per_minute as usize {
            return false;
        }
        let p = if flags.errors_per_transaction.is_finite() {
            flags.errors_per_transaction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let hit = rand::thread_rng().gen_bool(p);
        if hit {
            recent.push_back(now);
        }
        hit
    }
}
