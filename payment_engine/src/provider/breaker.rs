use std::{collections::VecDeque, sync::Mutex};

use log::*;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// How far back call outcomes are counted when evaluating the failure ratio.
    pub sampling_window: Duration,
    /// Below this many samples in the window, the circuit never opens.
    pub min_samples: usize,
    /// Failure ratio in the window at which the circuit opens.
    pub failure_ratio: f64,
    /// How long the circuit stays open before admitting a probe call.
    pub break_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            sampling_window: Duration::from_secs(10),
            min_samples: 3,
            failure_ratio: 0.5,
            break_duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum BreakerState {
    /// Calls pass through; outcomes are sampled in a rolling window.
    Closed { samples: VecDeque<(Instant, bool)> },
    /// All calls are rejected until the break expires.
    Open { until: Instant },
    /// One probe call is admitted; its outcome decides between `Closed` and `Open`.
    HalfOpen { probe_in_flight: bool },
}

/// A circuit breaker over the provider charge call.
///
/// Uses [`tokio::time::Instant`], so paused-clock tests can drive the open/half-open transitions
/// deterministically.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, state: Mutex::new(BreakerState::Closed { samples: VecDeque::new() }) }
    }

    /// Returns whether a call may proceed. An expired break transitions the circuit to half-open and
    /// admits the caller as the probe.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { until } => {
                if Instant::now() >= *until {
                    debug!("💳️ Circuit break expired; admitting a probe call");
                    *state = BreakerState::HalfOpen { probe_in_flight: true };
                    true
                } else {
                    false
                }
            },
            BreakerState::HalfOpen { probe_in_flight } => {
                if *probe_in_flight {
                    false
                } else {
                    *probe_in_flight = true;
                    true
                }
            },
        }
    }

    /// Records the outcome of a call previously admitted by [`Self::try_acquire`].
    pub fn record(&self, failure: bool) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *state {
            BreakerState::Closed { samples } => {
                samples.push_back((now, failure));
                while samples.front().map(|(t, _)| now.duration_since(*t) > self.config.sampling_window).unwrap_or(false)
                {
                    samples.pop_front();
                }
                let failures = samples.iter().filter(|(_, failed)| *failed).count();
                if samples.len() >= self.config.min_samples
                    && failures as f64 / samples.len() as f64 >= self.config.failure_ratio
                {
                    warn!("💳️ Circuit opened after {failures}/{} recent charge failures", samples.len());
                    *state = BreakerState::Open { until: now + self.config.break_duration };
                }
            },
            // A late result from a call admitted before the circuit opened; the break already stands.
            BreakerState::Open { .. } => {},
            BreakerState::HalfOpen { .. } => {
                if failure {
                    warn!("💳️ Probe call failed; circuit re-opened");
                    *state = BreakerState::Open { until: now + self.config.break_duration };
                } else {
                    info!("💳️ Probe call succeeded; circuit closed");
                    *state = BreakerState::Closed { samples: VecDeque::new() };
                }
            },
        }
    }
}
