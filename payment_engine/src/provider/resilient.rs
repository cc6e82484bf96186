use log::*;
use tokio::time::{timeout, Duration};

use crate::{
    provider::{BreakerConfig, CircuitBreaker},
    traits::{ChargeRequest, ChargeResult, PaymentProviderClient},
};

#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Time budget for a single charge attempt.
    pub attempt_timeout: Duration,
    /// How many extra attempts are made after a transient failure or timeout.
    pub max_retries: u32,
    /// Constant delay between attempts.
    pub retry_backoff: Duration,
    pub breaker: BreakerConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(2),
            max_retries: 2,
            retry_backoff: Duration::from_millis(100),
            breaker: BreakerConfig::default(),
        }
    }
}

/// Decorator that wraps a raw [`PaymentProviderClient`] with, outer to inner: a circuit breaker, a
/// bounded constant-backoff retry, and a per-attempt timeout.
///
/// Only transient outcomes (`Unavailable`, `Timeout`) are retried and sampled as breaker failures; a
/// definitive decline is returned as-is and counts as a successful round trip. While the circuit is open,
/// calls fail fast as `Unavailable` without touching the network.
pub struct ResilientProviderClient<C> {
    inner: C,
    config: ResilienceConfig,
    breaker: CircuitBreaker,
}

impl<C> ResilientProviderClient<C> {
    pub fn new(inner: C, config: ResilienceConfig) -> Self {
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Self { inner, config, breaker }
    }
}

impl<C> PaymentProviderClient for ResilientProviderClient<C>
where C: PaymentProviderClient
{
    async fn charge(&self, request: &ChargeRequest) -> ChargeResult {
        if !self.breaker.try_acquire() {
            debug!("💳️ Circuit open; failing charge for payment [{}] fast", request.payment_id);
            return ChargeResult::Unavailable {
                reason: "Payment provider circuit is open; too many recent failures".to_string(),
            };
        }
        let mut attempt = 0u32;
        let result = loop {
            let outcome = match timeout(self.config.attempt_timeout, self.inner.charge(request)).await {
                Ok(result) => result,
                Err(_) => ChargeResult::Timeout {
                    reason: format!(
                        "Payment provider did not respond within {}ms",
                        self.config.attempt_timeout.as_millis()
                    ),
                },
            };
            if outcome.is_transient() && attempt < self.config.max_retries {
                attempt += 1;
                trace!(
                    "💳️ Transient charge failure for payment [{}]; retry {attempt}/{}",
                    request.payment_id,
                    self.config.max_retries
                );
                tokio::time::sleep(self.config.retry_backoff).await;
                continue;
            }
            break outcome;
        };
        self.breaker.record(result.is_transient());
        result
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
        Mutex,
    };

    use pe_common::Money;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db_types::{OrderId, PaymentId};

    /// Provider double whose scripted result can be swapped mid-test.
    #[derive(Clone)]
    struct ScriptedProvider {
        result: Arc<Mutex<ChargeResult>>,
        delay: Option<Duration>,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedProvider {
        fn new(result: ChargeResult) -> Self {
            Self { result: Arc::new(Mutex::new(result)), delay: None, calls: Arc::new(AtomicU32::new(0)) }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn set_result(&self, result: ChargeResult) {
            *self.result.lock().unwrap() = result;
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PaymentProviderClient for ScriptedProvider {
        async fn charge(&self, _request: &ChargeRequest) -> ChargeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.result.lock().unwrap().clone()
        }
    }

    fn request() -> ChargeRequest {
        ChargeRequest {
            payment_id: PaymentId::new(),
            order_id: OrderId::new(),
            money: Money::new(dec!(25), "USD").unwrap(),
        }
    }

    fn test_config() -> ResilienceConfig {
        ResilienceConfig {
            attempt_timeout: Duration::from_secs(2),
            max_retries: 2,
            retry_backoff: Duration::from_millis(100),
            breaker: BreakerConfig {
                sampling_window: Duration::from_secs(10),
                min_samples: 3,
                failure_ratio: 0.5,
                break_duration: Duration::from_secs(30),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_then_surfaced() {
        let provider = ScriptedProvider::new(ChargeResult::Unavailable { reason: "connection refused".to_string() });
        let client = ResilientProviderClient::new(provider.clone(), test_config());
        let result = client.charge(&request()).await;
        assert!(matches!(result, ChargeResult::Unavailable { .. }));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn declines_are_not_retried() {
        let provider = ScriptedProvider::new(ChargeResult::Failed { reason: "insufficient funds".to_string() });
        let client = ResilientProviderClient::new(provider.clone(), test_config());
        let result = client.charge(&request()).await;
        assert_eq!(result, ChargeResult::Failed { reason: "insufficient funds".to_string() });
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_provider_surfaces_as_timeout() {
        let provider = ScriptedProvider::new(ChargeResult::Succeeded { reference: "too-late".to_string() })
            .with_delay(Duration::from_secs(3600));
        let client = ResilientProviderClient::new(provider.clone(), test_config());
        let result = client.charge(&request()).await;
        assert!(matches!(result, ChargeResult::Timeout { .. }));
        // Timeouts are transient, so all retry attempts were used up.
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_fails_fast_without_calling_the_provider() {
        let provider = ScriptedProvider::new(ChargeResult::Unavailable { reason: "down".to_string() });
        let client = ResilientProviderClient::new(provider.clone(), test_config());
        for _ in 0..3 {
            let _ = client.charge(&request()).await;
        }
        let calls_when_open = provider.calls();
        let result = client.charge(&request()).await;
        assert!(matches!(result, ChargeResult::Unavailable { .. }));
        assert_eq!(provider.calls(), calls_when_open);
    }

    #[tokio::test(start_paused = true)]
    async fn circuit_recovers_through_a_successful_probe() {
        let provider = ScriptedProvider::new(ChargeResult::Unavailable { reason: "down".to_string() });
        let client = ResilientProviderClient::new(provider.clone(), test_config());
        for _ in 0..3 {
            let _ = client.charge(&request()).await;
        }
        assert!(matches!(client.charge(&request()).await, ChargeResult::Unavailable { .. }));

        provider.set_result(ChargeResult::Succeeded { reference: "ref-1".to_string() });
        tokio::time::advance(Duration::from_secs(31)).await;
        let probe = client.charge(&request()).await;
        assert_eq!(probe, ChargeResult::Succeeded { reference: "ref-1".to_string() });
        // The circuit is closed again; the next call goes straight through.
        let follow_up = client.charge(&request()).await;
        assert_eq!(follow_up, ChargeResult::Succeeded { reference: "ref-1".to_string() });
    }
}
