use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
    Mutex,
};

use payment_engine::{
    events::{IntegrationEventPublisher, PublishError},
    ChargeRequest,
    ChargeResult,
    PaymentProviderClient,
};

/// Deterministic provider double. The behaviour switches are shared across clones, so a test can keep a
/// handle and change the provider's weather mid-flight.
#[derive(Clone, Default)]
pub struct FakeProviderClient {
    decline_all: Arc<AtomicBool>,
    unavailable_all: Arc<AtomicBool>,
    calls: Arc<AtomicU32>,
}

impl FakeProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decline_all(&self) {
        self.decline_all.store(true, Ordering::SeqCst);
    }

    pub fn unavailable_all(&self) {
        self.unavailable_all.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentProviderClient for FakeProviderClient {
    async fn charge(&self, request: &ChargeRequest) -> ChargeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable_all.load(Ordering::SeqCst) {
            return ChargeResult::Unavailable {
                reason: format!("Fake provider is unreachable for payment '{}'", request.payment_id),
            };
        }
        if self.decline_all.load(Ordering::SeqCst) {
            return ChargeResult::Failed { reason: format!("Fake provider declined payment '{}'", request.payment_id) };
        }
        ChargeResult::Succeeded { reference: format!("FAKE-{}", request.payment_id) }
    }
}

/// Publisher double that records everything it publishes, and can be told to fail.
#[derive(Clone, Default)]
pub struct MemoryPublisher {
    failing: Arc<AtomicBool>,
    published: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

impl IntegrationEventPublisher for MemoryPublisher {
    async fn publish(&self, event_type: &str, content: &str) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError("sink unreachable".to_string()));
        }
        self.published.lock().unwrap().push((event_type.to_string(), content.to_string()));
        Ok(())
    }
}
