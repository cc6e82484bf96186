use pe_common::Money;

use crate::db_types::{OrderId, PaymentId};

/// The inputs the external provider needs to attempt a charge.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub money: Money,
}

/// The total outcome of a charge attempt. Clients never return errors; callers branch on this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeResult {
    /// The provider accepted the charge and returned its reference for it.
    Succeeded { reference: String },
    /// A definitive decline. Retrying the same charge will not help.
    Failed { reason: String },
    /// The provider could not be reached, or the circuit is open. Retryable.
    Unavailable { reason: String },
    /// A single attempt exceeded its time budget. Retryable.
    Timeout { reason: String },
}

impl ChargeResult {
    /// Transient outcomes are worth retrying and count as failures for the circuit breaker. A definitive
    /// decline is neither: the provider answered, it just said no.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChargeResult::Unavailable { .. } | ChargeResult::Timeout { .. })
    }
}

/// A client for the external charge API.
///
/// Implementations must be total: every failure mode surfaces as a [`ChargeResult`] variant, never as a
/// panic or error type. Cancellation is cooperative — dropping the returned future abandons the attempt.
#[allow(async_fn_in_trait)]
pub trait PaymentProviderClient: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> ChargeResult;
}
