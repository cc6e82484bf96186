use thiserror::Error;

use crate::{
    db_types::{DomainError, OrderId, PaymentId},
    traits::PaymentGatewayError,
};

/// The error type callers of the payment flow API see. Every expected failure mode is a value here;
/// storage-level constraint violations have already been translated into the conflict variants by the
/// backend.
#[derive(Debug, Clone, Error)]
pub enum PaymentFlowError {
    #[error("{0}")]
    Validation(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested payment {0} does not exist")]
    PaymentNotFound(PaymentId),
    #[error("{0}")]
    Conflict(String),
    #[error("Payment provider is currently unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Payment provider declined the charge: {0}")]
    ProviderDeclined(String),
    #[error("Idempotency key was already used with a different request payload")]
    IdempotencyKeyReused,
    #[error("Could not serialize response for idempotent storage: {0}")]
    ResponseSerialization(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl PaymentFlowError {
    /// Whether the caller may retry the same request unchanged and reasonably expect it to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentFlowError::ProviderUnavailable(_))
    }
}

impl From<DomainError> for PaymentFlowError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(msg) => PaymentFlowError::Validation(msg),
            DomainError::Conflict(msg) => PaymentFlowError::Conflict(msg),
        }
    }
}

impl From<PaymentGatewayError> for PaymentFlowError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::DatabaseError(msg) => PaymentFlowError::DatabaseError(msg),
            PaymentGatewayError::OrderNotFound(id) => PaymentFlowError::OrderNotFound(id),
            PaymentGatewayError::PaymentNotFound(id) => PaymentFlowError::PaymentNotFound(id),
            PaymentGatewayError::OrderAlreadyFinalized(_) => {
                PaymentFlowError::Conflict("The order has already been paid or cancelled".to_string())
            },
            PaymentGatewayError::PaymentNotPending(_) => {
                PaymentFlowError::Conflict("The payment is no longer in 'Pending' status".to_string())
            },
            PaymentGatewayError::OrderAlreadyConfirmed(_) => {
                PaymentFlowError::Conflict("Another payment for this order has already been confirmed".to_string())
            },
            PaymentGatewayError::Domain(e) => e.into(),
            PaymentGatewayError::EventSerialization(msg) => PaymentFlowError::DatabaseError(msg),
        }
    }
}
