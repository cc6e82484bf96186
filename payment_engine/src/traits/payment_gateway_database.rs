use thiserror::Error;

use crate::db_types::{
    DomainError,
    IdempotencyRecord,
    Order,
    OrderId,
    OutboxMessage,
    Payment,
    PaymentId,
};

/// Outcome of inserting an idempotency record against the store's `(user_id, key)` unique constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertKeyResult {
    /// The record was stored (or replaced an expired record for the same key).
    Inserted,
    /// A live record for the same `(user_id, key)` already exists; a concurrent duplicate won the race.
    AlreadyExists,
}

/// This trait defines the behaviour a storage backend must provide to support the payment engine.
///
/// This behaviour includes:
/// * Persisting and fetching orders and payments.
/// * The finalization transaction for a confirmed charge, including the order lock, the invariant
///   re-checks, and the harvesting of raised domain events into the outbox.
/// * Idempotency record storage with unique-constraint race detection.
/// * Outbox storage for the background processor.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Persists a freshly created order.
    async fn insert_order(&self, order: Order) -> Result<Order, PaymentGatewayError>;

    /// Fetches an order by id, with its payments attached. Returns `None` if it does not exist.
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError>;

    /// Transitions an order from `Created` to `Cancelled` in a single guarded update. Returns the updated
    /// order, or a conflict if the order has already been paid or cancelled.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, PaymentGatewayError>;

    /// Persists a freshly created payment.
    async fn insert_payment(&self, payment: Payment) -> Result<Payment, PaymentGatewayError>;

    /// Fetches a payment by id. Returns `None` if it does not exist.
    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<Option<Payment>, PaymentGatewayError>;

    /// Fetches all payments recorded against the given order, in creation order.
    async fn fetch_payments_for_order(&self, order_id: &OrderId) -> Result<Vec<Payment>, PaymentGatewayError>;

    /// Best-effort transition of a payment to `Failed` in its own short transaction, used after an
    /// unsuccessful provider charge. Returns `None` (a no-op) if the payment has already left `Pending`.
    async fn mark_payment_failed(&self, payment_id: &PaymentId) -> Result<Option<Payment>, PaymentGatewayError>;

    /// The finalization step of a confirmed charge, in one atomic transaction:
    ///
    /// 1. Acquire the exclusive order lock.
    /// 2. Re-read the order and payment, now guaranteed to see the latest committed state.
    /// 3. Re-check that the order is still `Created`, the payment is still `Pending`, and no other payment
    ///    for the order has reached `Successful`.
    /// 4. Apply `mark_as_completed` / `mark_as_paid`, persist both rows, and write one outbox row per
    ///    raised domain event.
    /// 5. Commit. A unique violation of the one-successful-payment-per-order index — a race the lock
    ///    somehow missed — maps to [`PaymentGatewayError::OrderAlreadyConfirmed`].
    ///
    /// Exactly one concurrent caller per order can ever succeed; the rest fail their re-checks
    /// deterministically once the winner commits.
    async fn finalize_confirmation(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
    ) -> Result<(Order, Payment), PaymentGatewayError>;

    /// Fetches the live (non-expired) idempotency record for `(user_id, key)`, if any.
    async fn fetch_idempotency_record(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, PaymentGatewayError>;

    /// Inserts an idempotency record. A unique violation against a live record is reported as
    /// [`InsertKeyResult::AlreadyExists`] rather than an error; an expired record for the same key is
    /// replaced in place.
    async fn insert_idempotency_record(
        &self,
        record: IdempotencyRecord,
    ) -> Result<InsertKeyResult, PaymentGatewayError>;

    /// Fetches up to `limit` unprocessed outbox messages in occurrence order, skipping rows already
    /// claimed by a concurrent processor instance where the store supports it.
    async fn fetch_unprocessed_outbox_messages(&self, limit: u32) -> Result<Vec<OutboxMessage>, PaymentGatewayError>;

    /// Persists the processing results (`processed_on`, `retry_count`, `error`) for a whole batch of
    /// outbox messages in one write.
    async fn persist_outbox_results(&self, batch: &[OutboxMessage]) -> Result<(), PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested payment {0} does not exist")]
    PaymentNotFound(PaymentId),
    #[error("Order {0} has already been paid or cancelled")]
    OrderAlreadyFinalized(OrderId),
    #[error("Payment {0} is no longer in 'Pending' status")]
    PaymentNotPending(PaymentId),
    #[error("Another payment for order {0} has already been confirmed")]
    OrderAlreadyConfirmed(OrderId),
    #[error("{0}")]
    Domain(#[from] DomainError),
    #[error("Could not serialize domain event: {0}")]
    EventSerialization(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
