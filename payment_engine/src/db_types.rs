use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use pe_common::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;
use uuid::Uuid;

use crate::events::{DomainEvent, OrderPaidEvent, PaymentSucceededEvent};

//--------------------------------------     DomainError     ---------------------------------------------------------

/// Outcome of a guarded entity mutation. Business-rule violations are values, not panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
}

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId       ---------------------------------------------------------

/// Time-ordered (UUIDv7) order identifier, stored as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

//--------------------------------------      PaymentId       ---------------------------------------------------------

/// Time-ordered (UUIDv7) payment identifier, stored as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PaymentId(pub String);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PaymentId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for PaymentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

//--------------------------------------     OrderStatus      ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order is newly created and may still receive payments.
    Created,
    /// A payment against the order has been confirmed in full.
    Paid,
    /// The order was cancelled before being paid.
    Cancelled,
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Created => write!(f, "Created"),
            OrderStatus::Paid => write!(f, "Paid"),
            OrderStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Paid" => Ok(Self::Paid),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------    PaymentStatus     ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The payment has been initiated but the provider has not confirmed a charge yet.
    Pending,
    /// The provider charge went through and the payment was finalized.
    Successful,
    /// The provider declined or the charge could not be completed.
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Successful => write!(f, "Successful"),
            PaymentStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Successful" => Ok(Self::Successful),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------        Order         ---------------------------------------------------------

/// An order owned by a single user.
///
/// The status may only move `Created → Paid` or `Created → Cancelled`, and payments may only be attached
/// while the order is still `Created`. Both rules are enforced by the mutators, which return a
/// [`DomainError`] rather than panicking on an illegal transition. Successful transitions push the
/// corresponding [`DomainEvent`] onto the pending-event list, which the persistence layer harvests into the
/// outbox in the same transaction as the row update.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    money: Money,
    status: OrderStatus,
    payments: Vec<Payment>,
    events: Vec<DomainEvent>,
}

impl Order {
    /// Create a new order in `Created` status. The user id must be non-empty and the amount/currency must
    /// form a valid [`Money`] value.
    pub fn create(user_id: &str, amount: Decimal, currency: &str) -> Result<Self, DomainError> {
        if user_id.trim().is_empty() {
            return Err(DomainError::Validation("User id cannot be empty".to_string()));
        }
        let money = Money::new(amount, currency).map_err(|e| DomainError::Validation(e.to_string()))?;
        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
            money,
            status: OrderStatus::Created,
            payments: Vec::new(),
            events: Vec::new(),
        })
    }

    pub fn money(&self) -> &Money {
        &self.money
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// Marks the order as paid and raises [`OrderPaidEvent`]. Not idempotent: a second call returns a
    /// Conflict, since the order has already left `Created`.
    pub fn mark_as_paid(&mut self) -> Result<(), DomainError> {
        if self.status != OrderStatus::Created {
            return Err(DomainError::Conflict(
                "Order can only be marked as paid while it is in 'Created' status".to_string(),
            ));
        }
        self.status = OrderStatus::Paid;
        self.updated_at = Utc::now();
        self.events.push(DomainEvent::OrderPaid(OrderPaidEvent {
            order_id: self.id.clone(),
            occurred_on: self.updated_at,
        }));
        Ok(())
    }

    /// Cancels the order. No event is raised.
    pub fn mark_as_cancelled(&mut self) -> Result<(), DomainError> {
        if self.status != OrderStatus::Created {
            return Err(DomainError::Conflict("Only orders in 'Created' status can be cancelled".to_string()));
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attach a payment to the order's owned collection.
    pub fn add_payment(&mut self, payment: Payment) -> Result<(), DomainError> {
        if payment.order_id != self.id {
            return Err(DomainError::Validation("Payment does not belong to this order".to_string()));
        }
        if self.status != OrderStatus::Created {
            return Err(DomainError::Conflict(
                "Payments can only be attached to an order in 'Created' status".to_string(),
            ));
        }
        self.payments.push(payment);
        Ok(())
    }

    /// Drain the events raised since the last harvest. Called by the persistence layer at commit time.
    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn attach_payments(&mut self, payments: Vec<Payment>) {
        self.payments = payments;
    }
}

//--------------------------------------       Payment        ---------------------------------------------------------

/// A single payment attempt against an order.
///
/// `Pending` is the only non-terminal status. At most one payment per order ever reaches `Successful`;
/// that invariant is re-checked under the order lock during finalization and backstopped by a partial
/// unique index on `payments (order_id) WHERE status = 'Successful'`.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    money: Money,
    status: PaymentStatus,
    events: Vec<DomainEvent>,
}

impl Payment {
    /// Create a new payment in `Pending` status against the given order.
    pub fn create(order_id: OrderId, user_id: &str, amount: Decimal, currency: &str) -> Result<Self, DomainError> {
        if user_id.trim().is_empty() {
            return Err(DomainError::Validation("User id cannot be empty".to_string()));
        }
        let money = Money::new(amount, currency).map_err(|e| DomainError::Validation(e.to_string()))?;
        let now = Utc::now();
        Ok(Self {
            id: PaymentId::new(),
            order_id,
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
            money,
            status: PaymentStatus::Pending,
            events: Vec::new(),
        })
    }

    pub fn money(&self) -> &Money {
        &self.money
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Marks the payment as successful and raises [`PaymentSucceededEvent`].
    pub fn mark_as_completed(&mut self) -> Result<(), DomainError> {
        if self.status != PaymentStatus::Pending {
            return Err(DomainError::Conflict(
                "Only payments in 'Pending' status can be marked as completed".to_string(),
            ));
        }
        self.status = PaymentStatus::Successful;
        self.updated_at = Utc::now();
        self.events.push(DomainEvent::PaymentSucceeded(PaymentSucceededEvent {
            payment_id: self.id.clone(),
            order_id: self.order_id.clone(),
            occurred_on: self.updated_at,
        }));
        Ok(())
    }

    /// Marks the payment as failed. No event is raised.
    pub fn mark_as_failed(&mut self) -> Result<(), DomainError> {
        if self.status != PaymentStatus::Pending {
            return Err(DomainError::Conflict(
                "Only payments in 'Pending' status can be marked as failed".to_string(),
            ));
        }
        self.status = PaymentStatus::Failed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Drain the events raised since the last harvest. Called by the persistence layer at commit time.
    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}

//--------------------------------------  IdempotencyRecord   ---------------------------------------------------------

/// The stored outcome of a side-effecting request, keyed by `(user_id, idempotency_key)`.
///
/// A repeat of the same request replays `response_status`/`response_body` verbatim. The `(user_id, key)`
/// pair is unique at the store level, so concurrent duplicate inserts surface as a constraint violation
/// that callers treat as "another request won the race".
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub id: String,
    pub user_id: String,
    pub idempotency_key: String,
    pub request_hash: String,
    pub response_status: u16,
    pub response_body: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(
        user_id: &str,
        key: &str,
        request_hash: String,
        response_status: u16,
        response_body: String,
        retention: Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            idempotency_key: key.to_string(),
            request_hash,
            response_status,
            response_body,
            created_at,
            expires_at: created_at + retention,
        }
    }

    pub fn stored_response(&self) -> StoredResponse {
        StoredResponse { status: self.response_status, body: self.response_body.clone() }
    }
}

/// The response replayed for a repeated idempotent request, byte-for-byte as originally stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub body: String,
}

//--------------------------------------    OutboxMessage     ---------------------------------------------------------

/// A durably persisted domain event awaiting publication.
///
/// Rows are written in the same transaction as the entity mutation that raised the event, and are only
/// ever mutated by the outbox processor (stamping `processed_on`, or recording a failed attempt). They are
/// never deleted. The UUIDv7 id is time-ordered, so `ORDER BY id` is occurrence order.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub id: String,
    pub occurred_on: DateTime<Utc>,
    pub event_type: String,
    pub content: String,
    pub processed_on: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retry_count: i64,
}

impl OutboxMessage {
    pub fn from_event(event: &DomainEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            occurred_on: event.occurred_on(),
            event_type: event.event_type().to_string(),
            content: serde_json::to_string(event)?,
            processed_on: None,
            error: None,
            retry_count: 0,
        })
    }

    pub fn is_processed(&self) -> bool {
        self.processed_on.is_some()
    }

    pub fn mark_processed(&mut self) {
        self.processed_on = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: &str) {
        self.retry_count += 1;
        self.error = Some(error.to_string());
    }
}

//--------------------------------------   sqlite row mapping  --------------------------------------------------------

#[cfg(feature = "sqlite")]
mod sqlite_rows {
    use std::str::FromStr;

    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use sqlx::{sqlite::SqliteRow, FromRow, Row};

    use super::*;

    fn decode_money(row: &SqliteRow) -> Result<Money, sqlx::Error> {
        let raw: String = row.try_get("amount")?;
        let amount = Decimal::from_str(&raw)
            .map_err(|e| sqlx::Error::ColumnDecode { index: "amount".to_string(), source: Box::new(e) })?;
        let currency: String = row.try_get("currency")?;
        Ok(Money::from_parts(amount, currency))
    }

    fn decode_status<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw: String = row.try_get(column)?;
        raw.parse().map_err(|e: T::Err| sqlx::Error::ColumnDecode { index: column.to_string(), source: Box::new(e) })
    }

    impl FromRow<'_, SqliteRow> for Order {
        fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
            Ok(Order {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
                money: decode_money(row)?,
                status: decode_status(row, "status")?,
                payments: Vec::new(),
                events: Vec::new(),
            })
        }
    }

    impl FromRow<'_, SqliteRow> for Payment {
        fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
            Ok(Payment {
                id: row.try_get("id")?,
                order_id: row.try_get("order_id")?,
                user_id: row.try_get("user_id")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
                money: decode_money(row)?,
                status: decode_status(row, "status")?,
                events: Vec::new(),
            })
        }
    }

    impl FromRow<'_, SqliteRow> for IdempotencyRecord {
        fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
            let status: i64 = row.try_get("response_status")?;
            let response_status = u16::try_from(status)
                .map_err(|e| sqlx::Error::ColumnDecode { index: "response_status".to_string(), source: Box::new(e) })?;
            let expires: i64 = row.try_get("expires_at")?;
            let expires_at = Utc.timestamp_opt(expires, 0).single().ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "expires_at".to_string(),
                source: Box::new(ConversionError(format!("Invalid unix timestamp: {expires}"))),
            })?;
            Ok(IdempotencyRecord {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                idempotency_key: row.try_get("idempotency_key")?,
                request_hash: row.try_get("request_hash")?,
                response_status,
                response_body: row.try_get("response_body")?,
                created_at: row.try_get("created_at")?,
                expires_at,
            })
        }
    }

    impl FromRow<'_, SqliteRow> for OutboxMessage {
        fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
            Ok(OutboxMessage {
                id: row.try_get("id")?,
                occurred_on: row.try_get("occurred_on")?,
                event_type: row.try_get("event_type")?,
                content: row.try_get("content")?,
                processed_on: row.try_get("processed_on")?,
                error: row.try_get("error")?,
                retry_count: row.try_get("retry_count")?,
            })
        }
    }
}
