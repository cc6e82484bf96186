use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db_types::{OrderId, PaymentId};

/// Raised by [`crate::db_types::Order::mark_as_paid`] when an order transitions to `Paid`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPaidEvent {
    pub order_id: OrderId,
    pub occurred_on: DateTime<Utc>,
}

/// Raised by [`crate::db_types::Payment::mark_as_completed`] when a payment transitions to `Successful`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSucceededEvent {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub occurred_on: DateTime<Utc>,
}

/// An immutable domain fact raised by an entity during a state transition.
///
/// Events accumulate on the entity that raised them and are harvested by the persistence layer at commit
/// time, each becoming one outbox row in the same transaction as the state change that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    OrderPaid(OrderPaidEvent),
    PaymentSucceeded(PaymentSucceededEvent),
}

impl DomainEvent {
    /// The type tag stored alongside the serialized payload, and handed to the publisher.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderPaid(_) => "OrderPaid",
            DomainEvent::PaymentSucceeded(_) => "PaymentSucceeded",
        }
    }

    pub fn occurred_on(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::OrderPaid(e) => e.occurred_on,
            DomainEvent::PaymentSucceeded(e) => e.occurred_on,
        }
    }
}
