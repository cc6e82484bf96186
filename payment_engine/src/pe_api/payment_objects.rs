use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderId, Payment, PaymentId, PaymentStatus};

/// Serializable view of a payment — the shape stored (and replayed byte-for-byte) by the idempotency
/// layer, and the natural response body for transport layers to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentSnapshot {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id.clone(),
            order_id: payment.order_id.clone(),
            user_id: payment.user_id.clone(),
            amount: payment.money().amount(),
            currency: payment.money().currency().to_string(),
            status: payment.status(),
            created_at: payment.created_at,
        }
    }
}
