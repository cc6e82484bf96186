use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderId, Payment, PaymentId},
    traits::PaymentGatewayError,
};

/// Inserts a new payment row. The entity carries its own id and timestamps.
pub async fn insert_payment(payment: &Payment, conn: &mut SqliteConnection) -> Result<(), PaymentGatewayError> {
    sqlx::query(
        r#"
            INSERT INTO payments (id, order_id, user_id, amount, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(payment.id.as_str())
    .bind(payment.order_id.as_str())
    .bind(&payment.user_id)
    .bind(payment.money().amount().to_string())
    .bind(payment.money().currency())
    .bind(payment.status().to_string())
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(conn)
    .await?;
    debug!("🗃️ Payment [{}] inserted against order [{}]", payment.id, payment.order_id);
    Ok(())
}

pub async fn fetch_payment(payment_id: &PaymentId, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(payment_id.as_str()).fetch_optional(conn).await
}

/// All payments against the order. UUIDv7 ids sort in creation order.
pub async fn fetch_payments_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await
}

/// Writes the entity's current status to its row. A violation of the one-successful-payment-per-order
/// index is an expected race outcome and maps to `OrderAlreadyConfirmed`.
pub(crate) async fn update_payment_status(
    payment: &Payment,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    let result = sqlx::query("UPDATE payments SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(payment.status().to_string())
        .bind(payment.id.as_str())
        .execute(conn)
        .await;
    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(PaymentGatewayError::OrderAlreadyConfirmed(payment.order_id.clone()))
        },
        Err(e) => Err(e.into()),
    }
}

/// Whether any payment for the order has already reached `Successful`.
pub(crate) async fn successful_payment_exists(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM payments WHERE order_id = $1 AND status = 'Successful' LIMIT 1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(row.is_some())
}
