use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Order, OrderId, OrderStatus},
    traits::PaymentGatewayError,
};

/// Inserts a new order row. The entity carries its own id and timestamps.
pub async fn insert_order(order: &Order, conn: &mut SqliteConnection) -> Result<(), PaymentGatewayError> {
    sqlx::query(
        r#"
            INSERT INTO orders (id, user_id, amount, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(order.id.as_str())
    .bind(&order.user_id)
    .bind(order.money().amount().to_string())
    .bind(order.money().currency())
    .bind(order.status().to_string())
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(conn)
    .await?;
    debug!("🗃️ Order [{}] inserted for user {}", order.id, order.user_id);
    Ok(())
}

/// Returns the order row for the given id, without its payments.
pub async fn fetch_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id.as_str()).fetch_optional(conn).await
}

pub(crate) async fn update_order_status(
    order_id: &OrderId,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentGatewayError> {
    let result: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status.to_string())
            .bind(order_id.as_str())
            .fetch_optional(conn)
            .await?;
    result.ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))
}

/// Guarded `Created → Cancelled` transition. Returns `None` when the order does not exist or has already
/// left `Created`; the caller decides which of the two it was.
pub(crate) async fn mark_cancelled(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE orders SET status = 'Cancelled', updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Created'
            RETURNING *
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await
}
