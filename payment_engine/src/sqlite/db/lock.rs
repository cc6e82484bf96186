use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::OrderId,
    traits::{OrderLock, PaymentGatewayError},
};

/// Pessimistic order lock for the SQLite backend.
///
/// SQLite has no row-level `SELECT ... FOR UPDATE`; issuing a write inside the open transaction escalates
/// it to the database write lock, which serialises all concurrent finalization attempts until the holding
/// transaction commits or rolls back. Locking a missing row is a no-op — callers re-validate existence
/// after acquisition. A Postgres backend implements the same trait with
/// `SELECT 1 FROM orders WHERE id = $1 FOR UPDATE`.
#[derive(Debug, Clone, Default)]
pub struct SqliteOrderLock;

impl OrderLock for SqliteOrderLock {
    type Connection = SqliteConnection;

    async fn acquire_lock(&self, order_id: &OrderId, conn: &mut SqliteConnection) -> Result<(), PaymentGatewayError> {
        sqlx::query("UPDATE orders SET id = id WHERE id = $1").bind(order_id.as_str()).execute(conn).await?;
        trace!("🔒️ Acquired order lock for [{order_id}]");
        Ok(())
    }
}

/// A lock that does nothing, for single-writer unit tests of the finalization logic.
#[derive(Debug, Clone, Default)]
pub struct NoOpOrderLock;

impl OrderLock for NoOpOrderLock {
    type Connection = SqliteConnection;

    async fn acquire_lock(&self, _order_id: &OrderId, _conn: &mut SqliteConnection) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}
