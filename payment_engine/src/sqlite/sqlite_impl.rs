//! `SqliteDatabase` is a concrete storage backend for the payment engine.
//!
//! Unsurprisingly, it uses SQLite, and implements [`PaymentGatewayDatabase`] on top of the low-level
//! query functions in [`super::db`]. It is generic over the [`OrderLock`] implementation so the
//! finalization logic can run under a no-op lock in single-writer tests.
use std::fmt::Debug;

use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{self, idempotency, lock::SqliteOrderLock, orders, outbox, payments};
use crate::{
    db_types::{
        IdempotencyRecord,
        Order,
        OrderId,
        OrderStatus,
        OutboxMessage,
        Payment,
        PaymentId,
        PaymentStatus,
    },
    traits::{InsertKeyResult, OrderLock, PaymentGatewayDatabase, PaymentGatewayError},
};

#[derive(Clone)]
pub struct SqliteDatabase<L = SqliteOrderLock> {
    url: String,
    pool: SqlitePool,
    lock: L,
}

impl<L> Debug for SqliteDatabase<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase<SqliteOrderLock> {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, PaymentGatewayError> {
        Self::new_with_lock(url, max_connections, SqliteOrderLock).await
    }

    /// Connects using `PE_DATABASE_URL`, or the default database path if unset.
    pub async fn new_from_env() -> Result<Self, PaymentGatewayError> {
        Self::new_with_url(&db::db_url(), 25).await
    }
}

impl<L> SqliteDatabase<L>
where L: OrderLock<Connection = SqliteConnection>
{
    pub async fn new_with_lock(url: &str, max_connections: u32, lock: L) -> Result<Self, PaymentGatewayError> {
        let pool = db::new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool, lock })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl<L> PaymentGatewayDatabase for SqliteDatabase<L>
where L: OrderLock<Connection = SqliteConnection> + Clone + Send + Sync
{
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: Order) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(&order, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        match order {
            Some(mut order) => {
                let order_payments = payments::fetch_payments_for_order(order_id, &mut conn).await?;
                order.attach_payments(order_payments);
                Ok(Some(order))
            },
            None => Ok(None),
        }
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let cancelled = orders::mark_cancelled(order_id, &mut tx).await?;
        match cancelled {
            Some(order) => {
                tx.commit().await?;
                debug!("🗃️ Order [{order_id}] cancelled");
                Ok(order)
            },
            None => {
                let existing = orders::fetch_order(order_id, &mut tx).await?;
                match existing {
                    Some(_) => Err(PaymentGatewayError::OrderAlreadyFinalized(order_id.clone())),
                    None => Err(PaymentGatewayError::OrderNotFound(order_id.clone())),
                }
            },
        }
    }

    async fn insert_payment(&self, payment: Payment) -> Result<Payment, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::insert_payment(&payment, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<Option<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment(payment_id, &mut conn).await?)
    }

    async fn fetch_payments_for_order(&self, order_id: &OrderId) -> Result<Vec<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payments_for_order(order_id, &mut conn).await?)
    }

    async fn mark_payment_failed(&self, payment_id: &PaymentId) -> Result<Option<Payment>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::fetch_payment(payment_id, &mut tx).await?;
        match payment {
            Some(mut payment) if payment.status() == PaymentStatus::Pending => {
                payment.mark_as_failed()?;
                payments::update_payment_status(&payment, &mut tx).await?;
                tx.commit().await?;
                debug!("🗃️ Payment [{payment_id}] marked as failed");
                Ok(Some(payment))
            },
            // Already terminal (or gone): a concurrent finalization got there first. Nothing to do.
            _ => Ok(None),
        }
    }

    async fn finalize_confirmation(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
    ) -> Result<(Order, Payment), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        self.lock.acquire_lock(order_id, &mut tx).await?;

        // Re-read under the lock; this is guaranteed to observe the winner's committed state.
        let mut order = orders::fetch_order(order_id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        let mut payment = payments::fetch_payment(payment_id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::PaymentNotFound(payment_id.clone()))?;

        if order.status() != OrderStatus::Created {
            return Err(PaymentGatewayError::OrderAlreadyFinalized(order_id.clone()));
        }
        if payment.status() != PaymentStatus::Pending {
            return Err(PaymentGatewayError::PaymentNotPending(payment_id.clone()));
        }
        if payments::successful_payment_exists(order_id, &mut tx).await? {
            return Err(PaymentGatewayError::OrderAlreadyConfirmed(order_id.clone()));
        }

        payment.mark_as_completed()?;
        order.mark_as_paid()?;
        payments::update_payment_status(&payment, &mut tx).await?;
        orders::update_order_status(order_id, order.status(), &mut tx).await?;

        let mut events = payment.take_events();
        events.extend(order.take_events());
        outbox::stage_events(&events, &mut tx).await?;

        if let Err(e) = tx.commit().await {
            return Err(match e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    PaymentGatewayError::OrderAlreadyConfirmed(order_id.clone())
                },
                other => other.into(),
            });
        }
        debug!("🗃️ Payment [{payment_id}] finalized; order [{order_id}] is paid");
        Ok((order, payment))
    }

    async fn fetch_idempotency_record(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(idempotency::fetch_record(user_id, key, &mut conn).await?)
    }

    async fn insert_idempotency_record(
        &self,
        record: IdempotencyRecord,
    ) -> Result<InsertKeyResult, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::insert_record(&record, &mut conn).await
    }

    async fn fetch_unprocessed_outbox_messages(&self, limit: u32) -> Result<Vec<OutboxMessage>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(outbox::fetch_unprocessed(limit, &mut conn).await?)
    }

    async fn persist_outbox_results(&self, batch: &[OutboxMessage]) -> Result<(), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        outbox::persist_results(batch, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}
