use crate::{db_types::OrderId, traits::PaymentGatewayError};

/// An exclusive, transaction-scoped lock on a single order row.
///
/// `acquire_lock` is only meaningful inside an open transaction: it blocks until any other transaction
/// holding the lock on the same order commits or rolls back, and the lock is released automatically when
/// the calling transaction ends — there is no explicit unlock. Acquiring the lock again within the same
/// transaction is a no-op.
///
/// This is a thin capability over the store's own row-locking primitive (`SELECT ... FOR UPDATE` on
/// engines that have it), kept behind a trait so the finalization logic can run against a no-op lock in
/// single-writer unit tests and the real thing everywhere else.
#[allow(async_fn_in_trait)]
pub trait OrderLock {
    /// The backend's open-transaction connection type.
    type Connection: Send;

    async fn acquire_lock(&self, order_id: &OrderId, conn: &mut Self::Connection) -> Result<(), PaymentGatewayError>;
}
