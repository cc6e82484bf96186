use std::future::Future;

use chrono::Duration;
use log::*;
use serde::Serialize;

use crate::{
    db_types::{IdempotencyRecord, StoredResponse},
    pe_api::errors::PaymentFlowError,
    traits::{InsertKeyResult, PaymentGatewayDatabase},
};

/// How an idempotent request was answered.
#[derive(Debug)]
pub enum IdempotentOutcome<T> {
    /// The use case ran and this is its fresh result.
    Fresh(T),
    /// A previous (or concurrent) identical request already ran; this is its stored response, verbatim.
    Replayed(StoredResponse),
}

impl<T: Serialize> IdempotentOutcome<T> {
    /// The response body as the transport layer would serialize it. For a replay this is the stored body,
    /// byte-for-byte; for a fresh result it is the same serialization that was just stored.
    pub fn response_body(&self) -> Result<String, PaymentFlowError> {
        match self {
            IdempotentOutcome::Fresh(value) => {
                serde_json::to_string(value).map_err(|e| PaymentFlowError::ResponseSerialization(e.to_string()))
            },
            IdempotentOutcome::Replayed(stored) => Ok(stored.body.clone()),
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, IdempotentOutcome::Replayed(_))
    }
}

/// Deduplication-and-replay wrapper for side-effecting use cases.
///
/// Any use case run through [`IdempotencyApi::execute`] becomes safe for clients to retry blindly with
/// the same `Idempotency-Key`: the first execution's successful response is stored against
/// `(user_id, key)` and every repeat — sequential or concurrent — replays it instead of re-applying the
/// side effect. Failures are never stored, so a client may retry a failed request with the same key.
#[derive(Debug, Clone)]
pub struct IdempotencyApi<B> {
    db: B,
    retention: Duration,
}

impl<B> IdempotencyApi<B>
where B: PaymentGatewayDatabase
{
    /// `retention` is how long a stored response keeps blocking re-execution, typically one day.
    pub fn new(db: B, retention: Duration) -> Self {
        Self { db, retention }
    }

    /// Runs `op` under the idempotency protocol:
    ///
    /// 1. A stored record for `(user_id, key)` whose request fingerprint matches replays the stored
    ///    response without running `op`. A fingerprint mismatch is a Conflict — the client reused a key
    ///    for a different request.
    /// 2. Otherwise `op` runs. Its failure is returned as-is and leaves no record behind.
    /// 3. Its success is serialized and stored. If the store reports that a concurrent duplicate won the
    ///    insert race, that duplicate's stored response is replayed instead — the side effect is never
    ///    applied twice on behalf of one key.
    pub async fn execute<T, F, Fut>(
        &self,
        user_id: &str,
        key: &str,
        request_hash: String,
        success_status: u16,
        op: F,
    ) -> Result<IdempotentOutcome<T>, PaymentFlowError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PaymentFlowError>>,
    {
        if let Some(record) = self.db.fetch_idempotency_record(user_id, key).await? {
            if record.request_hash != request_hash {
                warn!("♻️ Idempotency key reused with a different payload by user {user_id}");
                return Err(PaymentFlowError::IdempotencyKeyReused);
            }
            debug!("♻️ Replaying stored response for user {user_id}");
            return Ok(IdempotentOutcome::Replayed(record.stored_response()));
        }

        let value = op().await?;
        let body =
            serde_json::to_string(&value).map_err(|e| PaymentFlowError::ResponseSerialization(e.to_string()))?;
        let record = IdempotencyRecord::new(user_id, key, request_hash.clone(), success_status, body, self.retention);

        match self.db.insert_idempotency_record(record).await? {
            InsertKeyResult::Inserted => Ok(IdempotentOutcome::Fresh(value)),
            InsertKeyResult::AlreadyExists => {
                debug!("♻️ Concurrent duplicate won the race for user {user_id}; replaying its response");
                let record = self.db.fetch_idempotency_record(user_id, key).await?.ok_or_else(|| {
                    PaymentFlowError::DatabaseError(
                        "Idempotency record disappeared right after a duplicate-key insert".to_string(),
                    )
                })?;
                if record.request_hash != request_hash {
                    return Err(PaymentFlowError::IdempotencyKeyReused);
                }
                Ok(IdempotentOutcome::Replayed(record.stored_response()))
            },
        }
    }
}
