use chrono::Utc;
use sqlx::SqliteConnection;

use crate::{
    db_types::IdempotencyRecord,
    traits::{InsertKeyResult, PaymentGatewayError},
};

/// Returns the live record for `(user_id, key)`. Expired records are treated as absent, so a key whose
/// retention window has lapsed falls through to re-execution instead of replaying a stale response.
pub async fn fetch_record(
    user_id: &str,
    key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<IdempotencyRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM idempotency_keys WHERE user_id = $1 AND idempotency_key = $2 AND expires_at > $3")
        .bind(user_id)
        .bind(key)
        .bind(Utc::now().timestamp())
        .fetch_optional(conn)
        .await
}

/// Inserts a record against the `(user_id, key)` unique constraint.
///
/// The conditional upsert replaces a row whose retention window has lapsed (the key is then treated as
/// never seen), while a conflict with a *live* row leaves the store untouched and reports
/// [`InsertKeyResult::AlreadyExists`] — the signal that a concurrent duplicate request won the race.
pub async fn insert_record(
    record: &IdempotencyRecord,
    conn: &mut SqliteConnection,
) -> Result<InsertKeyResult, PaymentGatewayError> {
    let inserted = sqlx::query(
        r#"
            INSERT INTO idempotency_keys
                (id, user_id, idempotency_key, request_hash, response_status, response_body, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, idempotency_key) DO UPDATE SET
                id = excluded.id,
                request_hash = excluded.request_hash,
                response_status = excluded.response_status,
                response_body = excluded.response_body,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            WHERE idempotency_keys.expires_at <= $9
            RETURNING id
        "#,
    )
    .bind(record.id.as_str())
    .bind(&record.user_id)
    .bind(&record.idempotency_key)
    .bind(&record.request_hash)
    .bind(i64::from(record.response_status))
    .bind(&record.response_body)
    .bind(record.created_at)
    .bind(record.expires_at.timestamp())
    .bind(Utc::now().timestamp())
    .fetch_optional(conn)
    .await?;
    Ok(match inserted {
        Some(_) => InsertKeyResult::Inserted,
        None => InsertKeyResult::AlreadyExists,
    })
}
