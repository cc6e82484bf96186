use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::OutboxMessage, events::DomainEvent, traits::PaymentGatewayError};

/// Serializes each raised domain event into an outbox row on the given connection. Callers pass the
/// connection of the transaction that holds the entity mutation, which is what couples "the fact was
/// recorded" atomically to "the state changed".
pub(crate) async fn stage_events(events: &[DomainEvent], conn: &mut SqliteConnection) -> Result<(), PaymentGatewayError> {
    for event in events {
        let message = OutboxMessage::from_event(event)
            .map_err(|e| PaymentGatewayError::EventSerialization(e.to_string()))?;
        insert_message(&message, &mut *conn).await?;
        trace!("🗃️ Staged outbox message {} ({})", message.id, message.event_type);
    }
    Ok(())
}

pub async fn insert_message(message: &OutboxMessage, conn: &mut SqliteConnection) -> Result<(), PaymentGatewayError> {
    sqlx::query(
        r#"
            INSERT INTO outbox_messages (id, occurred_on, event_type, content, processed_on, error, retry_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(message.id.as_str())
    .bind(message.occurred_on)
    .bind(&message.event_type)
    .bind(&message.content)
    .bind(message.processed_on)
    .bind(message.error.as_deref())
    .bind(message.retry_count)
    .execute(conn)
    .await?;
    Ok(())
}

/// Up to `limit` unprocessed messages in occurrence order (UUIDv7 ids sort by time). A Postgres backend
/// appends `FOR UPDATE SKIP LOCKED` so concurrent processor instances never claim the same rows; SQLite's
/// single-writer lock makes a claim step moot.
pub async fn fetch_unprocessed(limit: u32, conn: &mut SqliteConnection) -> Result<Vec<OutboxMessage>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM outbox_messages WHERE processed_on IS NULL ORDER BY id LIMIT $1")
        .bind(i64::from(limit))
        .fetch_all(conn)
        .await
}

/// Writes back `processed_on` / `error` / `retry_count` for every message in the batch. The caller wraps
/// this in one transaction so the whole batch's bookkeeping lands in a single write.
pub(crate) async fn persist_results(batch: &[OutboxMessage], conn: &mut SqliteConnection) -> Result<(), PaymentGatewayError> {
    for message in batch {
        sqlx::query("UPDATE outbox_messages SET processed_on = $1, error = $2, retry_count = $3 WHERE id = $4")
            .bind(message.processed_on)
            .bind(message.error.as_deref())
            .bind(message.retry_count)
            .bind(message.id.as_str())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
