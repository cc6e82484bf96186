use log::*;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Failed to publish event: {0}")]
pub struct PublishError(pub String);

/// The sink the outbox processor delivers messages to: a log, a queue, a bus.
///
/// Publishing may fail; the outbox processor records the failure and retries the message on a later cycle,
/// so implementations do not need their own retry logic.
#[allow(async_fn_in_trait)]
pub trait IntegrationEventPublisher: Send + Sync {
    async fn publish(&self, event_type: &str, content: &str) -> Result<(), PublishError>;
}

/// Publisher that writes events to the application log. Useful as a default sink and in development.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher;

impl IntegrationEventPublisher for LoggingEventPublisher {
    async fn publish(&self, event_type: &str, content: &str) -> Result<(), PublishError> {
        info!("📬️ Integration event {event_type}: {content}");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn logging_publisher_never_fails() {
        let publisher = LoggingEventPublisher;
        assert!(publisher.publish("OrderPaid", "{}").await.is_ok());
    }
}
