mod event_types;
mod publisher;

pub use event_types::{DomainEvent, OrderPaidEvent, PaymentSucceededEvent};
pub use publisher::{IntegrationEventPublisher, LoggingEventPublisher, PublishError};
