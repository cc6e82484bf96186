//! Capability traits that a storage or provider backend must implement to drive the payment engine.

mod order_lock;
mod payment_gateway_database;
mod payment_provider;

pub use order_lock::OrderLock;
pub use payment_gateway_database::{InsertKeyResult, PaymentGatewayDatabase, PaymentGatewayError};
pub use payment_provider::{ChargeRequest, ChargeResult, PaymentProviderClient};
