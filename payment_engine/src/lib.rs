//! Payment Engine
//!
//! The payment engine confirms monetary payments against orders for a multi-tenant service, and does so
//! reliably in the face of an unreliable external payment provider, concurrent confirmation attempts, and
//! client retries. The library is divided into three main sections:
//!
//! 1. Domain and storage types ([`mod@db_types`]), and the capability traits a storage backend implements
//!    ([`PaymentGatewayDatabase`], [`OrderLock`]). SQLite is the bundled backend; you should never need to
//!    access the database directly — use the public API instead.
//! 2. The provider resilience layer: [`ResilientProviderClient`] wraps any raw
//!    [`PaymentProviderClient`] with per-attempt timeouts, bounded retries and a circuit breaker, and
//!    always returns a total [`ChargeResult`] rather than an error.
//! 3. The public API: [`PaymentFlowApi`] (order/payment use cases and the two-phase confirmation
//!    protocol), [`IdempotencyApi`] (store-and-replay deduplication for client-retried requests), and
//!    [`OutboxProcessor`] (background at-least-once publication of the domain events captured durably in
//!    the same transaction as the state changes that raised them).
mod pe_api;
mod provider;
mod traits;

pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{NoOpOrderLock, SqliteDatabase, SqliteOrderLock};

pub use pe_api::{
    errors::PaymentFlowError,
    idempotency_api::{IdempotencyApi, IdempotentOutcome},
    outbox_processor::{BatchStats, OutboxConfig, OutboxProcessor, OutboxProcessorHandle},
    payment_flow_api::PaymentFlowApi,
    payment_objects::PaymentSnapshot,
};
pub use provider::{BreakerConfig, CircuitBreaker, ResilienceConfig, ResilientProviderClient};
pub use traits::{
    ChargeRequest,
    ChargeResult,
    InsertKeyResult,
    OrderLock,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    PaymentProviderClient,
};
