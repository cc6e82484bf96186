//! The public API of the payment engine.
//!
//! [`payment_flow_api::PaymentFlowApi`] is the orchestrator for order and payment use cases, including
//! the two-phase confirmation protocol. [`idempotency_api::IdempotencyApi`] wraps any side-effecting use
//! case in the dedup-and-replay pattern, and [`outbox_processor::OutboxProcessor`] is the background task
//! that pushes captured domain events out to the integration sink.

pub mod errors;
pub mod idempotency_api;
pub mod outbox_processor;
pub mod payment_flow_api;
pub mod payment_objects;
