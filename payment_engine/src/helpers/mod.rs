//! Small shared helpers for the payment engine.

mod fingerprint;

pub use fingerprint::{confirm_payment_fingerprint, create_payment_fingerprint, request_fingerprint};
