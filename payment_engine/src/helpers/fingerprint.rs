use std::fmt::Write;

use sha2::{Digest, Sha256};

use crate::db_types::{OrderId, PaymentId};

/// Stable SHA-256 fingerprint over the logically relevant inputs of a request, hex-encoded.
///
/// The operation name is folded in first, so the same idempotency key used against two different
/// operations can never produce colliding fingerprints.
pub fn request_fingerprint(operation: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    for part in parts {
        hasher.update(b":");
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().fold(String::with_capacity(64), |mut acc, byte| {
        let _ = write!(acc, "{byte:02x}");
        acc
    })
}

/// Fingerprint of a confirm-payment request.
pub fn confirm_payment_fingerprint(user_id: &str, payment_id: &PaymentId) -> String {
    request_fingerprint("confirm", &[user_id, payment_id.as_str()])
}

/// Fingerprint of a create-payment request.
pub fn create_payment_fingerprint(user_id: &str, order_id: &OrderId) -> String {
    request_fingerprint("create-payment", &[user_id, order_id.as_str()])
}
