use std::fmt::Debug;

use log::*;
use rust_decimal::Decimal;

use crate::{
    db_types::{Order, OrderId, OrderStatus, Payment, PaymentId},
    pe_api::errors::PaymentFlowError,
    traits::{ChargeRequest, ChargeResult, PaymentGatewayDatabase, PaymentProviderClient},
};

/// `PaymentFlowApi` is the primary API for creating orders, initiating payments against them, and
/// confirming those payments against the external provider.
///
/// Confirmation is a strictly ordered two-phase protocol: the provider is charged first, outside any
/// database transaction (so no lock is ever held across a network call), and only a confirmed charge
/// enters the finalization transaction, which holds the order lock just long enough to re-validate and
/// flip the order/payment state. At most one confirmation per order can ever finalize.
#[derive(Clone)]
pub struct PaymentFlowApi<B, C> {
    db: B,
    provider: C,
}

impl<B, C> Debug for PaymentFlowApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B, C> PaymentFlowApi<B, C> {
    pub fn new(db: B, provider: C) -> Self {
        Self { db, provider }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B, C> PaymentFlowApi<B, C>
where
    B: PaymentGatewayDatabase,
    C: PaymentProviderClient,
{
    /// Creates a new order for the given user.
    pub async fn create_order(
        &self,
        user_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<Order, PaymentFlowError> {
        let order = Order::create(user_id, amount, currency)?;
        let order = self.db.insert_order(order).await?;
        debug!("🔄️📦️ Order [{}] created for user {}", order.id, order.user_id);
        Ok(order)
    }

    /// Fetches an order, with its payments attached. Orders of other users are reported as missing, not
    /// as forbidden — a non-owner learns nothing about their existence.
    pub async fn order_for_user(&self, user_id: &str, order_id: &OrderId) -> Result<Order, PaymentFlowError> {
        let order = self
            .db
            .fetch_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| PaymentFlowError::OrderNotFound(order_id.clone()))?;
        Ok(order)
    }

    /// Cancels an order that has not been paid yet.
    pub async fn cancel_order(&self, user_id: &str, order_id: &OrderId) -> Result<Order, PaymentFlowError> {
        // Ownership first, so a non-owner gets NotFound rather than the conflict detail.
        let _ = self.order_for_user(user_id, order_id).await?;
        let order = self.db.cancel_order(order_id).await?;
        debug!("🔄️📦️ Order [{order_id}] cancelled by user {user_id}");
        Ok(order)
    }

    /// Initiates a new `Pending` payment against an order. The payment inherits the order's amount and
    /// currency.
    pub async fn create_payment(&self, user_id: &str, order_id: &OrderId) -> Result<Payment, PaymentFlowError> {
        let mut order = self.order_for_user(user_id, order_id).await?;
        if order.status() != OrderStatus::Created {
            return Err(PaymentFlowError::Conflict(
                "Cannot initiate a payment for an order that is not in 'Created' status".to_string(),
            ));
        }
        let payment = Payment::create(order.id.clone(), user_id, order.money().amount(), order.money().currency())?;
        order.add_payment(payment.clone())?;
        let payment = self.db.insert_payment(payment).await?;
        debug!("🔄️💰️ Payment [{}] initiated against order [{order_id}]", payment.id);
        Ok(payment)
    }

    /// All payments recorded against one of the user's orders, in creation order.
    pub async fn payments_for_order(&self, user_id: &str, order_id: &OrderId) -> Result<Vec<Payment>, PaymentFlowError> {
        let _ = self.order_for_user(user_id, order_id).await?;
        Ok(self.db.fetch_payments_for_order(order_id).await?)
    }

    /// Confirms a pending payment: charges the external provider and, on success, finalizes the payment
    /// and its order atomically.
    ///
    /// The provider call happens before — and entirely outside — the finalization transaction, bounding
    /// the lock hold time to the finalize step. An unsuccessful charge marks the payment `Failed` in its
    /// own short transaction (a no-op if the payment already left `Pending`) and surfaces as
    /// [`PaymentFlowError::ProviderUnavailable`] (retryable) or [`PaymentFlowError::ProviderDeclined`]
    /// (not retryable). Concurrent confirmations of the same order are serialised by the order lock;
    /// exactly one wins, the rest return a Conflict.
    pub async fn confirm_payment(&self, user_id: &str, payment_id: &PaymentId) -> Result<Payment, PaymentFlowError> {
        // 1. Load without a lock, validating ownership before anything else happens.
        let payment = self
            .db
            .fetch_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentFlowError::PaymentNotFound(payment_id.clone()))?;
        let order = self
            .db
            .fetch_order(&payment.order_id)
            .await?
            .ok_or_else(|| PaymentFlowError::PaymentNotFound(payment_id.clone()))?;
        if payment.user_id != user_id || order.user_id != user_id {
            // Existence is never revealed to a non-owner.
            return Err(PaymentFlowError::PaymentNotFound(payment_id.clone()));
        }

        // 2. Charge the provider outside any database transaction.
        let request = ChargeRequest {
            payment_id: payment.id.clone(),
            order_id: order.id.clone(),
            money: payment.money().clone(),
        };
        let reference = match self.provider.charge(&request).await {
            ChargeResult::Succeeded { reference } => reference,
            ChargeResult::Failed { reason } => {
                self.fail_payment_after_charge(payment_id).await;
                return Err(PaymentFlowError::ProviderDeclined(reason));
            },
            ChargeResult::Unavailable { reason } | ChargeResult::Timeout { reason } => {
                self.fail_payment_after_charge(payment_id).await;
                return Err(PaymentFlowError::ProviderUnavailable(reason));
            },
        };
        trace!("🔄️💳️ Provider accepted charge for payment [{payment_id}] (ref {reference})");

        // 3. Finalize under the order lock. Constraint violations inside are already mapped to conflicts.
        let (order, payment) = self.db.finalize_confirmation(&order.id, payment_id).await?;
        info!("🔄️✅️ Payment [{payment_id}] confirmed; order [{}] is paid", order.id);
        Ok(payment)
    }

    /// Best-effort compensation after an unsuccessful charge. Failure to record the failed status is
    /// logged and swallowed — the payment is still `Pending` and the caller already receives the charge
    /// error.
    async fn fail_payment_after_charge(&self, payment_id: &PaymentId) {
        match self.db.mark_payment_failed(payment_id).await {
            Ok(Some(_)) => debug!("🔄️❌️ Payment [{payment_id}] marked as failed after an unsuccessful charge"),
            Ok(None) => trace!("🔄️❌️ Payment [{payment_id}] already left 'Pending'; nothing to record"),
            Err(e) => error!("🔄️❌️ Could not mark payment [{payment_id}] as failed: {e}"),
        }
    }
}
