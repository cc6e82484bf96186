use futures_util::future::join_all;
use payment_engine::{
    db_types::{Order, OrderStatus, PaymentId, PaymentStatus},
    NoOpOrderLock,
    PaymentFlowApi,
    PaymentFlowError,
    PaymentGatewayDatabase,
    ResilienceConfig,
    ResilientProviderClient,
    SqliteDatabase,
};
use rust_decimal_macros::dec;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::time::Duration;

use crate::support::{
    fakes::FakeProviderClient,
    prepare_env::{prepare_test_env, random_db_path},
};

mod support;

async fn setup() -> (PaymentFlowApi<SqliteDatabase, FakeProviderClient>, FakeProviderClient) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let provider = FakeProviderClient::new();
    (PaymentFlowApi::new(db, provider.clone()), provider)
}

async fn tear_down<C>(mut api: PaymentFlowApi<SqliteDatabase, C>) {
    let url = api.db().url().to_string();
    api.db_mut().close().await.expect("Error closing database");
    Sqlite::drop_database(&url).await.expect("Error dropping database");
}

async fn order_with_payment(api: &PaymentFlowApi<SqliteDatabase, FakeProviderClient>, user: &str) -> (Order, PaymentId) {
    let order = api.create_order(user, dec!(100), "USD").await.expect("Error creating order");
    let payment = api.create_payment(user, &order.id).await.expect("Error creating payment");
    (order, payment.id)
}

#[tokio::test]
async fn confirming_a_pending_payment_pays_the_order() {
    let (api, _provider) = setup().await;
    let (order, payment_id) = order_with_payment(&api, "alice").await;

    let confirmed = api.confirm_payment("alice", &payment_id).await.expect("Error confirming payment");
    assert_eq!(confirmed.status(), PaymentStatus::Successful);
    assert_eq!(confirmed.id, payment_id);

    let order = api.order_for_user("alice", &order.id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    assert_eq!(order.payments().len(), 1);
    tear_down(api).await;
}

#[tokio::test]
async fn unknown_payments_are_not_found() {
    let (api, _provider) = setup().await;
    let result = api.confirm_payment("alice", &PaymentId::new()).await;
    assert!(matches!(result, Err(PaymentFlowError::PaymentNotFound(_))));
    tear_down(api).await;
}

#[tokio::test]
async fn other_users_payments_are_reported_missing_not_forbidden() {
    let (api, provider) = setup().await;
    let (_, payment_id) = order_with_payment(&api, "bob").await;

    let result = api.confirm_payment("alice", &payment_id).await;
    assert!(matches!(result, Err(PaymentFlowError::PaymentNotFound(_))));
    // The provider was never even asked.
    assert_eq!(provider.calls(), 0);
    let payment = api.db().fetch_payment(&payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Pending);
    tear_down(api).await;
}

#[tokio::test]
async fn a_declined_charge_fails_the_payment_and_leaves_the_order_open() {
    let (api, provider) = setup().await;
    let (order, payment_id) = order_with_payment(&api, "alice").await;
    provider.decline_all();

    let result = api.confirm_payment("alice", &payment_id).await;
    match result {
        Err(e @ PaymentFlowError::ProviderDeclined(_)) => assert!(!e.is_retryable()),
        other => panic!("Expected a declined charge, got {other:?}"),
    }
    let payment = api.db().fetch_payment(&payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Failed);
    let order = api.order_for_user("alice", &order.id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Created);
    // No charge was confirmed, so no business fact was recorded.
    assert!(api.db().fetch_unprocessed_outbox_messages(10).await.unwrap().is_empty());
    tear_down(api).await;
}

#[tokio::test]
async fn an_unreachable_provider_surfaces_as_a_retryable_error() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let raw = FakeProviderClient::new();
    raw.unavailable_all();
    let config = ResilienceConfig {
        attempt_timeout: Duration::from_millis(500),
        retry_backoff: Duration::from_millis(10),
        ..ResilienceConfig::default()
    };
    let api = PaymentFlowApi::new(db, ResilientProviderClient::new(raw.clone(), config));

    let order = api.create_order("alice", dec!(42), "EUR").await.unwrap();
    let payment = api.create_payment("alice", &order.id).await.unwrap();
    let result = api.confirm_payment("alice", &payment.id).await;
    match result {
        Err(e @ PaymentFlowError::ProviderUnavailable(_)) => assert!(e.is_retryable()),
        other => panic!("Expected an unavailable provider, got {other:?}"),
    }
    // The transient failure was retried before giving up.
    assert_eq!(raw.calls(), 3);
    let payment = api.db().fetch_payment(&payment.id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Failed);
    tear_down(api).await;
}

#[tokio::test]
async fn a_payment_cannot_be_confirmed_twice() {
    let (api, _provider) = setup().await;
    let (_, payment_id) = order_with_payment(&api, "alice").await;

    api.confirm_payment("alice", &payment_id).await.expect("Error confirming payment");
    let second = api.confirm_payment("alice", &payment_id).await;
    assert!(matches!(second, Err(PaymentFlowError::Conflict(_))));
    tear_down(api).await;
}

#[tokio::test]
async fn concurrent_confirmations_of_one_order_have_exactly_one_winner() {
    let (api, _provider) = setup().await;
    let order = api.create_order("alice", dec!(100), "USD").await.unwrap();
    let mut payment_ids = Vec::new();
    for _ in 0..4 {
        let payment = api.create_payment("alice", &order.id).await.unwrap();
        payment_ids.push(payment.id);
    }

    let mut handles = Vec::new();
    for payment_id in payment_ids.clone() {
        let api = api.clone();
        handles.push(tokio::spawn(async move { api.confirm_payment("alice", &payment_id).await }));
    }
    let mut successes = 0;
    let mut conflicts = 0;
    for outcome in join_all(handles).await {
        match outcome.expect("Confirmation task panicked") {
            Ok(_) => successes += 1,
            Err(PaymentFlowError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("Unexpected confirmation outcome: {other:?}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 3);

    let order = api.order_for_user("alice", &order.id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    let successful =
        order.payments().iter().filter(|p| p.status() == PaymentStatus::Successful).count();
    assert_eq!(successful, 1);
    // Exactly one business fact pair was recorded, no matter how many attempts raced.
    assert_eq!(api.db().fetch_unprocessed_outbox_messages(10).await.unwrap().len(), 2);
    tear_down(api).await;
}

#[tokio::test]
async fn cancelled_orders_accept_no_payments() {
    let (api, _provider) = setup().await;
    let order = api.create_order("alice", dec!(10), "USD").await.unwrap();
    let cancelled = api.cancel_order("alice", &order.id).await.expect("Error cancelling order");
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);

    assert!(matches!(api.cancel_order("alice", &order.id).await, Err(PaymentFlowError::Conflict(_))));
    assert!(matches!(api.create_payment("alice", &order.id).await, Err(PaymentFlowError::Conflict(_))));
    tear_down(api).await;
}

#[tokio::test]
async fn finalization_runs_unchanged_under_a_no_op_lock() {
    // Single-writer path through the same orchestration, with the lock seam swapped out.
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_lock(&url, 5, NoOpOrderLock).await.expect("Error creating database");
    let api = PaymentFlowApi::new(db, FakeProviderClient::new());

    let order = api.create_order("alice", dec!(100), "USD").await.unwrap();
    let payment = api.create_payment("alice", &order.id).await.unwrap();
    let confirmed = api.confirm_payment("alice", &payment.id).await.expect("Error confirming payment");
    assert_eq!(confirmed.status(), PaymentStatus::Successful);
    assert_eq!(api.order_for_user("alice", &order.id).await.unwrap().status(), OrderStatus::Paid);

    let mut api = api;
    api.db_mut().close().await.expect("Error closing database");
    Sqlite::drop_database(&url).await.expect("Error dropping database");
}

#[tokio::test]
async fn validation_failures_never_reach_the_store() {
    let (api, _provider) = setup().await;
    assert!(matches!(api.create_order("alice", dec!(0), "USD").await, Err(PaymentFlowError::Validation(_))));
    assert!(matches!(api.create_order("alice", dec!(10), "US DOLLAR").await, Err(PaymentFlowError::Validation(_))));
    assert!(matches!(api.create_order("  ", dec!(10), "USD").await, Err(PaymentFlowError::Validation(_))));
    tear_down(api).await;
}
