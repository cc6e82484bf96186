use payment_engine::{
    BatchStats,
    OutboxConfig,
    OutboxProcessor,
    OutboxProcessorHandle,
    PaymentFlowApi,
    PaymentGatewayDatabase,
    SqliteDatabase,
};
use rust_decimal_macros::dec;
use serde_json::Value;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::{sync::watch, time::Duration};

use crate::support::{
    fakes::{FakeProviderClient, MemoryPublisher},
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

async fn tear_down(mut api: PaymentFlowApi<SqliteDatabase, FakeProviderClient>) {
    let url = api.db().url().to_string();
    api.db_mut().close().await.expect("Error closing database");
    Sqlite::drop_database(&url).await.expect("Error dropping database");
}

async fn confirm_one_payment(api: &PaymentFlowApi<SqliteDatabase, FakeProviderClient>) {
    let order = api.create_order("alice", dec!(100), "USD").await.unwrap();
    let payment = api.create_payment("alice", &order.id).await.unwrap();
    api.confirm_payment("alice", &payment.id).await.expect("Error confirming payment");
}

fn quick_config() -> OutboxConfig {
    OutboxConfig { interval: Duration::from_millis(50), batch_size: 20 }
}

#[tokio::test]
async fn a_confirmation_captures_exactly_two_messages() {
    let (api, _provider) = setup().await;
    confirm_one_payment(&api).await;

    let messages = api.db().fetch_unprocessed_outbox_messages(10).await.unwrap();
    assert_eq!(messages.len(), 2);
    let mut types: Vec<&str> = messages.iter().map(|m| m.event_type.as_str()).collect();
    types.sort_unstable();
    assert_eq!(types, vec!["OrderPaid", "PaymentSucceeded"]);
    for message in &messages {
        assert!(!message.is_processed());
        assert_eq!(message.retry_count, 0);
        let content: Value = serde_json::from_str(&message.content).expect("Outbox content is not valid JSON");
        assert!(content.get("order_id").is_some());
    }
    tear_down(api).await;
}

#[tokio::test]
async fn a_declined_charge_captures_nothing() {
    let (api, provider) = setup().await;
    provider.decline_all();
    let order = api.create_order("alice", dec!(100), "USD").await.unwrap();
    let payment = api.create_payment("alice", &order.id).await.unwrap();
    let _ = api.confirm_payment("alice", &payment.id).await;

    assert!(api.db().fetch_unprocessed_outbox_messages(10).await.unwrap().is_empty());
    tear_down(api).await;
}

#[tokio::test]
async fn processed_messages_are_never_republished() {
    let (api, _provider) = setup().await;
    confirm_one_payment(&api).await;
    let publisher = MemoryPublisher::new();
    let processor = OutboxProcessor::new(api.db().clone(), publisher.clone(), quick_config());

    let stats = processor.process_batch().await.expect("Error processing batch");
    assert_eq!(stats, BatchStats { fetched: 2, published: 2 });
    assert!(api.db().fetch_unprocessed_outbox_messages(10).await.unwrap().is_empty());
    assert_eq!(publisher.published().len(), 2);

    // A second cycle finds nothing; the rows stay processed.
    let stats = processor.process_batch().await.expect("Error processing batch");
    assert_eq!(stats, BatchStats::default());
    assert_eq!(publisher.published().len(), 2);
    tear_down(api).await;
}

#[tokio::test]
async fn failed_publishes_are_recorded_and_retried_on_a_later_cycle() {
    let (api, _provider) = setup().await;
    confirm_one_payment(&api).await;
    let publisher = MemoryPublisher::new();
    publisher.fail(true);
    let processor = OutboxProcessor::new(api.db().clone(), publisher.clone(), quick_config());

    let stats = processor.process_batch().await.expect("Error processing batch");
    assert_eq!(stats, BatchStats { fetched: 2, published: 0 });
    let messages = api.db().fetch_unprocessed_outbox_messages(10).await.unwrap();
    assert_eq!(messages.len(), 2);
    for message in &messages {
        assert_eq!(message.retry_count, 1);
        assert!(message.error.as_deref().unwrap_or_default().contains("sink unreachable"));
    }

    // The sink recovers; the next cycle drains the backlog.
    publisher.fail(false);
    let stats = processor.process_batch().await.expect("Error processing batch");
    assert_eq!(stats, BatchStats { fetched: 2, published: 2 });
    assert!(api.db().fetch_unprocessed_outbox_messages(10).await.unwrap().is_empty());
    assert_eq!(publisher.published().len(), 2);
    tear_down(api).await;
}

#[tokio::test]
async fn the_background_loop_publishes_and_shuts_down_cleanly() {
    let (api, _provider) = setup().await;
    let publisher = MemoryPublisher::new();
    let processor = OutboxProcessor::new(api.db().clone(), publisher.clone(), quick_config());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = OutboxProcessorHandle::new(shutdown_tx, tokio::spawn(processor.run(shutdown_rx)));

    confirm_one_payment(&api).await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while publisher.published().len() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(publisher.published().len(), 2);

    handle.shutdown().await;
    // After shutdown no further cycles run.
    confirm_one_payment(&api).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(api.db().fetch_unprocessed_outbox_messages(10).await.unwrap().len(), 2);
    tear_down(api).await;
}
