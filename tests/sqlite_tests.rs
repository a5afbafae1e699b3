//! SQLite-specific behavior.
#![cfg(feature = "sqlite")]

use rowq::{AnyQueue, Config, ConcurrencyModel, Error, Message, Queue};
use std::collections::HashSet;
use std::time::Duration;

mod common;

#[tokio::test]
async fn test_sqlite_backend_properties() {
    let config = common::sqlite_config(Duration::from_millis(250));
    let queue = common::create_queue(&config).await;

    assert_eq!(queue.backend_name(), "sqlite");
    assert_eq!(queue.concurrency_model(), ConcurrencyModel::SingleProcess);
    assert_eq!(queue.lease_ttl(), Duration::from_millis(250));
    assert_eq!(queue.table_name(), format!("{}q", config.prefix));

    queue.destroy().await.unwrap();
}

#[tokio::test]
async fn test_database_file_is_created() {
    let config = common::sqlite_config(Duration::ZERO);
    let path = config
        .dsn
        .strip_prefix("sqlite://")
        .expect("file dsn")
        .to_string();
    assert!(!std::path::Path::new(&path).exists());

    let queue = common::create_queue(&config).await;
    assert!(std::path::Path::new(&path).exists());

    queue.destroy().await.unwrap();
}

#[tokio::test]
async fn test_in_memory_queue_shares_one_database() {
    let config = Config::from_dsn("sqlite::memory:").with_prefix("mem_");
    let queue = common::create_queue(&config).await;

    queue
        .publish(&[Message::from("a"), Message::from("b")])
        .await
        .unwrap();
    let claimed = queue.consume_batch(10).await.unwrap();
    assert_eq!(common::payloads(&claimed), vec!["a", "b"]);
}

#[tokio::test]
async fn test_two_handles_on_one_file_see_the_same_queue() {
    let config = common::sqlite_config(Duration::ZERO);
    let producer = common::create_queue(&config).await;
    let consumer = rowq::connect_with_config(&config).await.unwrap();

    producer.publish(&[Message::from("shared")]).await.unwrap();
    let claimed = consumer.consume_batch(5).await.unwrap();
    assert_eq!(common::payloads(&claimed), vec!["shared"]);

    // Stopping one handle does not stop the other.
    consumer.stop_consumer();
    assert!(consumer.is_stopped());
    assert!(!producer.is_stopped());

    producer.destroy().await.unwrap();
}

#[tokio::test]
async fn test_sub_second_lease() {
    let config = common::sqlite_config(Duration::from_millis(150));
    let queue = common::create_queue(&config).await;

    queue.publish(&[Message::from("short")]).await.unwrap();
    let first = queue.consume_batch(1).await.unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let again = queue.consume_batch(1).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].id, first[0].id);

    // Reclaiming restamps the row, so it is held again.
    assert!(queue.consume_batch(1).await.unwrap().is_empty());

    queue.destroy().await.unwrap();
}

#[tokio::test]
async fn test_large_publish_spans_statements() {
    let config = common::sqlite_config(Duration::ZERO);
    let queue = common::create_queue(&config).await;

    let batch: Vec<Message> = (0..1234).map(|i| Message::from(format!("{}", i))).collect();
    queue.publish(&batch).await.unwrap();
    assert_eq!(queue.metrics().await.unwrap().total_messages, 1234);

    let claimed = queue.consume_batch(2000).await.unwrap();
    assert_eq!(claimed.len(), 1234);
    let receipts: Vec<_> = claimed.iter().map(|m| m.ack()).collect();
    queue.commit(&receipts).await.unwrap();
    assert_eq!(queue.metrics().await.unwrap().total_messages, 0);

    queue.destroy().await.unwrap();
}

#[tokio::test]
async fn test_connect_rejects_invalid_prefix() {
    let config = Config::from_dsn("sqlite::memory:").with_prefix("bad-prefix; DROP");
    let err = rowq::connect_with_config(&config).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { ref field, .. } if field == "prefix"));
}

#[tokio::test]
async fn test_connect_rejects_unknown_scheme() {
    let err = rowq::connect("mysql://localhost/db").await.unwrap_err();
    assert!(err.to_string().contains("Unsupported DSN format"));
}

fn sqlite_pool(queue: &AnyQueue) -> &sqlx::SqlitePool {
    match queue {
        AnyQueue::Sqlite(q) => q.pool(),
        #[allow(unreachable_patterns)]
        _ => panic!("expected sqlite queue"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claims_succeed_while_producer_publishes() {
    const TOTAL: usize = 500;
    let config = common::sqlite_config(Duration::ZERO);
    let producer = common::create_queue(&config).await;
    let consumer = rowq::connect_with_config(&config).await.unwrap();

    let publisher = tokio::spawn(async move {
        for i in 0..TOTAL {
            producer
                .publish(&[Message::from(format!("job-{}", i))])
                .await
                .unwrap();
        }
        producer
    });

    let mut seen = HashSet::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    while seen.len() < TOTAL {
        assert!(tokio::time::Instant::now() < deadline, "consumer stalled at {}", seen.len());
        let claimed = consumer
            .consume_batch(10)
            .await
            .expect("claim must not fail while a producer is writing");
        let receipts: Vec<_> = claimed.iter().map(|m| m.ack()).collect();
        consumer.commit(&receipts).await.unwrap();
        for message in claimed {
            assert!(seen.insert(message.id), "message {} claimed twice", message.id);
        }
        if receipts.is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    let producer = publisher.await.unwrap();
    assert_eq!(producer.metrics().await.unwrap().total_messages, 0);
    producer.destroy().await.unwrap();
}

#[tokio::test]
async fn test_publish_is_all_or_nothing_across_statements() {
    let config = common::sqlite_config(Duration::ZERO);
    let queue = common::create_queue(&config).await;

    // Reject one payload that lands in the second insert statement.
    sqlx::query(&format!(
        "CREATE TRIGGER {table}_reject BEFORE INSERT ON {table} \
         WHEN CAST(NEW.payload AS TEXT) = 'reject' \
         BEGIN SELECT RAISE(ABORT, 'rejected payload'); END",
        table = queue.table_name()
    ))
    .execute(sqlite_pool(&queue))
    .await
    .unwrap();

    let batch: Vec<Message> = (0..800)
        .map(|i| {
            if i == 700 {
                Message::from("reject")
            } else {
                Message::from(format!("{}", i))
            }
        })
        .collect();

    assert!(queue.publish(&batch).await.is_err());
    assert_eq!(queue.metrics().await.unwrap().total_messages, 0);

    // The handle stays usable after the rolled back batch.
    queue.publish(&batch[..10]).await.unwrap();
    assert_eq!(queue.metrics().await.unwrap().total_messages, 10);

    queue.destroy().await.unwrap();
}

#[tokio::test]
async fn test_in_memory_pool_never_recycles_its_connection() {
    let config = Config::from_dsn("sqlite::memory:").with_prefix("pinned_");
    let queue = common::create_queue(&config).await;

    let options = sqlite_pool(&queue).options();
    assert_eq!(options.get_max_connections(), 1);
    assert_eq!(options.get_min_connections(), 1);
    assert_eq!(options.get_idle_timeout(), None);
    assert_eq!(options.get_max_lifetime(), None);
}
