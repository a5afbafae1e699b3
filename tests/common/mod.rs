pub mod resource;

use ctor::dtor;
use rowq::{AnyQueue, Config, Queue};
use std::time::Duration;

/// Unique table prefix, so tests sharing a PostgreSQL database do not collide.
pub fn unique_prefix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("t_{}_", &id[..12])
}

pub fn sqlite_config(ttl: Duration) -> Config {
    Config::from_dsn(resource::sqlite_dsn())
        .with_prefix(unique_prefix())
        .with_lease_ttl(ttl)
}

pub fn postgres_config(ttl: Duration) -> Option<Config> {
    resource::postgres_dsn().map(|dsn| {
        Config::from_dsn(dsn)
            .with_prefix(unique_prefix())
            .with_lease_ttl(ttl)
    })
}

/// Connect and create a queue for the given config.
pub async fn create_queue(config: &Config) -> AnyQueue {
    let queue = rowq::connect_with_config(config)
        .await
        .expect("Failed to connect queue");
    queue.create().await.expect("Failed to create queue");
    queue
}

/// A created queue on every available backend: SQLite always, PostgreSQL when configured.
#[allow(dead_code)]
pub async fn all_backends(ttl: Duration) -> Vec<AnyQueue> {
    let mut queues = vec![create_queue(&sqlite_config(ttl)).await];
    match postgres_config(ttl) {
        Some(config) => queues.push(create_queue(&config).await),
        None => eprintln!(
            "{} not set, running against sqlite only",
            resource::POSTGRES_DSN_ENV
        ),
    }
    queues
}

#[allow(dead_code)]
pub fn ids(messages: &[rowq::ConsumerMessage]) -> Vec<i64> {
    let mut ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
    ids.sort_unstable();
    ids
}

#[allow(dead_code)]
pub fn payloads(messages: &[rowq::ConsumerMessage]) -> Vec<String> {
    let mut payloads: Vec<String> = messages
        .iter()
        .map(|m| m.payload_lossy().into_owned())
        .collect();
    payloads.sort();
    payloads
}

#[dtor]
fn cleanup_resources() {
    resource::cleanup();
}
