//! Exchange and queue topology — idempotent declare and bind

use super::config::RmqConfig;
use crate::error::{BrokerError, Result};
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind, Queue};

/// Declare the fan-out exchange and durable queue, and bind them
///
/// Called once per channel per pipeline run. Broker-side declarations are
/// idempotent for identical parameters, so independent pipeline instances
/// (including separate process replicas) may declare the same topology
/// concurrently. A mismatch with an existing definition — say an exchange
/// of a different kind under the same name — is fatal and surfaces here,
/// before any message flows.
pub async fn ensure_topology(channel: &Channel, config: &RmqConfig) -> Result<Queue> {
    channel
        .exchange_declare(
            &config.exchange,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            BrokerError::Topology(format!(
                "Failed to declare exchange '{}': {}",
                config.exchange, e
            ))
        })?;

    let queue = channel
        .queue_declare(
            &config.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            BrokerError::Topology(format!("Failed to declare queue '{}': {}", config.queue, e))
        })?;

    // Fan-out delivery ignores the binding key; the queue name is recorded
    // anyway so bindings stay distinguishable in broker tooling.
    channel
        .queue_bind(
            &config.queue,
            &config.exchange,
            &config.queue,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            BrokerError::Topology(format!(
                "Failed to bind queue '{}' to exchange '{}': {}",
                config.queue, config.exchange, e
            ))
        })?;

    tracing::info!(
        exchange = %config.exchange,
        queue = %config.queue,
        "Topology ready"
    );

    Ok(queue)
}
