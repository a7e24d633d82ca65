//! RabbitMQ event transport
//!
//! Implements `MessageBroker` over AMQP 0.9.1: outbound bodies are published
//! persistently to a fan-out exchange under publisher-confirm mode, inbound
//! deliveries from the bound durable queue are exposed as an acknowledged
//! message stream.

mod config;
mod receive;
mod send;
mod topology;

pub use config::RmqConfig;
pub use receive::RmqMessageStream;

use crate::broker::{MessageBroker, MessageStream};
use crate::error::{BrokerError, Result};
use crate::routing::{queue_scoped, RoutingKeyFn};
use crate::types::EventBody;
use async_trait::async_trait;
use lapin::{Connection, ConnectionProperties};
use std::time::Duration;
use tokio::sync::mpsc;

/// AMQP reply code for a normal, deliberate close
pub(crate) const REPLY_SUCCESS: u16 = 200;

/// RabbitMQ-backed message broker
///
/// Holds connection parameters and the routing strategy only. Each pipeline
/// invocation opens, exclusively owns, and releases its own connection and
/// channel, so receive and send pipelines never share transport state.
pub struct RmqBroker {
    config: RmqConfig,
    routing_key: RoutingKeyFn,
}

impl RmqBroker {
    /// Create a broker with the default queue-scoped routing strategy
    pub fn new(config: RmqConfig) -> Self {
        let routing_key = queue_scoped(config.queue.clone());
        Self {
            config,
            routing_key,
        }
    }

    /// Create a broker with a custom routing-key strategy
    pub fn with_routing_key(config: RmqConfig, routing_key: RoutingKeyFn) -> Self {
        Self {
            config,
            routing_key,
        }
    }

    /// The transport configuration
    pub fn config(&self) -> &RmqConfig {
        &self.config
    }

    /// Compute the routing key for a subject
    pub fn routing_key_for(&self, subject: &str) -> String {
        (*self.routing_key)(subject)
    }
}

#[async_trait]
impl MessageBroker for RmqBroker {
    async fn message_receive_stream(&self) -> Result<Box<dyn MessageStream>> {
        let stream = RmqMessageStream::open(self.config.clone()).await?;
        Ok(Box::new(stream))
    }

    async fn send_event_body_stream(
        &self,
        bodies: mpsc::Receiver<EventBody>,
        confirmations: mpsc::Sender<EventBody>,
    ) -> Result<()> {
        send::run(self, bodies, confirmations).await
    }

    fn name(&self) -> &str {
        "rabbitmq"
    }
}

/// Open a broker connection, bounded by the configured timeout
pub(crate) async fn connect(config: &RmqConfig) -> Result<Connection> {
    let connecting = Connection::connect(&config.url, ConnectionProperties::default());

    let connection = tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_secs),
        connecting,
    )
    .await
    .map_err(|_| {
        BrokerError::Timeout(format!(
            "Connecting to '{}' timed out after {}s",
            config.url, config.connect_timeout_secs
        ))
    })?
    .map_err(|e| BrokerError::Connection(format!("{}: {}", config.url, e)))?;

    tracing::info!(url = %config.url, "Connected to RabbitMQ");
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_routing_is_queue_scoped() {
        let broker = RmqBroker::new(RmqConfig {
            queue: "orders".to_string(),
            ..Default::default()
        });
        assert_eq!(broker.routing_key_for("created"), "orders.created");
    }

    #[test]
    fn test_custom_routing_substitutes() {
        let broker = RmqBroker::with_routing_key(
            RmqConfig::default(),
            Arc::new(|subject| format!("custom.{}", subject)),
        );
        assert_eq!(broker.routing_key_for("created"), "custom.created");
        assert_eq!(broker.name(), "rabbitmq");
    }
}
