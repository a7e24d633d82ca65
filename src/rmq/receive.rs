//! Receive pipeline — broker deliveries as an acknowledged message stream

use super::config::RmqConfig;
use super::{connect, topology, REPLY_SUCCESS};
use crate::broker::{InboundMessage, MessageStream};
use crate::error::{BrokerError, Result};
use crate::types::EventBody;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, Consumer};
use std::time::Duration;

/// A lazy, unbounded stream of inbound messages from the configured queue
///
/// Owns its connection and channel for its entire lifetime. A transport
/// failure mid-stream is recovered transparently: the stream reconnects,
/// re-declares the topology, and resumes; anything delivered but not yet
/// acknowledged is redelivered by the broker. Deliveries are yielded in
/// broker order and are never acknowledged on the consumer's behalf.
pub struct RmqMessageStream {
    config: RmqConfig,
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
}

impl RmqMessageStream {
    /// Connect, open a channel, ensure the topology, and start consuming
    ///
    /// A transport failure before the first delivery stream exists is fatal
    /// here; retry policy before that point belongs to the caller.
    pub(super) async fn open(config: RmqConfig) -> Result<Self> {
        let connection = connect(&config).await?;
        let (channel, consumer) = start_consumer(&connection, &config).await?;
        Ok(Self {
            config,
            connection,
            channel,
            consumer,
        })
    }

    /// Re-establish connection, channel, topology, and consumer
    async fn reconnect(&mut self) -> Result<()> {
        if self.config.max_reconnect_attempts == 0 {
            return Err(BrokerError::Connection(
                "Transport failed and reconnection is disabled".to_string(),
            ));
        }

        // The old connection is already gone; closing is best-effort.
        let _ = self.connection.close(REPLY_SUCCESS, "reconnecting").await;

        let mut last_error =
            BrokerError::Connection("Receive stream lost its transport".to_string());

        for attempt in 1..=self.config.max_reconnect_attempts {
            tokio::time::sleep(Duration::from_secs(self.config.reconnect_delay_secs)).await;

            match self.try_reestablish().await {
                Ok(()) => {
                    tracing::info!(attempt, "Receive stream re-established");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn try_reestablish(&mut self) -> Result<()> {
        let connection = connect(&self.config).await?;
        let (channel, consumer) = start_consumer(&connection, &self.config).await?;
        self.connection = connection;
        self.channel = channel;
        self.consumer = consumer;
        Ok(())
    }
}

#[async_trait]
impl MessageStream for RmqMessageStream {
    async fn next(&mut self) -> Result<Option<InboundMessage>> {
        loop {
            match self.consumer.next().await {
                Some(Ok(delivery)) => return wrap(delivery).map(Some),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Transport error on receive stream");
                    self.reconnect().await?;
                }
                // The consumer ends when the channel dies or the broker
                // cancels it; both recover the same way.
                None => {
                    tracing::warn!("Consumer stream ended, reconnecting");
                    self.reconnect().await?;
                }
            }
        }
    }

    /// Release channel, then connection — reverse order of acquisition
    async fn close(self: Box<Self>) -> Result<()> {
        let channel_closed = self.channel.close(REPLY_SUCCESS, "receive stream closed").await;
        let connection_closed = self
            .connection
            .close(REPLY_SUCCESS, "receive stream closed")
            .await;

        channel_closed.map_err(|e| BrokerError::Channel(format!("Failed to close channel: {}", e)))?;
        connection_closed
            .map_err(|e| BrokerError::Connection(format!("Failed to close connection: {}", e)))?;

        tracing::info!("Receive stream closed");
        Ok(())
    }
}

/// Open a channel, ensure the topology, and begin consuming the queue
async fn start_consumer(
    connection: &Connection,
    config: &RmqConfig,
) -> Result<(Channel, Consumer)> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| BrokerError::Channel(format!("Failed to open channel: {}", e)))?;

    let queue = topology::ensure_topology(&channel, config).await?;

    let consumer_tag = format!("{}-{}", config.queue, uuid::Uuid::new_v4());
    let consumer = channel
        .basic_consume(
            queue.name().as_str(),
            &consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            BrokerError::Consume(format!(
                "Failed to consume from queue '{}': {}",
                config.queue, e
            ))
        })?;

    tracing::info!(queue = %config.queue, consumer_tag = %consumer_tag, "Consuming");
    Ok((channel, consumer))
}

/// Decode one delivery into an acknowledgeable inbound message
///
/// A malformed body is a per-message error: the delivery stays
/// unacknowledged so the broker redelivers it once this consumer goes away.
fn wrap(delivery: Delivery) -> Result<InboundMessage> {
    let Delivery {
        delivery_tag,
        data,
        acker,
        ..
    } = delivery;

    let body = EventBody::decode(&data).map_err(|e| {
        tracing::warn!(
            delivery_tag,
            error = %e,
            "Malformed message body left unacknowledged"
        );
        e
    })?;

    Ok(InboundMessage::new(body, move || {
        Box::pin(async move {
            acker
                .ack(BasicAckOptions::default())
                .await
                .map_err(|e| BrokerError::Ack(e.to_string()))
        })
    }))
}
