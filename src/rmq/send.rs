//! Send pipeline — drain outbound event bodies into confirmed durable publishes

use super::config::RmqConfig;
use super::{connect, topology, RmqBroker, REPLY_SUCCESS};
use crate::error::{BrokerError, Result};
use crate::types::EventBody;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::{BasicProperties, Channel};
use std::time::Duration;
use tokio::sync::mpsc;

/// AMQP delivery mode for messages that survive a broker restart
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Run the send pipeline to completion
///
/// Connects, enables publisher confirms on a fresh channel, ensures the
/// topology, then drains `bodies`. On every exit path the confirmation
/// output closes first, then the channel, then the connection.
pub(super) async fn run(
    broker: &RmqBroker,
    bodies: mpsc::Receiver<EventBody>,
    confirmations: mpsc::Sender<EventBody>,
) -> Result<()> {
    let config = broker.config();

    let connection = connect(config).await?;
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| BrokerError::Channel(format!("Failed to open channel: {}", e)))?;

    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(|e| {
            BrokerError::Channel(format!("Failed to enable publisher confirms: {}", e))
        })?;

    topology::ensure_topology(&channel, config).await?;

    let result = drain(broker, &channel, bodies, &confirmations).await;

    drop(confirmations);
    if let Err(e) = channel.close(REPLY_SUCCESS, "send pipeline closed").await {
        tracing::warn!(error = %e, "Failed to close send channel");
    }
    if let Err(e) = connection
        .close(REPLY_SUCCESS, "send pipeline closed")
        .await
    {
        tracing::warn!(error = %e, "Failed to close send connection");
    }

    tracing::info!("Send pipeline closed");
    result
}

/// Publish each body in arrival order, one confirmed publish at a time
///
/// Throughput is deliberately serialized against confirmation latency:
/// the next body is not pulled until the broker confirms the previous one,
/// which also backpressures the producer through the bounded input queue.
async fn drain(
    broker: &RmqBroker,
    channel: &Channel,
    mut bodies: mpsc::Receiver<EventBody>,
    confirmations: &mpsc::Sender<EventBody>,
) -> Result<()> {
    let config = broker.config();

    while let Some(body) = bodies.recv().await {
        let routing_key = match body.subject() {
            Some(subject) => broker.routing_key_for(subject),
            None => return Err(BrokerError::MissingSubject),
        };

        let payload = body.encode()?;
        publish(channel, config, &routing_key, &payload).await?;

        tracing::debug!(
            routing_key = %routing_key,
            bytes = payload.len(),
            "Publish confirmed"
        );

        if confirmations.send(body).await.is_err() {
            // The confirmation consumer hung up: its own cancellation
            // signal, not a fault.
            tracing::debug!("Confirmation receiver dropped, stopping send pipeline");
            return Ok(());
        }
    }

    tracing::debug!("Outbound event body stream exhausted");
    Ok(())
}

/// Publish one persistent message and wait for the broker's confirmation
async fn publish(
    channel: &Channel,
    config: &RmqConfig,
    routing_key: &str,
    payload: &[u8],
) -> Result<()> {
    let confirm = channel
        .basic_publish(
            &config.exchange,
            routing_key,
            BasicPublishOptions::default(),
            payload,
            BasicProperties::default().with_delivery_mode(DELIVERY_MODE_PERSISTENT),
        )
        .await
        .map_err(|e| BrokerError::Publish {
            routing_key: routing_key.to_string(),
            reason: e.to_string(),
        })?;

    let confirmation = tokio::time::timeout(
        Duration::from_secs(config.publish_timeout_secs),
        confirm,
    )
    .await
    .map_err(|_| BrokerError::Confirm {
        routing_key: routing_key.to_string(),
        reason: format!("no confirmation within {}s", config.publish_timeout_secs),
    })?
    .map_err(|e| BrokerError::Confirm {
        routing_key: routing_key.to_string(),
        reason: e.to_string(),
    })?;

    match confirmation {
        Confirmation::Nack(_) => Err(BrokerError::Confirm {
            routing_key: routing_key.to_string(),
            reason: "broker negatively acknowledged the publish".to_string(),
        }),
        _ => Ok(()),
    }
}
