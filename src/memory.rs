//! In-memory message broker for testing and single-process use
//!
//! Honors the same contract as the RabbitMQ transport: bodies handed to the
//! send pipeline must carry `_subject`, confirmed bodies are forwarded in
//! publish order, and a stored message stays queued until acknowledged — a
//! stream opened later redelivers anything left unacknowledged.

use crate::broker::{InboundMessage, MessageBroker, MessageStream};
use crate::error::{BrokerError, Result};
use crate::routing::{queue_scoped, RoutingKeyFn};
use crate::types::EventBody;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};

#[derive(Debug)]
struct StoredMessage {
    id: u64,
    payload: Vec<u8>,
}

/// Process-local queue shared by every clone of a broker
#[derive(Debug, Default)]
struct MemoryQueue {
    messages: Mutex<Vec<StoredMessage>>,
    arrival: Notify,
    next_id: AtomicU64,
}

impl MemoryQueue {
    async fn push(&self, payload: Vec<u8>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().await.push(StoredMessage { id, payload });
        self.arrival.notify_one();
    }

    /// Remove an acknowledged message for good
    async fn remove(&self, id: u64) {
        self.messages.lock().await.retain(|m| m.id != id);
    }
}

/// In-memory message broker
///
/// Clones share one underlying queue, so a producer task and a consumer
/// task can each hold their own handle. Payloads round-trip through the
/// same wire encoding as the RabbitMQ transport.
#[derive(Clone)]
pub struct MemoryBroker {
    queue: Arc<MemoryQueue>,
    routing_key: RoutingKeyFn,
}

impl MemoryBroker {
    /// Create a broker with the default queue-scoped routing strategy
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue: Arc::new(MemoryQueue::default()),
            routing_key: queue_scoped(queue_name),
        }
    }

    /// Enqueue a raw payload, bypassing encoding
    ///
    /// Lets tests exercise malformed-body handling on the receive side.
    pub async fn push_raw(&self, payload: Vec<u8>) {
        self.queue.push(payload).await;
    }

    /// Number of messages still awaiting acknowledgment
    pub async fn pending(&self) -> usize {
        self.queue.messages.lock().await.len()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new("events")
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn message_receive_stream(&self) -> Result<Box<dyn MessageStream>> {
        Ok(Box::new(MemoryMessageStream {
            queue: Arc::clone(&self.queue),
            delivered: HashSet::new(),
        }))
    }

    async fn send_event_body_stream(
        &self,
        mut bodies: mpsc::Receiver<EventBody>,
        confirmations: mpsc::Sender<EventBody>,
    ) -> Result<()> {
        while let Some(body) = bodies.recv().await {
            let routing_key = match body.subject() {
                Some(subject) => (*self.routing_key)(subject),
                None => return Err(BrokerError::MissingSubject),
            };

            let payload = body.encode()?;
            self.queue.push(payload).await;

            tracing::debug!(routing_key = %routing_key, "Publish stored");

            if confirmations.send(body).await.is_err() {
                tracing::debug!("Confirmation receiver dropped, stopping send pipeline");
                return Ok(());
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Message stream over the in-memory queue
///
/// Tracks which stored messages this stream already handed out, so an
/// unacknowledged message is not looped back to the same stream but is
/// redelivered to any stream opened afterwards.
struct MemoryMessageStream {
    queue: Arc<MemoryQueue>,
    delivered: HashSet<u64>,
}

impl MemoryMessageStream {
    async fn claim_next(&mut self) -> Option<(u64, Vec<u8>)> {
        let messages = self.queue.messages.lock().await;
        let found = messages
            .iter()
            .find(|m| !self.delivered.contains(&m.id))
            .map(|m| (m.id, m.payload.clone()));

        if let Some((id, _)) = found {
            self.delivered.insert(id);
        }
        found
    }
}

#[async_trait]
impl MessageStream for MemoryMessageStream {
    async fn next(&mut self) -> Result<Option<InboundMessage>> {
        loop {
            if let Some((id, payload)) = self.claim_next().await {
                let body = EventBody::decode(&payload).map_err(|e| {
                    tracing::warn!(id, error = %e, "Malformed message body left unacknowledged");
                    e
                })?;

                let queue = Arc::clone(&self.queue);
                return Ok(Some(InboundMessage::new(body, move || {
                    Box::pin(async move {
                        queue.remove(id).await;
                        Ok(())
                    })
                })));
            }

            self.queue.arrival.notified().await;
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_raw_and_pending() {
        let broker = MemoryBroker::default();
        assert_eq!(broker.pending().await, 0);

        broker.push_raw(b"{}".to_vec()).await;
        broker.push_raw(b"not json".to_vec()).await;
        assert_eq!(broker.pending().await, 2);
    }

    #[tokio::test]
    async fn test_clones_share_the_queue() {
        let broker = MemoryBroker::default();
        let other = broker.clone();

        broker.push_raw(b"{}".to_vec()).await;
        assert_eq!(other.pending().await, 1);
    }

    #[tokio::test]
    async fn test_acknowledge_removes_message() {
        let broker = MemoryBroker::default();
        broker
            .push_raw(EventBody::new("created").encode().unwrap())
            .await;

        let mut stream = broker.message_receive_stream().await.unwrap();
        let message = stream.next().await.unwrap().unwrap();
        assert_eq!(message.event_body().subject(), Some("created"));

        message.acknowledge().await.unwrap();
        assert_eq!(broker.pending().await, 0);
    }

    #[tokio::test]
    async fn test_name() {
        assert_eq!(MemoryBroker::default().name(), "memory");
    }
}
