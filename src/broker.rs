//! Message broker seam — the core abstraction for event transports
//!
//! Backends (RabbitMQ, in-memory) implement `MessageBroker` to provide a
//! uniform pair of pipelines: a receive stream of acknowledgeable inbound
//! messages, and a send loop that drains outbound event bodies and forwards
//! each one once the broker has confirmed it durable.

use crate::error::Result;
use crate::types::EventBody;
use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

/// Core trait for event transports
///
/// Receive and send pipelines are independent: each invocation owns its own
/// transport session for its entire lifetime, so the two sides may run
/// concurrently as separate tasks against one broker value.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Open the receive pipeline
    ///
    /// Establishes a session, ensures the topology, and returns a lazy,
    /// unbounded stream of inbound messages in broker delivery order. The
    /// transport never acknowledges on the consumer's behalf: a message
    /// stays redeliverable until `InboundMessage::acknowledge` is called.
    async fn message_receive_stream(&self) -> Result<Box<dyn MessageStream>>;

    /// Run the send pipeline to completion
    ///
    /// Drains `bodies` strictly in order, one at a time. Each body must
    /// carry the reserved `_subject` field; a body without one halts the
    /// pipeline with [`BrokerError::MissingSubject`] before any publish of
    /// that item. Every confirmed body is forwarded on `confirmations` in
    /// publish order. Returns once `bodies` is exhausted, the confirmation
    /// receiver is dropped (consumer-initiated cancellation), or a fatal
    /// error occurs; transport resources are released on every exit path.
    ///
    /// [`BrokerError::MissingSubject`]: crate::error::BrokerError::MissingSubject
    async fn send_event_body_stream(
        &self,
        bodies: mpsc::Receiver<EventBody>,
        confirmations: mpsc::Sender<EventBody>,
    ) -> Result<()>;

    /// Transport name (e.g., "rabbitmq", "memory")
    fn name(&self) -> &str;
}

/// Async handle for consuming inbound messages from a transport
#[async_trait]
pub trait MessageStream: Send {
    /// Receive the next message
    ///
    /// Suspends until a delivery arrives. A malformed body yields a
    /// per-message [`BrokerError::Decode`] and leaves the delivery
    /// unacknowledged; the stream remains usable afterwards. `Ok(None)`
    /// means the stream has ended for good.
    ///
    /// [`BrokerError::Decode`]: crate::error::BrokerError::Decode
    async fn next(&mut self) -> Result<Option<InboundMessage>>;

    /// Release the stream's transport resources
    ///
    /// Resources are released in reverse order of acquisition. Messages
    /// received but not acknowledged stay redeliverable.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// One broker delivery pending application acknowledgment
///
/// Wraps the body, decoded exactly once at construction, plus a one-shot
/// acknowledge callback into the underlying transport.
pub struct InboundMessage {
    body: EventBody,

    /// Ack callback — tells the broker the delivery may be removed
    ack_fn: Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>,
}

impl std::fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundMessage")
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

impl InboundMessage {
    /// Create an inbound message with its acknowledge callback
    pub fn new(
        body: EventBody,
        ack_fn: impl FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
    ) -> Self {
        Self {
            body,
            ack_fn: Box::new(ack_fn),
        }
    }

    /// The decoded event body
    pub fn event_body(&self) -> &EventBody {
        &self.body
    }

    /// Signal successful processing
    ///
    /// Consumes the wrapper, so acknowledging twice cannot be expressed.
    /// If the owning channel has since been lost, this reports
    /// [`BrokerError::Ack`] rather than failing silently.
    ///
    /// [`BrokerError::Ack`]: crate::error::BrokerError::Ack
    pub async fn acknowledge(self) -> Result<()> {
        (self.ack_fn)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_message(counter: Arc<AtomicUsize>) -> InboundMessage {
        InboundMessage::new(EventBody::new("created").with_field("id", 1), move || {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_event_body_accessor() {
        let message = counting_message(Arc::new(AtomicUsize::new(0)));
        assert_eq!(message.event_body().subject(), Some("created"));
        assert_eq!(message.event_body().get("id"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_acknowledge_runs_callback_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let message = counting_message(counter.clone());

        message.acknowledge().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        // `message` is consumed here; a second acknowledge does not compile.
    }

    #[tokio::test]
    async fn test_acknowledge_propagates_error() {
        let message = InboundMessage::new(EventBody::new("created"), || {
            Box::pin(async { Err(crate::error::BrokerError::Ack("channel gone".into())) })
        });

        let err = message.acknowledge().await.unwrap_err();
        assert!(matches!(err, crate::error::BrokerError::Ack(_)));
    }
}
