//! # rmq-event
//!
//! RabbitMQ-backed event transport for the A3S ecosystem.
//!
//! ## Overview
//!
//! `rmq-event` bridges an application's event dispatch model and a durable
//! topic-based broker. Outbound event bodies are published persistently to
//! a fan-out exchange and forwarded back to the producer once the broker
//! confirms each one; inbound deliveries from the bound durable queue are
//! exposed as a lazy message stream with explicit, application-level
//! acknowledgment — at-least-once, never auto-acked.
//!
//! ## Quick Start
//!
//! ```rust
//! use rmq_event::{EventBody, MemoryBroker, MessageBroker, MessageStream};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> rmq_event::Result<()> {
//! let broker = MemoryBroker::default();
//!
//! // Producer side: feed bodies in, read confirmed bodies back out.
//! let (body_tx, body_rx) = mpsc::channel(16);
//! let (confirm_tx, mut confirm_rx) = mpsc::channel(16);
//!
//! body_tx
//!     .send(EventBody::new("created").with_field("id", 1))
//!     .await
//!     .unwrap();
//! drop(body_tx);
//!
//! broker.send_event_body_stream(body_rx, confirm_tx).await?;
//! assert_eq!(confirm_rx.recv().await.unwrap().subject(), Some("created"));
//!
//! // Consumer side: iterate deliveries, acknowledge after processing.
//! let mut stream = broker.message_receive_stream().await?;
//! let message = stream.next().await?.expect("one delivery");
//! assert_eq!(message.event_body().get("id"), Some(&serde_json::json!(1)));
//! message.acknowledge().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Swap [`MemoryBroker`] for [`RmqBroker`] and the same code runs against a
//! RabbitMQ cluster.
//!
//! ## Architecture
//!
//! - **MessageBroker** trait — core abstraction both transports implement
//! - **MessageStream** — lazy, acknowledged receive stream from a transport
//! - **InboundMessage** — one delivery: decoded body + one-shot acknowledge
//! - **EventBody** — opaque JSON mapping with a reserved `_subject` field
//! - **RmqBroker** — AMQP 0.9.1 transport with publisher confirms and
//!   transparent receive-side reconnection
//! - **MemoryBroker** — process-local transport for testing and
//!   single-process use

pub mod broker;
pub mod error;
pub mod memory;
pub mod rmq;
pub mod routing;
pub mod types;

// Re-export core types
pub use broker::{InboundMessage, MessageBroker, MessageStream};
pub use error::{BrokerError, Result};
pub use routing::{queue_scoped, RoutingKeyFn};
pub use types::{EventBody, SUBJECT_KEY};

// Re-export transports for convenience
pub use memory::MemoryBroker;
pub use rmq::{RmqBroker, RmqConfig, RmqMessageStream};
