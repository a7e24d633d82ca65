//! Error types for rmq-event

use thiserror::Error;

/// Errors that can occur in the event transport
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Broker connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Channel open, close, or setup failure
    #[error("Channel error: {0}")]
    Channel(String),

    /// Exchange/queue declaration or binding failure
    ///
    /// Fatal at pipeline setup; raised before any message flows.
    #[error("Topology error: {0}")]
    Topology(String),

    /// Publish failure
    #[error("Failed to publish with routing key '{routing_key}': {reason}")]
    Publish {
        routing_key: String,
        reason: String,
    },

    /// Publisher confirmation failure (broker nack or confirmation timeout)
    ///
    /// The outcome of the in-flight publish is indeterminate; the pipeline
    /// surfaces this instead of retrying.
    #[error("Publish with routing key '{routing_key}' was not confirmed: {reason}")]
    Confirm {
        routing_key: String,
        reason: String,
    },

    /// Consume setup or delivery stream failure
    #[error("Consume error: {0}")]
    Consume(String),

    /// Malformed inbound message body
    ///
    /// Per-message fatal on the receive side; the delivery is left
    /// unacknowledged and the stream stays usable.
    #[error("Failed to decode message body: {0}")]
    Decode(String),

    /// Outbound serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Event body handed to the send pipeline without a subject
    #[error("event body is missing the reserved '_subject' field")]
    MissingSubject,

    /// Acknowledgement failure
    #[error("Failed to acknowledge message: {0}")]
    Ack(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, BrokerError>;
