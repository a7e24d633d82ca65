//! Routing-key strategies for outbound events
//!
//! A strategy is a pure function from an event subject to a broker routing
//! key. The bound exchange is fan-out, so the key never affects delivery,
//! but it is recorded on every published message for producer-side routing
//! and logging.

use std::sync::Arc;

/// Pure function mapping an event subject to a broker routing key
///
/// Must be deterministic for a given subject and perform no I/O.
pub type RoutingKeyFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Default strategy: scope the subject under a queue name
///
/// Produces `"{queue_name}.{subject}"`.
pub fn queue_scoped(queue_name: impl Into<String>) -> RoutingKeyFn {
    let queue_name = queue_name.into();
    Arc::new(move |subject| format!("{}.{}", queue_name, subject))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_scoped_key() {
        let routing = queue_scoped("orders");
        assert_eq!(routing("created"), "orders.created");
        assert_eq!(routing("cancelled"), "orders.cancelled");
    }

    #[test]
    fn test_queue_scoped_is_deterministic() {
        let routing = queue_scoped("orders");
        assert_eq!(routing("created"), routing("created"));
    }

    #[test]
    fn test_custom_strategy_substitutes() {
        let routing: RoutingKeyFn = Arc::new(|subject| subject.to_uppercase());
        assert_eq!(routing("created"), "CREATED");
    }
}
