//! Message subscription registries.
//!
//! Listeners register under an exact topic or under the wildcard topic
//! `"*"`. For each delivered message, wildcard listeners run first, then the
//! listeners for the exact topic, each set in registration order. A listener
//! may be registered under several topics and the wildcard simultaneously;
//! each registration is independent and must be removed with the same
//! topic/listener pair.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Subscriber callback invoked with the topic name and the message payload
/// (JSON null when the envelope carried none).
///
/// Keep the `Arc` returned from the closure you registered: unsubscription
/// matches listeners by `Arc` identity, not by closure equality.
pub type MessageListener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// The topic name that subscribes a listener to every message.
pub const WILDCARD_TOPIC: &str = "*";

/// Registry of per-topic and wildcard subscribers.
#[derive(Default)]
pub(crate) struct MessageHub {
    // ---
    topics: HashMap<String, Vec<MessageListener>>,
    wildcard: Vec<MessageListener>,
}

impl MessageHub {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener under a topic, or under the wildcard for `"*"`.
    pub fn subscribe(&mut self, topic: &str, listener: MessageListener) {
        // ---
        if topic == WILDCARD_TOPIC {
            self.wildcard.push(listener);
        } else {
            self.topics.entry(topic.to_owned()).or_default().push(listener);
        }
    }

    /// Remove one registration matching the topic/listener pair.
    ///
    /// Matching is by `Arc` identity. Removing the last listener for a topic
    /// prunes the topic entry entirely. Returns whether a registration was
    /// removed.
    pub fn unsubscribe(&mut self, topic: &str, listener: &MessageListener) -> bool {
        // ---
        if topic == WILDCARD_TOPIC {
            return remove_listener(&mut self.wildcard, listener);
        }

        let Some(listeners) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = remove_listener(listeners, listener);
        if listeners.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Snapshot the delivery order for one topic: wildcard listeners first,
    /// then exact-topic listeners, each in registration order.
    pub fn delivery_order(&self, topic: &str) -> Vec<MessageListener> {
        // ---
        let mut listeners: Vec<MessageListener> = self.wildcard.to_vec();
        if let Some(topic_listeners) = self.topics.get(topic) {
            listeners.extend(topic_listeners.iter().cloned());
        }
        listeners
    }

    #[cfg(test)]
    fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }
}

fn remove_listener(listeners: &mut Vec<MessageListener>, listener: &MessageListener) -> bool {
    // ---
    let before = listeners.len();
    listeners.retain(|candidate| !Arc::ptr_eq(candidate, listener));
    listeners.len() != before
}
