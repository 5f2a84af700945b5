//! Topic subscription table.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::network::ConnectionId;

/// Maps each topic URI to the set of connections subscribed to it.
///
/// Invariant: a topic has an entry if and only if its subscriber set is
/// non-empty. Emptied sets are removed under the shard lock, so a
/// concurrent `subscribe` either lands in the old set before removal or
/// creates a fresh one after it.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    topics: DashMap<String, HashSet<ConnectionId>>,
}

impl SubscriptionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `conn` to the topic's subscribers.
    ///
    /// Returns `false` if it was already subscribed.
    pub fn subscribe(&self, conn: ConnectionId, topic: &str) -> bool {
        self.topics.entry(topic.to_string()).or_default().insert(conn)
    }

    /// Removes `conn` from the topic's subscribers, deleting the topic once
    /// nobody is left.
    ///
    /// Returns `false` if the topic or the membership did not exist.
    pub fn unsubscribe(&self, conn: ConnectionId, topic: &str) -> bool {
        let removed = match self.topics.get_mut(topic) {
            Some(mut subscribers) => subscribers.remove(&conn),
            None => return false,
        };
        if removed {
            self.topics
                .remove_if(topic, |_, subscribers| subscribers.is_empty());
        }
        removed
    }

    /// Drops `conn` from every topic. Returns the topics it left.
    pub fn remove_connection(&self, conn: ConnectionId) -> Vec<String> {
        let mut left = Vec::new();
        self.topics.retain(|topic, subscribers| {
            if subscribers.remove(&conn) {
                left.push(topic.clone());
            }
            !subscribers.is_empty()
        });
        left
    }

    /// Snapshot of the topic's subscribers; empty if the topic is unknown.
    #[must_use]
    pub fn subscribers_of(&self, topic: &str) -> HashSet<ConnectionId> {
        self.topics
            .get(topic)
            .map(|subscribers| subscribers.value().clone())
            .unwrap_or_default()
    }

    /// Whether `conn` is subscribed to `topic`.
    #[must_use]
    pub fn is_subscribed(&self, conn: ConnectionId, topic: &str) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|subscribers| subscribers.contains(&conn))
    }

    /// Whether the table has an entry for `topic`.
    #[must_use]
    pub fn contains_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Snapshot of all topics with at least one subscriber.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of topics with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}
