//! Per-connection CURIE prefix tables.

use std::collections::HashMap;

use dashmap::DashMap;
use wamp_core::uri::{is_absolute_uri, split_curie};

use crate::network::ConnectionId;

/// Maps each connection's announced prefix tokens to URI stems.
///
/// A connection's table is created by its first `Prefix` message and dropped
/// by [`PrefixResolver::remove_connection`] when it disconnects. Tokens are
/// last-write-wins.
#[derive(Debug, Default)]
pub struct PrefixResolver {
    prefixes: DashMap<ConnectionId, HashMap<String, String>>,
}

impl PrefixResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `prefix -> uri` for the connection, replacing any earlier
    /// mapping of the same token. Returns the replaced stem, if any.
    pub fn set_prefix(&self, conn: ConnectionId, prefix: &str, uri: &str) -> Option<String> {
        self.prefixes
            .entry(conn)
            .or_default()
            .insert(prefix.to_string(), uri.to_string())
    }

    /// Expands `candidate` to an absolute URI in the connection's context.
    ///
    /// Absolute URIs, strings that are not `token:reference`, and CURIEs
    /// with an unregistered token are all returned unchanged.
    #[must_use]
    pub fn expand(&self, conn: ConnectionId, candidate: &str) -> String {
        if is_absolute_uri(candidate) {
            return candidate.to_string();
        }
        let Some(curie) = split_curie(candidate) else {
            return candidate.to_string();
        };
        self.prefixes
            .get(&conn)
            .and_then(|table| {
                table
                    .get(curie.prefix)
                    .map(|stem| format!("{stem}{}", curie.reference))
            })
            .unwrap_or_else(|| candidate.to_string())
    }

    /// Drops every prefix the connection registered.
    pub fn remove_connection(&self, conn: ConnectionId) -> bool {
        self.prefixes.remove(&conn).is_some()
    }

    /// Snapshot of the connection's prefix table.
    #[must_use]
    pub fn prefixes_of(&self, conn: ConnectionId) -> HashMap<String, String> {
        self.prefixes
            .get(&conn)
            .map(|table| table.value().clone())
            .unwrap_or_default()
    }

    /// Number of connections holding at least one prefix.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.prefixes.len()
    }
}
