//! Publish fan-out: recipient resolution and best-effort delivery.

use std::collections::HashSet;

use metrics::counter;
use tracing::debug;
use wamp_core::PublishAudience;

use super::subscription::SubscriptionTable;
use crate::metrics::{EVENTS_DELIVERED_TOTAL, EVENTS_DROPPED_TOTAL};
use crate::network::{ConnectionId, ConnectionRegistry};

/// Resolved recipient constraints of one publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audience {
    /// Connections that must not receive the event.
    pub exclude: HashSet<ConnectionId>,
    /// Connections that may receive the event; `None` means every current
    /// subscriber of the topic.
    pub eligible: Option<HashSet<ConnectionId>>,
}

impl Audience {
    /// Every current subscriber, nobody excluded.
    #[must_use]
    pub fn everyone() -> Self {
        Self::default()
    }

    /// Resolves a decoded publish request on behalf of `publisher`.
    ///
    /// Session ids that do not parse are dropped; they cannot name a live
    /// connection anyway.
    #[must_use]
    pub fn from_request(publisher: ConnectionId, request: &PublishAudience) -> Self {
        let mut exclude = parse_ids(&request.exclude);
        if request.exclude_me {
            exclude.insert(publisher);
        }
        Self {
            exclude,
            eligible: request.eligible.as_deref().map(parse_ids),
        }
    }
}

fn parse_ids(ids: &[String]) -> HashSet<ConnectionId> {
    ids.iter()
        .filter_map(|id| match id.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                debug!(session_id = %id, "ignoring malformed session id in publish");
                None
            }
        })
        .collect()
}

/// Computes `eligible - exclude` for a publish to `topic`.
///
/// An explicit eligible set is used as given; otherwise the topic's current
/// subscribers are snapshotted.
#[must_use]
pub fn resolve_recipients(
    subscriptions: &SubscriptionTable,
    topic: &str,
    audience: &Audience,
) -> HashSet<ConnectionId> {
    let eligible = match &audience.eligible {
        Some(eligible) => eligible.clone(),
        None => subscriptions.subscribers_of(topic),
    };
    eligible
        .into_iter()
        .filter(|conn| !audience.exclude.contains(conn))
        .collect()
}

/// What happened to each recipient of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Frames queued on a live connection.
    pub delivered: usize,
    /// Recipients no longer in the registry.
    pub missing: usize,
    /// Recipients whose outbound channel was full or closed.
    pub dropped: usize,
}

/// Queues `frame` for every recipient.
///
/// Uses non-blocking sends so one slow peer cannot hold up the others.
/// Recipients that have already disconnected are skipped silently.
pub fn deliver(
    registry: &ConnectionRegistry,
    recipients: impl IntoIterator<Item = ConnectionId>,
    frame: &str,
) -> FanoutReport {
    let mut report = FanoutReport::default();
    for conn in recipients {
        match registry.get(conn) {
            Some(handle) => {
                if handle.send_text(frame) {
                    report.delivered += 1;
                } else {
                    report.dropped += 1;
                    debug!(conn_id = %conn, "outbound channel full or closed, event dropped");
                }
            }
            None => report.missing += 1,
        }
    }
    counter!(EVENTS_DELIVERED_TOTAL).increment(report.delivered as u64);
    counter!(EVENTS_DROPPED_TOTAL).increment(report.dropped as u64);
    report
}
