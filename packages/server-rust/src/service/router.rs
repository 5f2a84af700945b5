//! The WAMP message router.
//!
//! [`WampRouter`] owns every per-router table (prefixes, subscriptions,
//! procedures) and turns decoded inbound frames into table updates, handler
//! invocations and outbound frames. It never awaits: outbound traffic goes
//! through each connection's bounded channel with `try_send`.

use std::sync::Arc;

use metrics::{counter, gauge};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use wamp_core::messages::outbound;
use wamp_core::{decode, DecodeError, InboundMessage, PublishAudience};

use super::config::RouterConfig;
use super::error::{DispatchError, RouterError};
use super::fanout::{self, Audience, FanoutReport};
use super::observer::{CompositeObserver, RouterObserver};
use super::prefix::PrefixResolver;
use super::registry::{CallContext, CallRegistry};
use super::subscription::SubscriptionTable;
use crate::metrics::{
    CALLS_DISPATCHED_TOTAL, CALLS_FAILED_TOTAL, CONNECTIONS_ACTIVE, CONNECTIONS_CLOSED_TOTAL,
    CONNECTIONS_OPENED_TOTAL, MESSAGES_RECEIVED_TOTAL, MESSAGES_REJECTED_TOTAL,
};
use crate::network::{ConnectionHandle, ConnectionId, ConnectionRegistry};

// ---------------------------------------------------------------------------
// WampRouter
// ---------------------------------------------------------------------------

/// Routes WAMP v1 traffic between connections and the application.
///
/// One instance serves every connection of a server; share it behind an
/// `Arc` once observers are registered.
#[derive(Debug)]
pub struct WampRouter {
    registry: Arc<ConnectionRegistry>,
    prefixes: PrefixResolver,
    subscriptions: SubscriptionTable,
    calls: CallRegistry,
    observers: CompositeObserver,
    config: RouterConfig,
}

impl WampRouter {
    /// Creates a router delivering through `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, config: RouterConfig) -> Self {
        Self {
            registry,
            prefixes: PrefixResolver::new(),
            subscriptions: SubscriptionTable::new(),
            calls: CallRegistry::new(),
            observers: CompositeObserver::default(),
            config,
        }
    }

    /// Registers an observer. Observers are notified in registration order.
    pub fn add_observer(&mut self, observer: Arc<dyn RouterObserver>) {
        self.observers.add(observer);
    }

    // -- connection lifecycle ------------------------------------------------

    /// Registers a new connection and greets it with a `Welcome`.
    pub fn on_open(&self, handle: Arc<ConnectionHandle>) {
        let conn = handle.id;
        let welcome = outbound::welcome(&conn.to_string(), &self.config.server_identity);

        if self.registry.insert(Arc::clone(&handle)).is_some() {
            warn!(conn_id = %conn, "connection id already registered, previous handle replaced");
        }
        if !handle.send_text(welcome) {
            warn!(conn_id = %conn, "could not queue welcome");
        }

        counter!(CONNECTIONS_OPENED_TOTAL).increment(1);
        self.record_active_connections();
        info!(conn_id = %conn, "connection opened");
        self.observers.on_welcome(conn);
    }

    /// Forgets a connection: its registry entry, prefixes and subscriptions.
    ///
    /// Tear-down runs even if the registry entry was already drained during
    /// shutdown, so the transport calls this exactly once per connection.
    pub fn on_close(&self, conn: ConnectionId) {
        self.registry.remove(conn);
        self.prefixes.remove_connection(conn);
        let topics = self.subscriptions.remove_connection(conn);

        counter!(CONNECTIONS_CLOSED_TOTAL).increment(1);
        self.record_active_connections();
        info!(conn_id = %conn, subscriptions = topics.len(), "connection closed");
        self.observers.on_close(conn);
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_active_connections(&self) {
        gauge!(CONNECTIONS_ACTIVE).set(self.registry.count() as f64);
    }

    // -- inbound -------------------------------------------------------------

    /// Handles one inbound text frame from `conn`.
    ///
    /// Frames are processed in arrival order by the caller's read loop.
    ///
    /// # Errors
    ///
    /// - `RouterError::Decode` if the frame is malformed or of a type peers
    ///   may not send; it is dropped
    /// - `RouterError::Call` if a `Call` has no handler or its arguments do
    ///   not fit the registered shape
    ///
    /// Neither closes the connection.
    pub fn handle_text(&self, conn: ConnectionId, frame: &str) -> Result<(), RouterError> {
        let message = decode(frame).inspect_err(|err| log_rejected(conn, frame, err))?;
        let kind = message.message_type();
        counter!(MESSAGES_RECEIVED_TOTAL, "type" => kind.as_str()).increment(1);
        debug!(conn_id = %conn, %kind, "inbound message");

        match message {
            InboundMessage::Prefix { prefix, uri } => {
                self.handle_prefix(conn, &prefix, &uri);
                Ok(())
            }
            InboundMessage::Call {
                call_id,
                proc_uri,
                args,
            } => self.handle_call(conn, call_id, &proc_uri, args),
            InboundMessage::Subscribe { topic } => {
                self.handle_subscribe(conn, &topic);
                Ok(())
            }
            InboundMessage::Unsubscribe { topic } => {
                self.handle_unsubscribe(conn, &topic);
                Ok(())
            }
            InboundMessage::Publish {
                topic,
                event,
                audience,
            } => {
                self.handle_publish(conn, &topic, &event, &audience);
                Ok(())
            }
        }
    }

    fn handle_prefix(&self, conn: ConnectionId, prefix: &str, uri: &str) {
        if let Some(previous) = self.prefixes.set_prefix(conn, prefix, uri) {
            debug!(conn_id = %conn, prefix, previous = %previous, "prefix redefined");
        }
        info!(conn_id = %conn, prefix, uri, "prefix registered");
        self.observers.on_prefix(conn, prefix, uri);
    }

    fn handle_call(
        &self,
        conn: ConnectionId,
        call_id: String,
        proc_uri: &str,
        args: Value,
    ) -> Result<(), RouterError> {
        let proc_uri = self.prefixes.expand(conn, proc_uri);
        let ctx = CallContext::new(conn, call_id.clone(), self.registry.get(conn));

        match self.calls.dispatch(ctx, &proc_uri, args) {
            Ok(()) => {
                counter!(CALLS_DISPATCHED_TOTAL).increment(1);
                debug!(conn_id = %conn, call_id = %call_id, proc_uri = %proc_uri, "call dispatched");
                self.observers.on_call(conn, &call_id, &proc_uri);
                Ok(())
            }
            Err(err) => {
                let reason = match err {
                    DispatchError::NoHandler { .. } => "no_handler",
                    DispatchError::PayloadShape { .. } => "payload_shape",
                };
                counter!(CALLS_FAILED_TOTAL, "reason" => reason).increment(1);
                warn!(conn_id = %conn, call_id = %call_id, error = %err, "call not dispatched");
                self.observers.on_call_failed(conn, &call_id, &err);
                if self.config.reply_call_errors {
                    self.reply_call_failure(conn, &call_id, &err);
                }
                Err(RouterError::Call {
                    call_id,
                    source: err,
                })
            }
        }
    }

    fn reply_call_failure(&self, conn: ConnectionId, call_id: &str, err: &DispatchError) {
        let error_uri = match err {
            DispatchError::NoHandler { .. } => self.config.no_such_procedure_uri(),
            DispatchError::PayloadShape { .. } => self.config.invalid_argument_uri(),
        };
        self.send_call_error(conn, call_id, &error_uri, &err.to_string(), None);
    }

    fn handle_subscribe(&self, conn: ConnectionId, topic: &str) {
        let topic = self.prefixes.expand(conn, topic);
        if self.subscriptions.subscribe(conn, &topic) {
            debug!(conn_id = %conn, topic = %topic, "subscribed");
        }
        self.observers.on_subscribe(conn, &topic);
    }

    fn handle_unsubscribe(&self, conn: ConnectionId, topic: &str) {
        let topic = self.prefixes.expand(conn, topic);
        if self.subscriptions.unsubscribe(conn, &topic) {
            debug!(conn_id = %conn, topic = %topic, "unsubscribed");
        }
        self.observers.on_unsubscribe(conn, &topic);
    }

    fn handle_publish(
        &self,
        conn: ConnectionId,
        topic: &str,
        event: &Value,
        request: &PublishAudience,
    ) {
        let topic = self.prefixes.expand(conn, topic);
        let audience = Audience::from_request(conn, request);
        let report = self.fan_out(&topic, event, &audience);
        debug!(
            conn_id = %conn,
            topic = %topic,
            delivered = report.delivered,
            missing = report.missing,
            dropped = report.dropped,
            "event published"
        );
        self.observers.on_publish(conn, &topic, event, &audience);
    }

    fn fan_out(&self, topic: &str, event: &Value, audience: &Audience) -> FanoutReport {
        let recipients = fanout::resolve_recipients(&self.subscriptions, topic, audience);
        if recipients.is_empty() {
            return FanoutReport::default();
        }
        let frame = outbound::event(topic, event);
        fanout::deliver(&self.registry, recipients, &frame)
    }

    // -- application API -----------------------------------------------------

    /// Registers a handler for `proc_uri`, replacing any earlier one.
    ///
    /// The handler's payload type is the shape call arguments must
    /// deserialize into. Returns `true` if a handler was replaced.
    pub fn register_procedure<T, F>(&self, proc_uri: impl Into<String>, handler: F) -> bool
    where
        T: DeserializeOwned + 'static,
        F: Fn(CallContext, T) + Send + Sync + 'static,
    {
        self.calls.register(proc_uri, handler)
    }

    /// Removes the handler for `proc_uri`. Returns `false` if none existed.
    pub fn deregister_procedure(&self, proc_uri: &str) -> bool {
        self.calls.deregister(proc_uri)
    }

    /// Queues `[3, callId, result]` for `conn`.
    ///
    /// Returns `false` if the connection is gone or its channel is full.
    pub fn send_call_result(&self, conn: ConnectionId, call_id: &str, result: &Value) -> bool {
        self.send_to(conn, outbound::call_result(call_id, result))
    }

    /// Queues `[4, callId, errorUri, errorDesc(, errorDetails)]` for `conn`.
    pub fn send_call_error(
        &self,
        conn: ConnectionId,
        call_id: &str,
        error_uri: &str,
        error_desc: &str,
        details: Option<&Value>,
    ) -> bool {
        self.send_to(
            conn,
            outbound::call_error(call_id, error_uri, error_desc, details),
        )
    }

    /// Publishes a server-originated event to every subscriber of `topic`.
    ///
    /// `topic` must already be absolute; no prefixes apply.
    pub fn publish_event(&self, topic: &str, event: &Value) -> FanoutReport {
        let report = self.fan_out(topic, event, &Audience::everyone());
        debug!(topic, delivered = report.delivered, "server event published");
        report
    }

    fn send_to(&self, conn: ConnectionId, frame: String) -> bool {
        match self.registry.get(conn) {
            Some(handle) => handle.send_text(frame),
            None => {
                debug!(conn_id = %conn, "reply target already disconnected");
                false
            }
        }
    }

    // -- accessors -----------------------------------------------------------

    /// The connection registry this router delivers through.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Per-connection prefix tables.
    #[must_use]
    pub fn prefixes(&self) -> &PrefixResolver {
        &self.prefixes
    }

    /// Topic subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Registered procedures.
    #[must_use]
    pub fn calls(&self) -> &CallRegistry {
        &self.calls
    }

    /// Router configuration.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}

fn log_rejected(conn: ConnectionId, frame: &str, err: &DecodeError) {
    if err.is_protocol_violation() {
        counter!(MESSAGES_REJECTED_TOTAL, "reason" => "protocol_violation").increment(1);
        warn!(conn_id = %conn, error = %err, frame, "protocol violation, frame dropped");
    } else {
        counter!(MESSAGES_REJECTED_TOTAL, "reason" => "malformed").increment(1);
        info!(conn_id = %conn, error = %err, frame, "malformed frame dropped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::network::OutboundMessage;

    /// Observer that records every notification as a string.
    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl RouterObserver for RecordingObserver {
        fn on_welcome(&self, conn: ConnectionId) {
            self.events.lock().push(format!("welcome:{conn}"));
        }

        fn on_prefix(&self, _conn: ConnectionId, prefix: &str, uri: &str) {
            self.events.lock().push(format!("prefix:{prefix}={uri}"));
        }

        fn on_call(&self, _conn: ConnectionId, call_id: &str, proc_uri: &str) {
            self.events.lock().push(format!("call:{call_id}:{proc_uri}"));
        }

        fn on_call_failed(&self, _conn: ConnectionId, call_id: &str, error: &DispatchError) {
            self.events
                .lock()
                .push(format!("call_failed:{call_id}:{}", error.proc_uri()));
        }

        fn on_subscribe(&self, _conn: ConnectionId, topic: &str) {
            self.events.lock().push(format!("subscribe:{topic}"));
        }

        fn on_unsubscribe(&self, _conn: ConnectionId, topic: &str) {
            self.events.lock().push(format!("unsubscribe:{topic}"));
        }

        fn on_publish(&self, _conn: ConnectionId, topic: &str, event: &Value, _audience: &Audience) {
            self.events.lock().push(format!("publish:{topic}:{event}"));
        }

        fn on_close(&self, conn: ConnectionId) {
            self.events.lock().push(format!("close:{conn}"));
        }
    }

    struct Harness {
        router: WampRouter,
        observer: Arc<RecordingObserver>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(RouterConfig::default())
        }

        fn with_config(config: RouterConfig) -> Self {
            let mut router = WampRouter::new(Arc::new(ConnectionRegistry::new()), config);
            let observer = Arc::new(RecordingObserver::default());
            router.add_observer(observer.clone());
            Self { router, observer }
        }

        /// Opens a connection and discards its welcome.
        fn connect(&self) -> (ConnectionId, mpsc::Receiver<OutboundMessage>) {
            let (handle, mut rx) = ConnectionHandle::new(16);
            let id = handle.id;
            self.router.on_open(handle);
            assert!(matches!(rx.try_recv(), Ok(OutboundMessage::Text(_))));
            (id, rx)
        }

        fn send(&self, conn: ConnectionId, frame: &str) -> Result<(), RouterError> {
            self.router.handle_text(conn, frame)
        }
    }

    fn texts(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let OutboundMessage::Text(text) = msg {
                out.push(text);
            }
        }
        out
    }

    // -- lifecycle -----------------------------------------------------------

    #[test]
    fn open_sends_welcome_and_notifies() {
        let harness = Harness::new();
        let (handle, mut rx) = ConnectionHandle::new(4);
        let id = handle.id;

        harness.router.on_open(handle);

        assert_eq!(
            texts(&mut rx),
            vec![format!(r#"[0,"{id}",1,"wamp-server/0.1.0"]"#)]
        );
        assert!(harness.router.registry().contains(id));
        assert_eq!(harness.observer.take(), vec![format!("welcome:{id}")]);
    }

    #[test]
    fn welcome_uses_configured_identity() {
        let harness = Harness::with_config(RouterConfig {
            server_identity: "Example/1.0".to_string(),
            ..RouterConfig::default()
        });
        let (handle, mut rx) = ConnectionHandle::new(4);
        let id = handle.id;

        harness.router.on_open(handle);

        assert_eq!(texts(&mut rx), vec![format!(r#"[0,"{id}",1,"Example/1.0"]"#)]);
    }

    #[test]
    fn duplicate_open_replaces_handle() {
        let harness = Harness::new();
        let id = ConnectionId::new_v4();
        let (first, _rx1) = ConnectionHandle::with_id(id, 4);
        let (second, _rx2) = ConnectionHandle::with_id(id, 4);

        harness.router.on_open(first);
        harness.router.on_open(second.clone());

        assert_eq!(harness.router.registry().count(), 1);
        assert!(Arc::ptr_eq(&harness.router.registry().get(id).unwrap(), &second));
    }

    #[test]
    fn close_tears_down_connection_state() {
        let harness = Harness::new();
        let (a, _rx) = harness.connect();
        harness.send(a, r#"[1,"x","http://x/"]"#).unwrap();
        harness.send(a, r#"[5,"http://x/t"]"#).unwrap();
        harness.observer.take();

        harness.router.on_close(a);

        assert!(!harness.router.registry().contains(a));
        assert!(harness.router.prefixes().prefixes_of(a).is_empty());
        assert!(!harness.router.subscriptions().contains_topic("http://x/t"));
        assert_eq!(harness.observer.take(), vec![format!("close:{a}")]);
    }

    #[test]
    fn close_after_drain_still_tears_down() {
        let harness = Harness::new();
        let (a, _rx) = harness.connect();
        harness.send(a, r#"[5,"http://x/t"]"#).unwrap();

        harness.router.registry().drain_all();
        harness.router.on_close(a);

        assert_eq!(harness.router.subscriptions().topic_count(), 0);
    }

    #[test]
    fn close_unknown_connection_leaves_tables_alone() {
        let harness = Harness::new();
        let (a, _rx) = harness.connect();
        harness.send(a, r#"[5,"http://x/t"]"#).unwrap();

        harness.router.on_close(ConnectionId::new_v4());

        assert!(harness.router.registry().contains(a));
        assert!(harness.router.subscriptions().is_subscribed(a, "http://x/t"));
    }

    // -- prefixes ------------------------------------------------------------

    #[test]
    fn prefix_expands_later_subscribe() {
        let harness = Harness::new();
        let (a, _rx) = harness.connect();
        harness.observer.take();

        harness
            .send(a, r#"[1,"calc","http://example.com/simple/calc#"]"#)
            .unwrap();
        harness.send(a, r#"[5,"calc:square"]"#).unwrap();

        assert!(harness
            .router
            .subscriptions()
            .is_subscribed(a, "http://example.com/simple/calc#square"));
        assert_eq!(
            harness.observer.take(),
            vec![
                "prefix:calc=http://example.com/simple/calc#".to_string(),
                "subscribe:http://example.com/simple/calc#square".to_string(),
            ]
        );
    }

    #[test]
    fn prefixes_are_per_connection() {
        let harness = Harness::new();
        let (a, _rx_a) = harness.connect();
        let (b, _rx_b) = harness.connect();

        harness.send(a, r#"[1,"p","http://a/"]"#).unwrap();
        harness.send(b, r#"[5,"p:t"]"#).unwrap();

        assert!(harness.router.subscriptions().is_subscribed(b, "p:t"));
        assert!(!harness.router.subscriptions().contains_topic("http://a/t"));
    }

    // -- subscriptions -------------------------------------------------------

    #[test]
    fn subscribe_then_unsubscribe_removes_topic() {
        let harness = Harness::new();
        let (a, _rx) = harness.connect();

        harness.send(a, r#"[5,"http://x/t"]"#).unwrap();
        assert!(harness.router.subscriptions().is_subscribed(a, "http://x/t"));

        harness.send(a, r#"[6,"http://x/t"]"#).unwrap();
        assert!(!harness.router.subscriptions().contains_topic("http://x/t"));
        assert_eq!(
            harness.observer.take()[1..],
            ["subscribe:http://x/t".to_string(), "unsubscribe:http://x/t".to_string()]
        );
    }

    #[test]
    fn unsubscribe_unknown_topic_is_harmless() {
        let harness = Harness::new();
        let (a, _rx) = harness.connect();
        assert!(harness.send(a, r#"[6,"http://x/never"]"#).is_ok());
    }

    // -- publish -------------------------------------------------------------

    #[test]
    fn publish_reaches_every_subscriber_including_publisher() {
        let harness = Harness::new();
        let (a, mut rx_a) = harness.connect();
        let (b, mut rx_b) = harness.connect();
        let (c, mut rx_c) = harness.connect();
        harness.send(a, r#"[5,"http://x/t"]"#).unwrap();
        harness.send(b, r#"[5,"http://x/t"]"#).unwrap();
        harness.observer.take();

        harness.send(c, r#"[7,"http://x/t",{"n":1}]"#).unwrap();

        let expected = vec![r#"[8,"http://x/t",{"n":1}]"#.to_string()];
        assert_eq!(texts(&mut rx_a), expected);
        assert_eq!(texts(&mut rx_b), expected);
        assert!(texts(&mut rx_c).is_empty());
        assert_eq!(harness.observer.take(), vec![r#"publish:http://x/t:{"n":1}"#]);
    }

    #[test]
    fn curie_and_absolute_subscribers_share_a_topic() {
        let harness = Harness::new();
        let (c1, mut rx1) = harness.connect();
        let (c2, mut rx2) = harness.connect();
        harness.send(c1, r#"[5,"http://x/t"]"#).unwrap();
        harness.send(c2, r#"[1,"p","http://x/"]"#).unwrap();
        harness.send(c2, r#"[5,"p:t"]"#).unwrap();

        harness.send(c1, r#"[7,"http://x/t","e"]"#).unwrap();

        assert_eq!(texts(&mut rx1), vec![r#"[8,"http://x/t","e"]"#]);
        assert_eq!(texts(&mut rx2), vec![r#"[8,"http://x/t","e"]"#]);
    }

    #[test]
    fn publish_exclude_me_true_skips_publisher() {
        let harness = Harness::new();
        let (a, mut rx_a) = harness.connect();
        let (b, mut rx_b) = harness.connect();
        harness.send(a, r#"[5,"http://x/t"]"#).unwrap();
        harness.send(b, r#"[5,"http://x/t"]"#).unwrap();

        harness.send(a, r#"[7,"http://x/t","hi",true]"#).unwrap();

        assert!(texts(&mut rx_a).is_empty());
        assert_eq!(texts(&mut rx_b), vec![r#"[8,"http://x/t","hi"]"#]);
    }

    #[test]
    fn four_field_publish_never_reaches_publisher() {
        let harness = Harness::new();
        let (a, mut rx_a) = harness.connect();
        let (b, mut rx_b) = harness.connect();
        harness.send(a, r#"[5,"http://x/t"]"#).unwrap();
        harness.send(b, r#"[5,"http://x/t"]"#).unwrap();

        let list_marker = format!(r#"[7,"http://x/t","l",["{b}"]]"#);
        for frame in [
            r#"[7,"http://x/t","t",true]"#,
            r#"[7,"http://x/t","f",false]"#,
            r#"[7,"http://x/t","n",42]"#,
            list_marker.as_str(),
        ] {
            harness.send(a, frame).unwrap();
        }

        assert!(texts(&mut rx_a).is_empty());
        assert_eq!(
            texts(&mut rx_b),
            vec![
                r#"[8,"http://x/t","t"]"#,
                r#"[8,"http://x/t","f"]"#,
                r#"[8,"http://x/t","n"]"#,
                r#"[8,"http://x/t","l"]"#,
            ]
        );
    }

    #[test]
    fn publish_with_eligible_and_exclude_lists() {
        let harness = Harness::new();
        let (a, mut rx_a) = harness.connect();
        let (b, mut rx_b) = harness.connect();
        let (c, mut rx_c) = harness.connect();
        for conn in [a, b, c] {
            harness.send(conn, r#"[5,"http://x/t"]"#).unwrap();
        }

        let frame = format!(r#"[7,"http://x/t",1,["{b}"],["{a}","{b}","{c}"]]"#);
        harness.send(a, &frame).unwrap();

        assert_eq!(texts(&mut rx_a), vec![r#"[8,"http://x/t",1]"#]);
        assert!(texts(&mut rx_b).is_empty());
        assert_eq!(texts(&mut rx_c), vec![r#"[8,"http://x/t",1]"#]);
    }

    #[test]
    fn publish_uses_expanded_topic() {
        let harness = Harness::new();
        let (a, mut rx_a) = harness.connect();
        harness.send(a, r#"[5,"http://x/t"]"#).unwrap();
        harness.send(a, r#"[1,"x","http://x/"]"#).unwrap();

        harness.send(a, r#"[7,"x:t",null]"#).unwrap();

        assert_eq!(texts(&mut rx_a), vec![r#"[8,"http://x/t",null]"#]);
    }

    #[test]
    fn publish_skips_disconnected_recipient() {
        let harness = Harness::new();
        let (a, mut rx_a) = harness.connect();
        let (b, rx_b) = harness.connect();
        harness.send(a, r#"[5,"http://x/t"]"#).unwrap();
        harness.send(b, r#"[5,"http://x/t"]"#).unwrap();
        drop(rx_b);
        harness.router.registry().remove(b);

        harness.send(a, r#"[7,"http://x/t",1]"#).unwrap();

        assert_eq!(texts(&mut rx_a), vec![r#"[8,"http://x/t",1]"#]);
    }

    #[test]
    fn publish_to_topic_without_subscribers() {
        let harness = Harness::new();
        let (a, _rx) = harness.connect();
        harness.observer.take();

        harness.send(a, r#"[7,"http://x/empty",1]"#).unwrap();

        assert_eq!(harness.observer.take(), vec!["publish:http://x/empty:1"]);
    }

    #[test]
    fn server_publish_event_reaches_subscribers() {
        let harness = Harness::new();
        let (a, mut rx_a) = harness.connect();
        let (b, mut rx_b) = harness.connect();
        harness.send(a, r#"[5,"http://x/t"]"#).unwrap();
        harness.send(b, r#"[5,"http://x/t"]"#).unwrap();

        let report = harness.router.publish_event("http://x/t", &json!("tick"));

        assert_eq!(report.delivered, 2);
        assert_eq!(texts(&mut rx_a), vec![r#"[8,"http://x/t","tick"]"#]);
        assert_eq!(texts(&mut rx_b), vec![r#"[8,"http://x/t","tick"]"#]);
    }

    // -- calls ---------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Meal {
        category: String,
        calories: u32,
    }

    fn meal_recorder(router: &WampRouter) -> Arc<Mutex<Vec<(String, Meal)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router.register_procedure(
            "http://example.com/api#storeMeal",
            move |ctx: CallContext, meal: Meal| sink.lock().push((ctx.call_id, meal)),
        );
        seen
    }

    #[test]
    fn call_dispatches_typed_payload_once() {
        let harness = Harness::new();
        let seen = meal_recorder(&harness.router);
        let (a, _rx) = harness.connect();
        harness.observer.take();

        harness
            .send(
                a,
                r#"[2,"7DK6TdN4wLiUJgNM","http://example.com/api#storeMeal",{"category":"dinner","calories":2309}]"#,
            )
            .unwrap();

        assert_eq!(
            *seen.lock(),
            vec![(
                "7DK6TdN4wLiUJgNM".to_string(),
                Meal {
                    category: "dinner".to_string(),
                    calories: 2309,
                }
            )]
        );
        assert_eq!(
            harness.observer.take(),
            vec!["call:7DK6TdN4wLiUJgNM:http://example.com/api#storeMeal"]
        );
    }

    #[test]
    fn call_expands_procedure_curie() {
        let harness = Harness::new();
        let seen = meal_recorder(&harness.router);
        let (a, _rx) = harness.connect();

        harness.send(a, r#"[1,"api","http://example.com/api#"]"#).unwrap();
        harness
            .send(a, r#"[2,"c1","api:storeMeal",{"category":"lunch","calories":600}]"#)
            .unwrap();

        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn handler_result_reaches_caller() {
        let harness = Harness::new();
        harness
            .router
            .register_procedure("http://x/add", |ctx: CallContext, args: Vec<i64>| {
                ctx.send_result(&json!(args.iter().sum::<i64>()));
            });
        let (a, mut rx) = harness.connect();

        harness.send(a, r#"[2,"c1","http://x/add",1,2,3]"#).unwrap();

        assert_eq!(texts(&mut rx), vec![r#"[3,"c1",6]"#]);
    }

    #[test]
    fn unknown_procedure_fails_and_replies_with_error() {
        let harness = Harness::new();
        let (a, mut rx) = harness.connect();
        harness.observer.take();

        let err = harness.send(a, r#"[2,"c1","http://x/missing"]"#).unwrap_err();

        assert!(matches!(
            err,
            RouterError::Call { ref call_id, source: DispatchError::NoHandler { .. } } if call_id == "c1"
        ));
        assert_eq!(harness.observer.take(), vec!["call_failed:c1:http://x/missing"]);
        let replies = texts(&mut rx);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with(r#"[4,"c1","http://wamp.ws/error#noSuchProcedure","#));
    }

    #[test]
    fn shape_mismatch_does_not_invoke_handler() {
        let harness = Harness::new();
        let seen = meal_recorder(&harness.router);
        let (a, mut rx) = harness.connect();

        let err = harness
            .send(a, r#"[2,"c1","http://example.com/api#storeMeal",{"category":"x"}]"#)
            .unwrap_err();

        assert!(matches!(
            err,
            RouterError::Call {
                source: DispatchError::PayloadShape { .. },
                ..
            }
        ));
        assert!(seen.lock().is_empty());
        assert!(texts(&mut rx)[0].contains("invalidArgument"));
    }

    #[test]
    fn call_errors_can_be_silenced() {
        let harness = Harness::with_config(RouterConfig {
            reply_call_errors: false,
            ..RouterConfig::default()
        });
        let (a, mut rx) = harness.connect();

        assert!(harness.send(a, r#"[2,"c1","http://x/missing"]"#).is_err());
        assert!(texts(&mut rx).is_empty());
    }

    #[test]
    fn deregistered_procedure_is_unroutable() {
        let harness = Harness::new();
        let _seen = meal_recorder(&harness.router);
        assert!(harness.router.deregister_procedure("http://example.com/api#storeMeal"));
        let (a, _rx) = harness.connect();

        let result = harness.send(a, r#"[2,"c1","http://example.com/api#storeMeal",{}]"#);
        assert!(result.is_err());
    }

    #[test]
    fn send_call_result_and_error_to_connection() {
        let harness = Harness::new();
        let (a, mut rx) = harness.connect();

        assert!(harness.router.send_call_result(a, "c1", &json!({"ok": true})));
        assert!(harness.router.send_call_error(
            a,
            "c2",
            "http://x/error#oops",
            "went wrong",
            Some(&json!([1]))
        ));
        assert!(!harness
            .router
            .send_call_result(ConnectionId::new_v4(), "c3", &Value::Null));

        assert_eq!(
            texts(&mut rx),
            vec![
                r#"[3,"c1",{"ok":true}]"#.to_string(),
                r#"[4,"c2","http://x/error#oops","went wrong",[1]]"#.to_string(),
            ]
        );
    }

    // -- rejected frames -----------------------------------------------------

    #[test]
    fn outbound_only_types_are_dropped() {
        let harness = Harness::new();
        let (a, _rx) = harness.connect();
        harness.observer.take();

        for frame in [
            r#"[0,"s",1,"x"]"#,
            r#"[3,"c",1]"#,
            r#"[4,"c","u","d"]"#,
            r#"[8,"http://x/t",1]"#,
        ] {
            let err = harness.send(a, frame).unwrap_err();
            assert!(
                matches!(err, RouterError::Decode(ref e) if e.is_protocol_violation()),
                "{frame}"
            );
        }
        assert!(harness.observer.take().is_empty());
    }

    #[test]
    fn malformed_frames_leave_state_untouched() {
        let harness = Harness::new();
        let (a, _rx) = harness.connect();

        for frame in ["not json", "{}", "[]", r#"[1,"p"]"#, r#"[5]"#, r#"[99,"x"]"#] {
            assert!(harness.send(a, frame).is_err(), "{frame}");
        }

        assert!(harness.router.prefixes().prefixes_of(a).is_empty());
        assert_eq!(harness.router.subscriptions().topic_count(), 0);
        assert!(harness.router.registry().contains(a));
    }

    #[test]
    fn concurrent_connections_share_one_router() {
        let harness = Arc::new(Harness::new());
        let conns: Vec<_> = (0..8).map(|_| harness.connect()).collect();
        let ids: HashSet<_> = conns.iter().map(|(id, _)| *id).collect();

        let threads: Vec<_> = ids
            .iter()
            .map(|&id| {
                let harness = Arc::clone(&harness);
                std::thread::spawn(move || {
                    harness.send(id, r#"[5,"http://x/t"]"#).unwrap();
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(harness.router.subscriptions().subscribers_of("http://x/t"), ids);
    }
}
