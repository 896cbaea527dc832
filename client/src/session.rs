//! Client-side subscription multiplexing over one persistent connection
//!
//! [`ClientSyncSession`] is a transport-independent state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> ...
//!                     |
//!                     +-> Disconnected (failed attempt)
//! ```
//!
//! Any number of local callbacks may subscribe to a channel; the session keeps
//! exactly one server-side subscription per channel for as long as at least one
//! local callback wants it. The set of such channels is the "desired set". While
//! disconnected the desired set is only recorded; on reaching `Connected` every
//! channel in it is subscribed once.

use crate::error::ClientError;
use log::{debug, error, info};
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use shared::{ClientMessage, ServerMessage};
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Local update callback. Receives `None` for a channel with no value.
pub type Callback = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Outbound half of the current transport connection
pub type Link = mpsc::UnboundedSender<ClientMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct LocalSubscriber {
    id: u64,
    callback: Callback,
}

struct SessionState {
    state: ConnectionState,
    link: Option<Link>,
    /// Channel -> local subscribers in registration order. Keys are the desired set.
    subscribers: BTreeMap<String, Vec<LocalSubscriber>>,
    /// Last update seen per channel; the inner `None` is a received "absent"
    cache: HashMap<String, Option<Value>>,
    next_subscriber_id: u64,
}

impl SessionState {
    /// Transmits `message` if connected; otherwise the desired set covers it
    fn send(&self, message: ClientMessage) {
        if self.state != ConnectionState::Connected {
            debug!("Not connected, deferring {:?}", message);
            return;
        }
        if let Some(link) = &self.link {
            if link.send(message).is_err() {
                debug!("Transport link closed before send");
            }
        }
    }
}

/// Handle to a client sync session; clones share the same session
#[derive(Clone)]
pub struct ClientSyncSession {
    inner: Arc<Mutex<SessionState>>,
    /// Held across every callback invocation, so each local subscriber sees
    /// one channel's values in arrival order. Re-entrant so callbacks may
    /// subscribe or handle updates themselves.
    delivery: Arc<ReentrantMutex<()>>,
}

impl ClientSyncSession {
    /// Creates a disconnected session with no subscribers
    pub fn new() -> Self {
        Self {
            delivery: Arc::new(ReentrantMutex::new(())),
            inner: Arc::new(Mutex::new(SessionState {
                state: ConnectionState::Disconnected,
                link: None,
                subscribers: BTreeMap::new(),
                cache: HashMap::new(),
                next_subscriber_id: 1,
            })),
        }
    }

    /// Current transport state
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Channels with at least one local subscriber, sorted
    pub fn desired_channels(&self) -> Vec<String> {
        self.inner.lock().subscribers.keys().cloned().collect()
    }

    /// Number of local callbacks registered on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .lock()
            .subscribers
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Last-known value for `channel`: `None` if no update has arrived,
    /// `Some(None)` if the server reported it absent
    pub fn cached(&self, channel: &str) -> Option<Option<Value>> {
        self.inner.lock().cache.get(channel).cloned()
    }

    /// Marks a connection attempt in progress
    pub fn set_connecting(&self) {
        let mut session = self.inner.lock();
        session.state = ConnectionState::Connecting;
        session.link = None;
        debug!("Session connecting");
    }

    /// Marks the transport connected and subscribes every desired channel once
    pub fn set_connected(&self, link: Link) {
        let mut session = self.inner.lock();
        session.state = ConnectionState::Connected;
        session.link = Some(link);

        let channels: Vec<String> = session.subscribers.keys().cloned().collect();
        info!("Session connected, subscribing {} channels", channels.len());
        for channel in channels {
            session.send(ClientMessage::Subscribe { channel });
        }
    }

    /// Marks the transport gone. The desired set and cache survive for the
    /// next connection.
    pub fn set_disconnected(&self) {
        let mut session = self.inner.lock();
        if session.state != ConnectionState::Disconnected {
            info!("Session disconnected");
        }
        session.state = ConnectionState::Disconnected;
        session.link = None;
    }

    /// Registers `callback` for updates on `channel`.
    ///
    /// The first local subscriber of a channel adds it to the desired set
    /// (and subscribes now if connected). If a value is already cached, the
    /// callback runs immediately with it before this returns, and before any
    /// newer update can reach it.
    pub fn subscribe<F>(&self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let _delivery = self.delivery.lock();

        let (id, cached) = {
            let mut session = self.inner.lock();
            let id = session.next_subscriber_id;
            session.next_subscriber_id += 1;

            let subscribers = session.subscribers.entry(channel.to_string()).or_default();
            let first = subscribers.is_empty();
            subscribers.push(LocalSubscriber {
                id,
                callback: Arc::clone(&callback),
            });

            if first {
                session.send(ClientMessage::Subscribe {
                    channel: channel.to_string(),
                });
            }
            (id, session.cache.get(channel).cloned())
        };

        if let Some(value) = cached {
            invoke(channel, id, &callback, value.as_ref());
        }

        Subscription {
            session: Arc::downgrade(&self.inner),
            channel: channel.to_string(),
            id,
        }
    }

    fn remove_subscriber(inner: &Mutex<SessionState>, channel: &str, id: u64) {
        let mut session = inner.lock();
        let Some(subscribers) = session.subscribers.get_mut(channel) else {
            return;
        };
        subscribers.retain(|subscriber| subscriber.id != id);

        if subscribers.is_empty() {
            session.subscribers.remove(channel);
            session.cache.remove(channel);
            session.send(ClientMessage::Unsubscribe {
                channel: channel.to_string(),
            });
        }
    }

    /// Caches `data` and hands it to every local callback of `channel`, in
    /// registration order. A panicking callback is logged and skipped.
    ///
    /// Updates for channels outside the desired set (in flight across an
    /// unsubscribe) are ignored.
    pub fn handle_update(&self, channel: &str, data: Option<Value>) {
        let _delivery = self.delivery.lock();
        let callbacks = {
            let mut session = self.inner.lock();
            let Some(subscribers) = session.subscribers.get(channel) else {
                debug!("Ignoring update for unsubscribed channel {}", channel);
                return;
            };
            let callbacks: Vec<(u64, Callback)> = subscribers
                .iter()
                .map(|s| (s.id, Arc::clone(&s.callback)))
                .collect();
            session.cache.insert(channel.to_string(), data.clone());
            callbacks
        };

        for (id, callback) in &callbacks {
            invoke(channel, *id, callback, data.as_ref());
        }
    }

    /// Applies one decoded server message
    pub fn handle_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::Update { channel, data } => self.handle_update(&channel, data),
        }
    }

    /// Decodes one inbound frame and applies it
    pub fn handle_text(&self, text: &str) -> Result<(), ClientError> {
        let message: ServerMessage = serde_json::from_str(text)?;
        self.handle_message(message);
        Ok(())
    }
}

impl Default for ClientSyncSession {
    fn default() -> Self {
        Self::new()
    }
}

fn invoke(channel: &str, id: u64, callback: &Callback, value: Option<&Value>) {
    if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
        error!("Subscriber {} on channel {} panicked", id, channel);
    }
}

/// One local subscription; [`Subscription::unsubscribe`] releases it
#[must_use = "dropping a Subscription keeps the callback registered; call unsubscribe() to release it"]
pub struct Subscription {
    session: Weak<Mutex<SessionState>>,
    channel: String,
    id: u64,
}

impl Subscription {
    /// Channel this subscription listens on
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Removes the callback. If it was the channel's last local subscriber,
    /// the channel leaves the desired set and is unsubscribed when connected.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.session.upgrade() {
            ClientSyncSession::remove_subscriber(&inner, &self.channel, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio_test::{assert_err, assert_ok};

    fn link() -> (Link, UnboundedReceiver<ClientMessage>) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut UnboundedReceiver<ClientMessage>) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn subscribe(channel: &str) -> ClientMessage {
        ClientMessage::Subscribe {
            channel: channel.to_string(),
        }
    }

    fn unsubscribe(channel: &str) -> ClientMessage {
        ClientMessage::Unsubscribe {
            channel: channel.to_string(),
        }
    }

    fn recorder() -> (
        Arc<Mutex<Vec<Option<Value>>>>,
        impl Fn(Option<&Value>) + Send + Sync,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |value: Option<&Value>| sink.lock().push(value.cloned()))
    }

    #[test]
    fn test_starts_disconnected() {
        let session = ClientSyncSession::new();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.desired_channels().is_empty());
    }

    #[test]
    fn test_buffers_desired_set_while_disconnected() {
        let session = ClientSyncSession::new();
        let _a = session.subscribe("A", |_| {});
        let _b = session.subscribe("B", |_| {});
        let _b2 = session.subscribe("B", |_| {});

        assert_eq!(session.desired_channels(), vec!["A", "B"]);

        session.set_connecting();
        assert_eq!(session.state(), ConnectionState::Connecting);

        let (tx, mut rx) = link();
        session.set_connected(tx);
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(drain(&mut rx), vec![subscribe("A"), subscribe("B")]);
    }

    #[test]
    fn test_reconnect_resubscribes_desired_set_once() {
        let session = ClientSyncSession::new();
        let (tx, mut rx) = link();
        session.set_connected(tx);

        let _a = session.subscribe("A", |_| {});
        let _b = session.subscribe("B", |_| {});
        assert_eq!(drain(&mut rx), vec![subscribe("A"), subscribe("B")]);

        session.set_disconnected();
        let _a2 = session.subscribe("A", |_| {});
        session.set_connecting();

        let (tx, mut rx) = link();
        session.set_connected(tx);
        assert_eq!(drain(&mut rx), vec![subscribe("A"), subscribe("B")]);
    }

    #[test]
    fn test_multiplexes_local_subscribers() {
        let session = ClientSyncSession::new();
        let (tx, mut rx) = link();
        session.set_connected(tx);

        let first = session.subscribe("room", |_| {});
        let second = session.subscribe("room", |_| {});
        assert_eq!(drain(&mut rx), vec![subscribe("room")]);
        assert_eq!(session.subscriber_count("room"), 2);

        first.unsubscribe();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.desired_channels(), vec!["room"]);

        second.unsubscribe();
        assert_eq!(drain(&mut rx), vec![unsubscribe("room")]);
        assert!(session.desired_channels().is_empty());
    }

    #[test]
    fn test_unsubscribe_while_disconnected_is_not_sent_later() {
        let session = ClientSyncSession::new();
        let sub = session.subscribe("gone", |_| {});
        let _kept = session.subscribe("kept", |_| {});
        sub.unsubscribe();

        let (tx, mut rx) = link();
        session.set_connected(tx);
        assert_eq!(drain(&mut rx), vec![subscribe("kept")]);
    }

    #[test]
    fn test_update_fans_out_in_registration_order() {
        let session = ClientSyncSession::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            subs.push(session.subscribe("room", move |value| {
                order.lock().push((tag, value.cloned()));
            }));
        }

        session.handle_update("room", Some(json!({"clock": 5})));

        let expected: Vec<_> = ["first", "second", "third"]
            .into_iter()
            .map(|tag| (tag, Some(json!({"clock": 5}))))
            .collect();
        assert_eq!(*order.lock(), expected);
    }

    #[test]
    fn test_late_subscriber_gets_cached_value_immediately() {
        let session = ClientSyncSession::new();
        let _early = session.subscribe("room", |_| {});
        session.handle_update("room", Some(json!({"clock": 9})));

        let (seen, callback) = recorder();
        let _late = session.subscribe("room", callback);
        assert_eq!(*seen.lock(), vec![Some(json!({"clock": 9}))]);
        assert_eq!(session.cached("room"), Some(Some(json!({"clock": 9}))));
    }

    #[test]
    fn test_absent_update_is_cached_as_absent() {
        let session = ClientSyncSession::new();
        let (seen, callback) = recorder();
        let _sub = session.subscribe("empty", callback);
        assert!(seen.lock().is_empty());

        session.handle_update("empty", None);
        assert_eq!(*seen.lock(), vec![None]);
        assert_eq!(session.cached("empty"), Some(None));
        assert_eq!(session.cached("other"), None);
    }

    #[test]
    fn test_late_subscriber_never_sees_values_go_backwards() {
        let session = ClientSyncSession::new();
        let _anchor = session.subscribe("room", |_| {});

        let producer = session.clone();
        let writer = std::thread::spawn(move || {
            for i in 1..=20_000u64 {
                producer.handle_update("room", Some(json!(i)));
            }
        });

        let mut recorders = Vec::new();
        while !writer.is_finished() {
            let (seen, callback) = recorder();
            let sub = session.subscribe("room", callback);
            recorders.push((seen, sub));
            if recorders.len() > 200 {
                let (_, sub) = recorders.remove(0);
                sub.unsubscribe();
            }
        }
        writer.join().unwrap();

        for (seen, _) in &recorders {
            let values: Vec<u64> = seen
                .lock()
                .iter()
                .filter_map(|value| value.as_ref().and_then(Value::as_u64))
                .collect();
            assert!(
                values.windows(2).all(|pair| pair[0] < pair[1]),
                "values went backwards: {:?}",
                values
            );
        }
    }

    #[test]
    fn test_update_after_last_unsubscribe_is_ignored() {
        let session = ClientSyncSession::new();
        let sub = session.subscribe("room", |_| {});
        sub.unsubscribe();

        session.handle_update("room", Some(json!({"clock": 3})));
        assert_eq!(session.cached("room"), None);
        assert!(session.desired_channels().is_empty());
    }

    #[test]
    fn test_last_unsubscribe_drops_cache() {
        let session = ClientSyncSession::new();
        let sub = session.subscribe("room", |_| {});
        session.handle_update("room", Some(json!(1)));
        sub.unsubscribe();

        assert_eq!(session.cached("room"), None);

        let (seen, callback) = recorder();
        let _again = session.subscribe("room", callback);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let session = ClientSyncSession::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _bad = session.subscribe("room", |_| panic!("callback failure"));
        let counter = Arc::clone(&calls);
        let _good = session.subscribe("room", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&calls);
        let _other = session.subscribe("lobby", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.handle_update("room", Some(json!(1)));
        session.handle_update("lobby", Some(json!(2)));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_may_resubscribe_without_deadlock() {
        let session = ClientSyncSession::new();
        let nested = Arc::new(Mutex::new(Vec::new()));
        let inner_session = session.clone();
        let holder = Arc::clone(&nested);
        let _sub = session.subscribe("room", move |_| {
            holder.lock().push(inner_session.subscribe("lobby", |_| {}));
        });

        session.handle_update("room", Some(json!(1)));
        assert_eq!(session.desired_channels(), vec!["lobby", "room"]);
        assert_eq!(nested.lock().len(), 1);
    }

    #[test]
    fn test_handle_text_rejects_malformed_frames() {
        let session = ClientSyncSession::new();
        let (seen, callback) = recorder();
        let _sub = session.subscribe("room", callback);

        assert_err!(session.handle_text("not json"));
        assert_err!(session.handle_text(r#"{"type":"hello"}"#));
        assert_ok!(session.handle_text(r#"{"type":"update","channel":"room","data":{"clock":2}}"#));
        assert_eq!(*seen.lock(), vec![Some(json!({"clock": 2}))]);
    }

    #[test]
    fn test_subscription_outliving_session_is_harmless() {
        let session = ClientSyncSession::new();
        let sub = session.subscribe("room", |_| {});
        assert_eq!(sub.channel(), "room");
        drop(session);
        sub.unsubscribe();
    }
}
