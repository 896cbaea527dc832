//! Live connection registry bridging transport sessions to the channel store
//!
//! This module tracks every open persistent connection and the channels it is
//! subscribed to:
//! - Connection lifecycle (connect, disconnect) and id assignment
//! - Subscribe/unsubscribe routing against the [`ChannelStore`]
//! - Unconditional subscription teardown when a connection closes
//!
//! Each connection owns an outbound queue. Store observers push `update`
//! messages onto it and the connection's writer task drains it, so fan-out
//! never waits on a socket.

use crate::error::ProtocolError;
use crate::store::{ChannelStore, ObserverToken};
use log::{debug, info};
use parking_lot::Mutex;
use shared::{ClientMessage, ServerMessage};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Server-assigned connection identifier, never reused within a process
pub type ConnectionId = u64;

/// Send capability for one connection
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// One live transport session and its subscriptions
#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier assigned by the hub
    pub id: ConnectionId,
    sender: Outbound,
    /// Channel name -> store observer registered on this connection's behalf
    subscriptions: HashMap<String, ObserverToken>,
}

impl Connection {
    fn new(id: ConnectionId, sender: Outbound) -> Self {
        Self {
            id,
            sender,
            subscriptions: HashMap::new(),
        }
    }

    /// Returns true if this connection holds a subscription to `channel`
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions.contains_key(channel)
    }

    /// Subscribed channel names, sorted
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.subscriptions.keys().cloned().collect();
        channels.sort();
        channels
    }
}

struct Connections {
    by_id: HashMap<ConnectionId, Connection>,
    next_connection_id: ConnectionId,
}

/// Routes persistent-connection traffic against the channel store
///
/// All subscriber-index mutation goes through one lock, so operations from a
/// single connection apply in the order its task hands them over.
pub struct ConnectionHub {
    store: Arc<ChannelStore>,
    connections: Mutex<Connections>,
}

impl ConnectionHub {
    /// Creates a hub with no connections, routing against `store`
    pub fn new(store: Arc<ChannelStore>) -> Self {
        Self {
            store,
            connections: Mutex::new(Connections {
                by_id: HashMap::new(),
                next_connection_id: 1,
            }),
        }
    }

    /// The channel store this hub registers observers with
    pub fn store(&self) -> &Arc<ChannelStore> {
        &self.store
    }

    /// Registers a new connection and returns its fresh id
    pub fn connect(&self, sender: Outbound) -> ConnectionId {
        let mut connections = self.connections.lock();
        let id = connections.next_connection_id;
        connections.next_connection_id += 1;
        connections.by_id.insert(id, Connection::new(id, sender));

        info!("Connection {} opened", id);
        id
    }

    /// Decodes one inbound frame and applies it.
    ///
    /// Malformed frames are reported back to the caller, which drops them;
    /// nothing about the connection changes.
    pub fn handle_text(&self, id: ConnectionId, text: &str) -> Result<(), ProtocolError> {
        let message: ClientMessage = serde_json::from_str(text)?;
        self.handle_message(id, message)
    }

    /// Applies one decoded client message for connection `id`
    pub fn handle_message(
        &self,
        id: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), ProtocolError> {
        match message {
            ClientMessage::Subscribe { channel } => self.subscribe(id, &channel).map(|_| ()),
            ClientMessage::Unsubscribe { channel } => self.unsubscribe(id, &channel).map(|_| ()),
        }
    }

    /// Subscribes connection `id` to `channel`.
    ///
    /// The connection immediately receives one `update` with the current
    /// value (absent if never written), then every later write. Returns
    /// false if it was already subscribed, in which case nothing is sent.
    pub fn subscribe(&self, id: ConnectionId, channel: &str) -> Result<bool, ProtocolError> {
        let mut connections = self.connections.lock();
        let connection = connections
            .by_id
            .get_mut(&id)
            .ok_or(ProtocolError::UnknownConnection(id))?;

        let slot = match connection.subscriptions.entry(channel.to_string()) {
            Entry::Occupied(_) => {
                debug!("Connection {} already subscribed to {}", id, channel);
                return Ok(false);
            }
            Entry::Vacant(slot) => slot,
        };

        let sender = connection.sender.clone();
        let name = channel.to_string();
        let token = self.store.observe_from_current(channel, move |value| {
            let update = ServerMessage::Update {
                channel: name.clone(),
                data: value.cloned(),
            };
            if sender.send(update).is_err() {
                debug!("Dropping update on {}: connection {} is closing", name, id);
            }
        });
        slot.insert(token);

        debug!("Connection {} subscribed to {}", id, channel);
        Ok(true)
    }

    /// Removes connection `id`'s interest in `channel`. Returns false if it
    /// was not subscribed.
    pub fn unsubscribe(&self, id: ConnectionId, channel: &str) -> Result<bool, ProtocolError> {
        let mut connections = self.connections.lock();
        let connection = connections
            .by_id
            .get_mut(&id)
            .ok_or(ProtocolError::UnknownConnection(id))?;

        match connection.subscriptions.remove(channel) {
            Some(token) => {
                self.store.unobserve(&token);
                debug!("Connection {} unsubscribed from {}", id, channel);
                Ok(true)
            }
            None => {
                debug!("Connection {} was not subscribed to {}", id, channel);
                Ok(false)
            }
        }
    }

    /// Drops connection `id` and every subscription it holds.
    ///
    /// Returns the number of subscriptions released, or `None` if the
    /// connection was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> Option<usize> {
        let connection = self.connections.lock().by_id.remove(&id)?;

        let released = connection.subscriptions.len();
        for token in connection.subscriptions.values() {
            self.store.unobserve(token);
        }

        info!(
            "Connection {} closed, released {} subscriptions",
            id, released
        );
        Some(released)
    }

    /// Sorted channel names connection `id` is subscribed to
    pub fn subscriptions(&self, id: ConnectionId) -> Option<Vec<String>> {
        self.connections.lock().by_id.get(&id).map(Connection::channels)
    }

    /// Returns true if connection `id` is open and subscribed to `channel`
    pub fn is_subscribed(&self, id: ConnectionId, channel: &str) -> bool {
        self.connections
            .lock()
            .by_id
            .get(&id)
            .is_some_and(|connection| connection.is_subscribed(channel))
    }

    /// Ids of all open connections, sorted
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.lock().by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of currently open connections
    pub fn len(&self) -> usize {
        self.connections.lock().by_id.len()
    }

    /// Returns true if no connections are currently open
    pub fn is_empty(&self) -> bool {
        self.connections.lock().by_id.is_empty()
    }
}
