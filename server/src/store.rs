//! Authoritative channel state and per-channel observer fan-out
//!
//! The store owns every channel's current value and the observers registered
//! against it. Each channel has two locks:
//! - a short state lock guarding the value and the observer set, never held
//!   while an observer runs
//! - a re-entrant delivery lock held for a whole write or registration, which
//!   keeps fan-out for one channel in write order
//!
//! Observers therefore run without the state lock and may read, write,
//! observe or unobserve their own channel. A write made from inside an
//! observer is delivered before the outer write's remaining observers run.
//! Fan-out cost is proportional to that channel's observers only, and a
//! reader sees the observer set either before or after a change, never torn.

use log::{debug, error};
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with a channel's new value
pub type Observer = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Opaque handle returned by [`ChannelStore::observe`], used for O(1) removal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverToken {
    channel: String,
    id: u64,
}

impl ObserverToken {
    /// Name of the channel this observer is registered on
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[derive(Default)]
struct ChannelState {
    value: Option<Value>,
    /// Keyed by registration id, so iteration follows registration order
    observers: BTreeMap<u64, Observer>,
}

#[derive(Default)]
struct Channel {
    delivery: ReentrantMutex<()>,
    state: Mutex<ChannelState>,
}

/// Named, last-write-wins slots of shared state
pub struct ChannelStore {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
    next_observer_id: AtomicU64,
}

impl ChannelStore {
    /// Creates an empty store.
    ///
    /// Channels appear lazily on their first write or observe and live as
    /// long as the store.
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_observer_id: AtomicU64::new(1),
        }
    }

    /// Returns the channel slot, creating it on first use
    fn channel(&self, name: &str) -> Arc<Channel> {
        let mut channels = self.channels.lock();
        Arc::clone(channels.entry(name.to_string()).or_default())
    }

    fn existing(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.lock().get(name).cloned()
    }

    /// Replaces the current value and notifies every observer of `name`.
    ///
    /// Returns how many observers were notified. A panicking observer is
    /// logged and skipped; the rest still run.
    pub fn write(&self, name: &str, value: Value) -> usize {
        let channel = self.channel(name);
        let _delivery = channel.delivery.lock();

        let (value, observers) = {
            let mut state = channel.state.lock();
            state.value = Some(value);
            let observers: Vec<(u64, Observer)> = state
                .observers
                .iter()
                .map(|(id, observer)| (*id, Arc::clone(observer)))
                .collect();
            (state.value.clone(), observers)
        };

        for (id, observer) in &observers {
            notify(name, *id, observer, value.as_ref());
        }
        debug!(
            "Wrote channel {} ({} observers notified)",
            name,
            observers.len()
        );
        observers.len()
    }

    /// Current value of `name`, or `None` if it has never been written
    pub fn read(&self, name: &str) -> Option<Value> {
        self.existing(name)
            .and_then(|channel| channel.state.lock().value.clone())
    }

    /// Registers `observer` for every future write to `name`.
    ///
    /// Registration does not invoke the observer; callers that need the
    /// current value read it separately or use [`ChannelStore::observe_from_current`].
    pub fn observe<F>(&self, name: &str, observer: F) -> ObserverToken
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let channel = self.channel(name);
        let _delivery = channel.delivery.lock();
        let mut state = channel.state.lock();
        self.register(name, &mut state, Arc::new(observer))
    }

    /// Registers `observer` and invokes it once with the current value
    /// (absent included) before any later write can reach it.
    ///
    /// Registration, the read and the initial delivery all happen under the
    /// channel's delivery lock, so the observer sees the current value
    /// exactly once and every later write exactly once, in order.
    pub fn observe_from_current<F>(&self, name: &str, observer: F) -> ObserverToken
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let observer: Observer = Arc::new(observer);
        let channel = self.channel(name);
        let _delivery = channel.delivery.lock();

        let (token, current) = {
            let mut state = channel.state.lock();
            let token = self.register(name, &mut state, Arc::clone(&observer));
            (token, state.value.clone())
        };

        notify(name, token.id, &observer, current.as_ref());
        token
    }

    fn register(&self, name: &str, state: &mut ChannelState, observer: Observer) -> ObserverToken {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        state.observers.insert(id, observer);

        ObserverToken {
            channel: name.to_string(),
            id,
        }
    }

    /// Removes the observer behind `token`. Returns false if it was already gone.
    ///
    /// Once this returns the observer receives no further writes, unless it
    /// is called from inside that observer's own fan-out.
    pub fn unobserve(&self, token: &ObserverToken) -> bool {
        let Some(channel) = self.existing(&token.channel) else {
            return false;
        };
        let _delivery = channel.delivery.lock();
        let removed = channel.state.lock().observers.remove(&token.id).is_some();
        removed
    }

    /// Number of observers currently registered on `name`
    pub fn observer_count(&self, name: &str) -> usize {
        self.existing(name)
            .map(|channel| channel.state.lock().observers.len())
            .unwrap_or(0)
    }

    /// Number of channels created so far
    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    /// Returns true if no channel has been created yet
    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

fn notify(channel: &str, id: u64, observer: &Observer, value: Option<&Value>) {
    if catch_unwind(AssertUnwindSafe(|| observer(value))).is_err() {
        error!(
            "Observer {} on channel {} panicked; continuing fan-out",
            id, channel
        );
    }
}
