//! Room clock: the server's periodic internal state mutation

use crate::store::ChannelStore;
use log::{debug, warn};
use shared::RoomState;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Advances the clock held in `channel` by one and returns the new value.
///
/// An absent or unreadable room value counts as clock 0. The whole room
/// value is replaced (last write wins).
pub fn tick(store: &ChannelStore, channel: &str) -> u64 {
    let previous = match store.read(channel) {
        Some(value) => match serde_json::from_value::<RoomState>(value) {
            Ok(room) => room.clock,
            Err(e) => {
                warn!("Resetting clock on {}: unreadable room state ({})", channel, e);
                0
            }
        },
        None => 0,
    };

    let room = RoomState {
        clock: previous + 1,
    };
    match serde_json::to_value(room) {
        Ok(value) => {
            store.write(channel, value);
        }
        Err(e) => warn!("Failed to encode room state: {}", e),
    }
    room.clock
}

/// Spawns the task that ticks the room clock every `period`
pub fn spawn_room_clock(
    store: Arc<ChannelStore>,
    channel: String,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        timer.tick().await;

        loop {
            timer.tick().await;
            let clock = tick(&store, &channel);
            debug!("Room clock on {} at {}", channel, clock);
        }
    })
}
