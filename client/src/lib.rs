//! # Sync Client Library
//!
//! This library provides the client-side counterpart of the sync server: a
//! session that keeps local subscribers fed with server-authoritative channel
//! state across reconnects, plus a small HTTP client for action dispatch.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The [`session::ClientSyncSession`] state machine:
//! - Multiplexes any number of local callbacks onto one server subscription
//!   per channel, reference counted
//! - Buffers the desired set of channels while disconnected and replays it
//!   exactly once on every (re)connect
//! - Caches the last value per channel and hands it to late subscribers
//!
//! The session performs no I/O; a transport drives its transitions.
//!
//! ### Network Module (`network`)
//! WebSocket transport for the session: connects, pumps subscribe/unsubscribe
//! out and updates in, and retries after the connection drops.
//!
//! ### Actions Module (`actions`)
//! [`actions::ActionClient`] posts `{type, ...payload}` requests to the
//! server's dispatch endpoint and maps failures to [`error::ClientError`].
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::actions::ActionClient;
//! use client::network::spawn_session;
//! use client::session::ClientSyncSession;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = ClientSyncSession::new();
//!
//!     // Subscribing works before the connection exists
//!     let room = session.subscribe("Room:HomeRoom", |value| {
//!         println!("room is now {:?}", value);
//!     });
//!
//!     let transport = spawn_session(
//!         "ws://127.0.0.1:3000/game",
//!         session.clone(),
//!         Duration::from_secs(1),
//!     );
//!
//!     let actions = ActionClient::new("http://127.0.0.1:3000");
//!     actions.write_file("/tmp/brainyard", "Server Data").await?;
//!
//!     room.unsubscribe();
//!     transport.abort();
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod error;
pub mod network;
pub mod session;
