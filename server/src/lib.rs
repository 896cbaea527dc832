//! # Sync Server Library
//!
//! This library provides the authoritative state synchronization server for the
//! multiplayer game. It holds named pieces of shared state ("channels"), pushes
//! every change to the connections subscribed to it, and serves one-shot action
//! requests for client-initiated side effects.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The [`store::ChannelStore`] owns the current value of every channel. Writes
//! are last-write-wins per channel; there is no versioning and no ordering
//! across channels.
//!
//! ### Connection Management
//! The [`hub::ConnectionHub`] tracks every live persistent connection:
//! - Connection establishment and id assignment
//! - Subscribe/unsubscribe routing against the store
//! - Unconditional teardown of all subscriptions on disconnect
//!
//! ### Action Dispatch
//! The [`actions::ActionServer`] decodes one `{type, ...payload}` request, runs
//! the matching handler from the [`actions::ActionRegistry`] and returns either
//! the result or a request-scoped error. Failures never affect other requests.
//!
//! ## Architecture Design
//!
//! ### One Task Per Connection
//! Each WebSocket connection runs on its own task, so inbound subscribe and
//! unsubscribe messages apply in receipt order. Updates flow through an
//! unbounded per-connection queue drained by a writer task; a slow socket
//! never holds up fan-out to anyone else.
//!
//! ### Serialized Subscriber Index
//! The store is the only shared mutable resource. Each channel sits behind its
//! own lock, so fan-out cost depends only on that channel's subscribers and a
//! reader never observes a half-updated subscriber set.
//!
//! ### Room Clock
//! The server owns a scheduled task that advances `{clock}` in the home room
//! channel at a fixed interval, writing through the store like any other
//! producer.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::actions::ActionRegistry;
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default(), ActionRegistry::with_builtins()).await?;
//!
//!     // Prints the readiness line, starts the room clock and serves
//!     // /game (WebSocket), /api/dispatch and /health until the listener fails
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod builtin;
pub mod clock;
pub mod config;
pub mod error;
pub mod hub;
pub mod network;
pub mod store;
