//! Server network layer: one HTTP listener carrying the persistent WebSocket
//! connection and the action dispatch endpoint

use crate::actions::{ActionRegistry, ActionServer};
use crate::clock::spawn_room_clock;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hub::ConnectionHub;
use crate::store::ChannelStore;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ServerMessage, DISPATCH_PATH, GAME_PATH, HEALTH_PATH, READY_MARKER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Shared state handed to every request handler
pub struct AppState {
    pub hub: Arc<ConnectionHub>,
    pub actions: Arc<ActionServer>,
}

/// Builds the HTTP router.
///
/// Routes:
/// - `GET /game` upgrades to the persistent WebSocket connection
/// - `POST /api/dispatch` runs one action
/// - `GET /health` reports connection and channel counts
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(GAME_PATH, get(ws_handler))
        .route(DISPATCH_PATH, post(dispatch_handler))
        .route(HEALTH_PATH, get(health_check))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Runs one persistent connection until the transport closes.
///
/// Inbound frames are applied in receipt order on this task; outbound
/// updates are drained by a separate writer task. However the connection
/// ends, every subscription it holds is released.
pub async fn handle_socket(socket: WebSocket, hub: Arc<ConnectionHub>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn_id = hub.connect(tx);

    let mut writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode update for connection {}: {}", conn_id, e);
                    continue;
                }
            };
            if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                warn!("Failed to send to connection {}: {}", conn_id, e);
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = hub.handle_text(conn_id, text.as_str()) {
                        warn!("Dropping message from connection {}: {}", conn_id, e);
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!("Ignoring binary frame from connection {}", conn_id);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error on connection {}: {}", conn_id, e);
                    break;
                }
            },
            _ = &mut writer => {
                debug!("Writer for connection {} stopped", conn_id);
                break;
            }
        }
    }

    hub.disconnect(conn_id);
    writer.abort();
}

async fn dispatch_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match state.actions.dispatch_json(&body).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => (e.status(), Json(e.to_body())).into_response(),
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.hub.len(),
        "channels": state.hub.store().len(),
    }))
}

/// Sync server: channel store, connection hub and action endpoint behind one
/// listener, plus the room clock task
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    store: Arc<ChannelStore>,
    hub: Arc<ConnectionHub>,
    actions: Arc<ActionServer>,
}

impl Server {
    /// Binds the listener and builds an empty store, hub and action server.
    ///
    /// Nothing is served until [`Server::run`] or [`Server::spawn`]. A port
    /// of 0 binds an ephemeral port; see [`Server::local_addr`].
    pub async fn bind(config: ServerConfig, registry: ActionRegistry) -> Result<Self, ServerError> {
        let addr = config.address();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => return Err(ServerError::Bind { addr, source }),
        };

        let store = Arc::new(ChannelStore::new());
        let hub = Arc::new(ConnectionHub::new(Arc::clone(&store)));

        Ok(Server {
            config,
            listener,
            store,
            hub,
            actions: Arc::new(ActionServer::new(registry)),
        })
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the channel store, for in-process producers
    pub fn store(&self) -> Arc<ChannelStore> {
        Arc::clone(&self.store)
    }

    /// Shared handle to the connection hub
    pub fn hub(&self) -> Arc<ConnectionHub> {
        Arc::clone(&self.hub)
    }

    /// Serves until the listener fails
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.local_addr()?;

        let clock = self.config.clock_interval.map(|period| {
            info!(
                "Room clock on {} every {:?}",
                self.config.room_channel, period
            );
            spawn_room_clock(
                Arc::clone(&self.store),
                self.config.room_channel.clone(),
                period,
            )
        });

        let router = create_router(Arc::new(AppState {
            hub: Arc::clone(&self.hub),
            actions: Arc::clone(&self.actions),
        }));

        info!("Server listening on {}", addr);
        println!("{} http://{}", READY_MARKER, addr);

        let result = axum::serve(self.listener, router).await;

        if let Some(clock) = clock {
            clock.abort();
        }
        result.map_err(ServerError::from)
    }

    /// Runs the server on a background task and returns its bound address
    pub fn spawn(self) -> Result<(SocketAddr, JoinHandle<Result<(), ServerError>>), ServerError> {
        let addr = self.local_addr()?;
        Ok((addr, tokio::spawn(self.run())))
    }
}
