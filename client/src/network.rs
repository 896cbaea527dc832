//! WebSocket transport driving a [`ClientSyncSession`]

use crate::error::ClientError;
use crate::session::ClientSyncSession;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::ClientMessage;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Runs one connection attempt to completion.
///
/// Moves the session through `Connecting` to `Connected`, pumps messages
/// both ways until the socket closes, then leaves it `Disconnected`.
/// Returns an error only if the connection could not be established or
/// broke with a transport error.
pub async fn connect_once(url: &str, session: &ClientSyncSession) -> Result<(), ClientError> {
    session.set_connecting();

    let ws = match connect_async(url).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            session.set_disconnected();
            return Err(e.into());
        }
    };
    info!("Connected to {}", url);

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ClientMessage>();
    session.set_connected(tx);

    let result: Result<(), ClientError> = loop {
        tokio::select! {
            Some(message) = rx.recv() => {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => break Err(ClientError::Encode(e)),
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    break Err(e.into());
                }
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = session.handle_text(text.as_str()) {
                        warn!("Dropping malformed server message: {}", e);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
        }
    };

    session.set_disconnected();
    result
}

/// Keeps `session` connected to `url` forever, waiting `retry_delay`
/// between attempts
pub async fn run_session(url: String, session: ClientSyncSession, retry_delay: Duration) {
    loop {
        match connect_once(&url, &session).await {
            Ok(()) => info!("Connection to {} closed", url),
            Err(e) => warn!("Connection to {} failed: {}", url, e),
        }
        debug!("Reconnecting in {:?}", retry_delay);
        sleep(retry_delay).await;
    }
}

/// Spawns [`run_session`] on a background task
pub fn spawn_session(url: &str, session: ClientSyncSession, retry_delay: Duration) -> JoinHandle<()> {
    tokio::spawn(run_session(url.to_string(), session, retry_delay))
}
