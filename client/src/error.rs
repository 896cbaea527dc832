use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of the client transport and action dispatch
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("action failed ({status}): {message}")]
    Action { status: u16, message: String },
    #[error("action payload must be a JSON object")]
    InvalidPayload,
}
