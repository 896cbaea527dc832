//! Error types for the sync server

use axum::http::StatusCode;
use shared::ErrorBody;
use std::fmt::Display;
use thiserror::Error;

use crate::hub::ConnectionId;

/// Problems with a single inbound persistent-connection message.
///
/// These are message-scoped: the offending frame is dropped and the
/// connection stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}

/// Request-scoped action dispatch failures
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("{0}")]
    HandlerFailure(String),
    #[error("Malformed action request: {0}")]
    MalformedRequest(String),
}

impl ActionError {
    /// Wraps any displayable handler error as a [`ActionError::HandlerFailure`]
    pub fn handler(err: impl Display) -> Self {
        ActionError::HandlerFailure(err.to_string())
    }

    /// HTTP status reported to the caller
    pub fn status(&self) -> StatusCode {
        match self {
            ActionError::UnknownAction(_) => StatusCode::NOT_FOUND,
            ActionError::HandlerFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ActionError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// `{message}` body sent alongside the failure status
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_status_mapping() {
        assert_eq!(
            ActionError::UnknownAction("Frobulate".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ActionError::handler("disk full").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ActionError::MalformedRequest("missing type".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_handler_message_is_forwarded_verbatim() {
        let body = ActionError::handler("ENOENT: no such file").to_body();
        assert_eq!(body.message, "ENOENT: no such file");

        let body = ActionError::UnknownAction("Frobulate".into()).to_body();
        assert_eq!(body.message, "Unknown action: Frobulate");
    }
}
