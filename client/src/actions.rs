//! HTTP client for one-shot action dispatch

use crate::error::ClientError;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use shared::{
    ActionRequest, DeleteFileAction, DeleteFileResult, ErrorBody, WriteFileAction,
    WriteFileResult, DELETE_FILE, DISPATCH_PATH, WRITE_FILE,
};

/// Client for the server's action dispatch endpoint
#[derive(Debug, Clone)]
pub struct ActionClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ActionClient {
    /// `base_url` is the server's HTTP root, e.g. `http://127.0.0.1:3000`
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), DISPATCH_PATH),
        }
    }

    /// Full URL of the dispatch endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends `{type: action_type, ...payload}` and returns the response body.
    ///
    /// `payload` must be a JSON object (or `null` for no fields). A
    /// non-success response becomes [`ClientError::Action`] carrying the
    /// server's message.
    pub async fn dispatch(&self, action_type: &str, payload: Value) -> Result<Value, ClientError> {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Default::default(),
            _ => return Err(ClientError::InvalidPayload),
        };
        self.send(&ActionRequest::new(action_type, payload)).await
    }

    /// Posts an already built request; see [`ActionClient::dispatch`]
    pub async fn send(&self, request: &ActionRequest) -> Result<Value, ClientError> {
        debug!("Dispatching {} to {}", request.action_type, self.endpoint);
        let response = self.http.post(&self.endpoint).json(request).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<Value>().await?);
        }

        let text = response.text().await?;
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        Err(ClientError::Action {
            status: status.as_u16(),
            message,
        })
    }

    async fn typed<P: Serialize, R: DeserializeOwned>(
        &self,
        action_type: &str,
        payload: &P,
    ) -> Result<R, ClientError> {
        let payload = serde_json::to_value(payload).map_err(ClientError::Encode)?;
        let result = self.dispatch(action_type, payload).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Dispatches `WriteFile`, replacing the file at `path` with `value`
    pub async fn write_file(&self, path: &str, value: &str) -> Result<WriteFileResult, ClientError> {
        let action = WriteFileAction {
            path: path.to_string(),
            value: value.to_string(),
        };
        self.typed(WRITE_FILE, &action).await
    }

    /// Dispatches `DeleteFile` for `path`
    pub async fn delete_file(&self, path: &str) -> Result<DeleteFileResult, ClientError> {
        let action = DeleteFileAction {
            path: path.to_string(),
        };
        self.typed(DELETE_FILE, &action).await
    }
}
