//! Built-in file actions

use async_trait::async_trait;
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use shared::{
    DeleteFileAction, DeleteFileResult, WriteFileAction, WriteFileResult, DELETE_FILE, WRITE_FILE,
};

use crate::actions::{ActionHandler, ActionRegistry};
use crate::error::ActionError;

/// Adds every built-in action to `registry`
pub fn register_all(registry: &mut ActionRegistry) {
    registry.register(WRITE_FILE, WriteFile);
    registry.register(DELETE_FILE, DeleteFile);
}

fn decode<T: DeserializeOwned>(payload: Map<String, Value>) -> Result<T, ActionError> {
    serde_json::from_value(Value::Object(payload)).map_err(ActionError::handler)
}

fn encode<T: Serialize>(result: &T) -> Result<Value, ActionError> {
    serde_json::to_value(result).map_err(ActionError::handler)
}

/// Writes `value` to `path`, replacing any existing content
pub struct WriteFile;

#[async_trait]
impl ActionHandler for WriteFile {
    async fn handle(&self, payload: Map<String, Value>) -> Result<Value, ActionError> {
        let WriteFileAction { path, value } = decode(payload)?;
        tokio::fs::write(&path, value.as_bytes())
            .await
            .map_err(|e| ActionError::HandlerFailure(format!("failed to write {}: {}", path, e)))?;

        info!("Wrote {} bytes to {}", value.len(), path);
        encode(&WriteFileResult {
            path,
            written: true,
        })
    }
}

/// Removes the file at `path`
pub struct DeleteFile;

#[async_trait]
impl ActionHandler for DeleteFile {
    async fn handle(&self, payload: Map<String, Value>) -> Result<Value, ActionError> {
        let DeleteFileAction { path } = decode(payload)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| ActionError::HandlerFailure(format!("failed to delete {}: {}", path, e)))?;

        info!("Deleted {}", path);
        encode(&DeleteFileResult { path })
    }
}
