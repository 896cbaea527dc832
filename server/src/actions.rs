//! Action registry and request/response dispatch

use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::{Map, Value};
use shared::ActionRequest;
use std::collections::HashMap;
use std::sync::Arc;

use crate::builtin;
use crate::error::ActionError;

/// Handler for one named action
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Runs the action against its payload (the request minus `type`).
    async fn handle(&self, payload: Map<String, Value>) -> Result<Value, ActionError>;
}

/// Maps action names to handlers
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry preloaded with `WriteFile` and `DeleteFile`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Registers `handler` under `action_type`.
    ///
    /// An existing handler for the same name is replaced and a warning is
    /// logged.
    pub fn register(&mut self, action_type: &str, handler: impl ActionHandler + 'static) {
        if self
            .handlers
            .insert(action_type.to_string(), Arc::new(handler))
            .is_some()
        {
            warn!("Replaced handler for action {}", action_type);
        }
    }

    /// Looks up the handler for `action_type`.
    ///
    /// Returns a shared handle so the caller can run it without holding the
    /// registry.
    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action_type).cloned()
    }

    /// Returns true if a handler is registered for `action_type`
    pub fn has_action(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    /// Registered action names, sorted
    pub fn action_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless request/response front for the registry
///
/// Every request is independent. Handlers run on their own task, so a
/// failing or panicking handler only fails its own request.
pub struct ActionServer {
    registry: Arc<ActionRegistry>,
}

impl ActionServer {
    /// Wraps `registry`, which is immutable from here on
    pub fn new(registry: ActionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// The registry requests are dispatched against
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Decodes a raw `{type, ...payload}` body and dispatches it
    pub async fn dispatch_json(&self, body: &[u8]) -> Result<Value, ActionError> {
        let request: ActionRequest = serde_json::from_slice(body)
            .map_err(|e| ActionError::MalformedRequest(e.to_string()))?;
        self.dispatch(request).await
    }

    /// Looks up `request.action_type` and runs its handler.
    ///
    /// Success yields the handler's value, `null` standing for "no content".
    pub async fn dispatch(&self, request: ActionRequest) -> Result<Value, ActionError> {
        let ActionRequest {
            action_type,
            payload,
        } = request;

        let Some(handler) = self.registry.get(&action_type) else {
            warn!("Rejected unknown action {}", action_type);
            return Err(ActionError::UnknownAction(action_type));
        };

        debug!("Dispatching action {}", action_type);
        let outcome = tokio::spawn(async move { handler.handle(payload).await }).await;

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                warn!("Action {} failed: {}", action_type, e);
                Err(e)
            }
            Err(join_error) => {
                error!("Action {} handler aborted: {}", action_type, join_error);
                Err(ActionError::HandlerFailure(format!(
                    "Action {} handler panicked",
                    action_type
                )))
            }
        }
    }
}
