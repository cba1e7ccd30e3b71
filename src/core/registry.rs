//! Tool registry and invocation protocol.
//!
//! Every capability the agent can call is a [`ToolHandler`] registered under a
//! unique name. [`ToolRegistry::invoke`] is the single containment boundary:
//! whatever a handler returns or raises, the caller always gets a
//! [`ToolResult`] back.

use crate::core::error::GatehouseError;
use crate::core::hooks::PostApplyHooks;
use crate::core::store::Workspace;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Per-invocation context handed to every handler.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub workspace: Workspace,
    /// Run by tools that write into the workspace, after the write commits.
    pub post_apply: PostApplyHooks,
}

impl ToolContext {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            post_apply: PostApplyHooks::new(),
        }
    }
}

/// A callable capability. Handlers report faults through `Err`; the registry
/// converts both errors and panics into a failed [`ToolResult`].
pub trait ToolHandler: Send + Sync {
    fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value>;
}

impl<F> ToolHandler for F
where
    F: Fn(Value, &ToolContext) -> anyhow::Result<Value> + Send + Sync,
{
    fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        self(args, ctx)
    }
}

#[derive(Clone)]
pub struct ToolRegistration {
    pub name: String,
    pub description: String,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolRegistration {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            handler: Arc::new(handler),
        }
    }

    /// Register a closure as a handler.
    pub fn from_fn<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, &ToolContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, description, handler)
    }
}

impl std::fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Outcome of one tool invocation.
///
/// Serializes as `{"success": true, "value": ...}` or
/// `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ToolResultWire", try_from = "ToolResultWire")]
pub enum ToolResult {
    Success(Value),
    Failure(String),
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            ToolResult::Success(v) => Some(v),
            ToolResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ToolResult::Success(_) => None,
            ToolResult::Failure(e) => Some(e),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ToolResultWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<ToolResult> for ToolResultWire {
    fn from(result: ToolResult) -> Self {
        match result {
            ToolResult::Success(value) => ToolResultWire {
                success: true,
                value: Some(value),
                error: None,
            },
            ToolResult::Failure(error) => ToolResultWire {
                success: false,
                value: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<ToolResultWire> for ToolResult {
    type Error = String;

    fn try_from(wire: ToolResultWire) -> Result<Self, Self::Error> {
        if wire.success {
            Ok(ToolResult::Success(wire.value.unwrap_or(Value::Null)))
        } else {
            Ok(ToolResult::Failure(
                wire.error.unwrap_or_else(|| "tool reported failure".to_string()),
            ))
        }
    }
}

/// Name → registration table. Add-only for the lifetime of its owner.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolRegistration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `registration.name`.
    pub fn register(&mut self, registration: ToolRegistration) -> Result<(), GatehouseError> {
        if registration.name.trim().is_empty() {
            return Err(GatehouseError::InvalidRegistration(
                "tool name must not be empty".to_string(),
            ));
        }
        if self.tools.contains_key(&registration.name) {
            tracing::debug!(tool = %registration.name, "overwriting tool registration");
        }
        self.tools.insert(registration.name.clone(), registration);
        Ok(())
    }

    pub fn invoke(&self, name: &str, args: Option<Value>, ctx: &ToolContext) -> ToolResult {
        let Some(registration) = self.tools.get(name) else {
            tracing::warn!(tool = %name, "invoke of unregistered tool");
            return ToolResult::Failure(GatehouseError::ToolNotFound(name.to_string()).to_string());
        };

        let args = match args {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(v) => v,
        };

        tracing::debug!(tool = %name, "invoking tool");
        let handler = Arc::clone(&registration.handler);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.call(args, ctx)));

        match outcome {
            Ok(Ok(value)) => ToolResult::Success(value),
            Ok(Err(err)) => {
                tracing::warn!(tool = %name, error = %err, "tool reported failure");
                ToolResult::Failure(err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(tool = %name, error = %message, "tool handler panicked");
                ToolResult::Failure(message)
            }
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolRegistration> {
        self.tools.get(name)
    }

    pub fn registrations(&self) -> impl Iterator<Item = &ToolRegistration> {
        self.tools.values()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool handler panicked".to_string()
    }
}
