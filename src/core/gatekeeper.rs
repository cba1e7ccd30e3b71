//! Intent Gate
//!
//! Pre-dispatch hook chain run over every outgoing model request:
//! - The built-in [`IntentGate`] refuses any request that has no resolved intent
//! - Additional hooks run after it, in registration order, and may transform
//!   the payload or block it
//!
//! Blocking is an explicit value ([`GateOutcome::Blocked`]), never a panic.

use crate::core::error::GatehouseError;
use crate::core::intents::{self, Intent};
use crate::core::registry::{ToolContext, ToolResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SELECT_INTENT_TOOL: &str = "select_active_intent";

/// Outgoing request under construction. Hooks mutate it in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub tool_results: BTreeMap<String, ToolResult>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, alias = "intent_context", skip_serializing_if = "Option::is_none")]
    pub intent_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Host fields gatehouse does not interpret (model, temperature, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestPayload {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Attach a tool result so later gate passes can see it.
    pub fn record_tool_result(&mut self, tool: impl Into<String>, result: ToolResult) {
        self.tool_results.insert(tool.into(), result);
    }

    fn metadata_intent_id(&self) -> Option<String> {
        ["intent_id", "intentId"]
            .iter()
            .filter_map(|k| self.metadata.get(*k))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unresolved,
    Resolving,
    Gated,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// No cached selection and no intent id in metadata or prompt.
    IntentNotSelected,
    /// The intent configuration file does not exist.
    MissingIntentConfig(String),
    /// The cited id is not among the active intents.
    InvalidIntentId(String),
    /// The intent configuration exists but could not be read.
    IntentConfigUnreadable(String),
    /// The intent configuration parsed but declares an invalid intent.
    InvalidIntentConfig(String),
    /// A user-registered hook refused the request.
    Hook { hook: String, message: String },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IntentNotSelected => write!(
                f,
                "You must call select_active_intent(intent_id) before attempting to write code. Gatekeeper blocked execution."
            ),
            Self::MissingIntentConfig(path) => write!(
                f,
                "{} not found. Create it with at least one intent under `active_intents`.",
                path
            ),
            Self::InvalidIntentId(id) => write!(
                f,
                "You must cite a valid active Intent ID. {} not found.",
                id
            ),
            Self::IntentConfigUnreadable(msg) => {
                write!(f, "Intent configuration could not be read: {}", msg)
            }
            Self::InvalidIntentConfig(msg) => {
                write!(f, "Intent configuration failed validation: {}", msg)
            }
            Self::Hook { hook, message } => write!(f, "Hook '{}' blocked request: {}", hook, message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Gated(String),
    Blocked(BlockReason),
}

impl GateOutcome {
    pub fn state(&self) -> GateState {
        match self {
            GateOutcome::Gated(_) => GateState::Gated,
            GateOutcome::Blocked(_) => GateState::Blocked,
        }
    }
}

/// Pre-dispatch extension point.
pub trait PreDispatchHook: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect or transform `payload`. Returning `Err` blocks the request.
    fn before_dispatch(
        &self,
        payload: &mut RequestPayload,
        ctx: &ToolContext,
    ) -> Result<(), BlockReason>;
}

/// Request refused by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocked {
    pub hook: String,
    pub reason: BlockReason,
}

/// Ordered list of pre-dispatch hooks.
#[derive(Default, Clone)]
pub struct HookChain {
    hooks: Vec<Arc<dyn PreDispatchHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Arc<dyn PreDispatchHook>) {
        self.hooks.push(hook);
    }

    pub fn names(&self) -> Vec<String> {
        self.hooks.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Single pass in registration order; stops at the first block.
    pub fn run(&self, payload: &mut RequestPayload, ctx: &ToolContext) -> Result<(), Blocked> {
        for hook in &self.hooks {
            if let Err(reason) = hook.before_dispatch(payload, ctx) {
                tracing::warn!(hook = %hook.name(), reason = %reason, "pre-dispatch hook blocked request");
                return Err(Blocked {
                    hook: hook.name().to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

/// The gate that requires a resolved intent before any model request.
#[derive(Debug, Clone)]
pub struct IntentGate {
    intent_pattern: Regex,
}

impl IntentGate {
    pub fn new(intent_prefix: &str) -> Result<Self, regex::Error> {
        let intent_pattern = Regex::new(&format!(
            "({}[0-9A-Za-z_-]+)",
            regex::escape(intent_prefix)
        ))?;
        Ok(Self { intent_pattern })
    }

    /// First intent-shaped token in `prompt`.
    pub fn extract_intent_id(&self, prompt: &str) -> Option<String> {
        self.intent_pattern
            .captures(prompt)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// One gate pass. Mutates `payload` only on the `Gated` path.
    pub fn evaluate(&self, payload: &mut RequestPayload, ctx: &ToolContext) -> GateOutcome {
        let outcome = self.resolve(payload, ctx);
        match &outcome {
            GateOutcome::Gated(context) => {
                payload.intent_context = Some(context.clone());
            }
            GateOutcome::Blocked(reason) => {
                tracing::info!(reason = %reason, "intent gate blocked request");
            }
        }
        outcome
    }

    fn resolve(&self, payload: &mut RequestPayload, ctx: &ToolContext) -> GateOutcome {
        // Cached selection: no filesystem access on this path.
        if let Some(ToolResult::Success(value)) = payload.tool_results.get(SELECT_INTENT_TOOL) {
            tracing::debug!(from = ?GateState::Unresolved, to = ?GateState::Gated, "cached intent selection");
            return GateOutcome::Gated(context_string(value));
        }

        tracing::debug!(from = ?GateState::Unresolved, to = ?GateState::Resolving, "resolving intent");
        let ws = &ctx.workspace;
        if !ws.intents_file().exists() {
            return GateOutcome::Blocked(BlockReason::MissingIntentConfig(
                ws.intents_file_display().to_string(),
            ));
        }

        let candidate = payload
            .metadata_intent_id()
            .or_else(|| self.extract_intent_id(&payload.prompt));
        let Some(intent_id) = candidate else {
            return GateOutcome::Blocked(BlockReason::IntentNotSelected);
        };

        let intents: Vec<Intent> = match intents::load_active_intents(ws) {
            Ok(list) => list,
            Err(GatehouseError::ValidationError(msg)) => {
                return GateOutcome::Blocked(BlockReason::InvalidIntentConfig(msg));
            }
            Err(err) => {
                return GateOutcome::Blocked(BlockReason::IntentConfigUnreadable(err.to_string()));
            }
        };
        let Some(intent) = intents::find_intent(&intents, &intent_id) else {
            return GateOutcome::Blocked(BlockReason::InvalidIntentId(intent_id));
        };

        let xml = intents::render_intent_context(intent);
        let system_prompt = payload.system_prompt.get_or_insert_with(String::new);
        system_prompt.push_str("\n\n");
        system_prompt.push_str(&xml);
        tracing::debug!(intent = %intent.id, from = ?GateState::Resolving, to = ?GateState::Gated, "intent resolved");
        GateOutcome::Gated(xml)
    }
}

fn context_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl PreDispatchHook for IntentGate {
    fn name(&self) -> &str {
        "intent_gate"
    }

    fn before_dispatch(
        &self,
        payload: &mut RequestPayload,
        ctx: &ToolContext,
    ) -> Result<(), BlockReason> {
        match self.evaluate(payload, ctx) {
            GateOutcome::Gated(_) => Ok(()),
            GateOutcome::Blocked(reason) => Err(reason),
        }
    }
}
