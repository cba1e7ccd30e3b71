//! `select_active_intent`: the only tool whose success satisfies the gate.

use crate::core::error::GatehouseError;
use crate::core::gatekeeper::SELECT_INTENT_TOOL;
use crate::core::intents;
use crate::core::registry::{ToolContext, ToolRegistration};
use crate::core::store::Workspace;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct SelectArgs {
    #[serde(default, alias = "intentId")]
    intent_id: Option<String>,
}

/// Resolve `intent_id` to its rendered `<intent_context>` block.
pub fn select_active_intent(ws: &Workspace, intent_id: &str) -> Result<String, GatehouseError> {
    let active = intents::load_active_intents(ws)?;
    let intent = intents::find_intent(&active, intent_id).ok_or_else(|| {
        GatehouseError::InvalidIntent {
            id: intent_id.to_string(),
            source_file: ws.intents_file_display().to_string(),
        }
    })?;
    tracing::info!(intent = %intent.id, "active intent selected");
    Ok(intents::render_intent_context(intent))
}

fn select_active_intent_tool(args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
    let args: SelectArgs = serde_json::from_value(args)
        .map_err(|e| GatehouseError::InvalidArgument(format!("{}: {}", SELECT_INTENT_TOOL, e)))?;
    let intent_id = args
        .intent_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(GatehouseError::MissingArgument {
            tool: SELECT_INTENT_TOOL,
            argument: "intent_id",
        })?;
    let xml = select_active_intent(&ctx.workspace, &intent_id)?;
    Ok(Value::String(xml))
}

pub fn registrations() -> Vec<ToolRegistration> {
    vec![ToolRegistration::from_fn(
        SELECT_INTENT_TOOL,
        "Select an active intent by id and return its <intent_context> block.",
        select_active_intent_tool,
    )]
}
