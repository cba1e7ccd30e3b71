//! Built-in tools exposed to the agent.
//!
//! - `intent`: `select_active_intent`
//! - `patch`: `stage_patch`, `diff_staged_change`, `approve_patch`,
//!   `list_staged_changes`, `apply_patch`
//! - `trace`: `record_intent_trace`

pub mod intent;
pub mod patch;
pub mod trace;

use crate::core::error::GatehouseError;
use crate::core::registry::ToolRegistry;
use crate::core::trace::TraceLedger;
use std::sync::Arc;

pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    ledger: Arc<TraceLedger>,
) -> Result<(), GatehouseError> {
    let all = intent::registrations()
        .into_iter()
        .chain(patch::registrations(Arc::clone(&ledger)))
        .chain(trace::registrations(ledger));
    for registration in all {
        registry.register(registration)?;
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "gatehouse",
        "version": env!("CARGO_PKG_VERSION"),
        "tools": [
            { "name": "select_active_intent", "args": { "intent_id": "string" } },
            { "name": "stage_patch", "args": { "patch": "array|string", "description": "string?" } },
            { "name": "diff_staged_change", "args": { "stagedFile": "string" } },
            { "name": "approve_patch", "args": { "stagedFiles": "string[]", "intent_id": "string?" } },
            { "name": "list_staged_changes", "args": {} },
            { "name": "apply_patch", "args": { "patch": "array|string", "description": "string?", "intent_id": "string?" } },
            { "name": "record_intent_trace", "args": { "intent_id": "string", "action": "string", "details": "any" } }
        ],
        "storage": [
            ".orchestration/active_intents.yaml",
            ".orchestration/staged_changes/",
            ".orchestration/staged_manifest.json",
            ".orchestration/intents_traces/"
        ]
    })
}
