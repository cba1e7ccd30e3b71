//! `record_intent_trace`: explicit audit entries from the agent.

use crate::core::error::GatehouseError;
use crate::core::registry::{ToolContext, ToolHandler, ToolRegistration};
use crate::core::trace::TraceLedger;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

pub const RECORD_TRACE_TOOL: &str = "record_intent_trace";

#[derive(Deserialize)]
struct RecordArgs {
    #[serde(default, alias = "intentId")]
    intent_id: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    details: Option<Value>,
}

pub struct RecordIntentTraceTool {
    ledger: Arc<TraceLedger>,
}

impl RecordIntentTraceTool {
    pub fn new(ledger: Arc<TraceLedger>) -> Self {
        Self { ledger }
    }
}

impl ToolHandler for RecordIntentTraceTool {
    fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let args: RecordArgs = serde_json::from_value(args).map_err(|e| {
            GatehouseError::InvalidArgument(format!("{}: {}", RECORD_TRACE_TOOL, e))
        })?;
        let intent_id = args.intent_id.ok_or(GatehouseError::MissingArgument {
            tool: RECORD_TRACE_TOOL,
            argument: "intent_id",
        })?;
        let action = args.action.unwrap_or_else(|| "unknown".to_string());
        let details = args.details.unwrap_or_else(|| json!({}));

        let path = self
            .ledger
            .record(&ctx.workspace, &intent_id, &action, details)?;
        Ok(json!({ "path": path.to_string_lossy() }))
    }
}

pub fn registrations(ledger: Arc<TraceLedger>) -> Vec<ToolRegistration> {
    vec![ToolRegistration::new(
        RECORD_TRACE_TOOL,
        "Record an audit entry linking an action to the intent that authorized it.",
        RecordIntentTraceTool::new(ledger),
    )]
}
