//! Gated model dispatch.
//!
//! The generation backend is a collaborator behind [`ModelClient`]. Every
//! request goes through the pre-dispatch [`HookChain`] first; a blocked request
//! is never handed to the client.

use crate::core::error::GatehouseError;
use crate::core::gatekeeper::{HookChain, RequestPayload};
use crate::core::intents;
use crate::core::registry::ToolContext;
use crate::core::time;
use crate::core::trace::TraceLedger;
use crate::plugins::patch::StagedEdit;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// A generation backend. Implementors send the gated payload however they like.
pub trait ModelClient {
    fn complete(&self, payload: &RequestPayload) -> anyhow::Result<Value>;
}

impl<F> ModelClient for F
where
    F: Fn(&RequestPayload) -> anyhow::Result<Value>,
{
    fn complete(&self, payload: &RequestPayload) -> anyhow::Result<Value> {
        self(payload)
    }
}

/// Run the hook chain over `payload` without sending it anywhere.
pub fn prepare_payload(
    chain: &HookChain,
    payload: &mut RequestPayload,
    ctx: &ToolContext,
) -> Result<(), GatehouseError> {
    chain
        .run(payload, ctx)
        .map_err(|blocked| GatehouseError::GateBlocked(blocked.reason))
}

/// Gate `payload`, then hand it to `client`.
///
/// The model call is audited against the resolved intent on a best-effort
/// basis: a failed trace write is logged and does not affect the result.
pub fn send_to_model(
    chain: &HookChain,
    ledger: &TraceLedger,
    ctx: &ToolContext,
    client: &dyn ModelClient,
    payload: &mut RequestPayload,
) -> Result<Value, GatehouseError> {
    if let Err(err) = prepare_payload(chain, payload, ctx) {
        tracing::warn!(error = %err, "pre-dispatch hook blocked model call");
        return Err(err);
    }

    let event_id = time::new_event_id();
    let payload_hash = serde_json::to_string(&*payload)
        .map(|s| format!("{:x}", Sha256::digest(s.as_bytes())))
        .unwrap_or_default();

    let result = client.complete(payload);
    let status = if result.is_ok() { "success" } else { "error" };
    tracing::info!(event_id = %event_id, status = %status, "model call finished");

    if let Some(intent_id) = payload
        .intent_context
        .as_deref()
        .and_then(intents::intent_id_from_context)
    {
        let details = json!({
            "event_id": event_id,
            "status": status,
            "payload_sha256": payload_hash,
        });
        if let Err(err) = ledger.record(&ctx.workspace, &intent_id, "model_call", details) {
            tracing::warn!(intent = %intent_id, error = %err, "failed to record model call trace");
        }
    }

    result.map_err(|e| GatehouseError::ModelError(e.to_string()))
}

/// Pull staged edits out of a backend response.
///
/// Accepts `{"edits": [...]}`, `{"editsJson": "[...]"}`, or either of those
/// nested under `result`.
pub fn extract_edits(response: &Value) -> Option<Vec<StagedEdit>> {
    let candidates = [Some(response), response.get("result")];
    for node in candidates.into_iter().flatten() {
        if let Some(edits) = node.get("edits")
            && let Ok(parsed) = serde_json::from_value::<Vec<StagedEdit>>(edits.clone())
        {
            return Some(parsed);
        }
        if let Some(raw) = node.get("editsJson").and_then(Value::as_str)
            && let Ok(parsed) = serde_json::from_str::<Vec<StagedEdit>>(raw)
        {
            return Some(parsed);
        }
    }
    None
}
