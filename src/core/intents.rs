//! Intent store: declared units of scoped work.
//!
//! Intents are owned by the operator and declared in
//! `.orchestration/active_intents.yaml`:
//!
//! ```yaml
//! active_intents:
//!   - id: INT-001
//!     name: Pure foo
//!     status: IN_PROGRESS
//!     owned_scope: [src/foo.rs]
//!     constraints: ["no new dependencies"]
//!     acceptance_criteria: ["foo is pure"]
//! ```
//!
//! Gatehouse only reads this file. Loaded intents are immutable for the
//! session.

use crate::core::error::GatehouseError;
use crate::core::store::Workspace;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "ownedScope")]
    pub owned_scope: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default, alias = "acceptanceCriteria")]
    pub acceptance_criteria: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IntentDocument {
    #[serde(default)]
    active_intents: Vec<Intent>,
}

/// Load active intents. A missing file is an empty set, not an error.
pub fn load_active_intents(ws: &Workspace) -> Result<Vec<Intent>, GatehouseError> {
    let path = ws.intents_file();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no intent configuration present");
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(&path)?;
    parse_intents(&raw)
}

pub fn parse_intents(raw: &str) -> Result<Vec<Intent>, GatehouseError> {
    // An empty YAML document deserializes as unit, not as a map.
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: Option<IntentDocument> = serde_yaml::from_str(raw)?;
    let intents = doc.map(|d| d.active_intents).unwrap_or_default();
    validate_intents(&intents)?;
    Ok(intents)
}

/// Reject declarations that could never gate cleanly: blank or duplicate ids,
/// blank constraints.
pub fn validate_intents(intents: &[Intent]) -> Result<(), GatehouseError> {
    let mut seen = std::collections::HashSet::new();
    for (index, intent) in intents.iter().enumerate() {
        if intent.id.trim().is_empty() {
            return Err(GatehouseError::ValidationError(format!(
                "active_intents[{}] has an empty id",
                index
            )));
        }
        if !seen.insert(intent.id.as_str()) {
            return Err(GatehouseError::ValidationError(format!(
                "intent {} is declared more than once",
                intent.id
            )));
        }
        if intent.constraints.iter().any(|c| c.trim().is_empty()) {
            return Err(GatehouseError::ValidationError(format!(
                "intent {} has an empty constraint",
                intent.id
            )));
        }
    }
    Ok(())
}

/// Exact, case-sensitive lookup.
pub fn find_intent<'a>(intents: &'a [Intent], id: &str) -> Option<&'a Intent> {
    intents.iter().find(|i| i.id == id)
}

pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Render the canonical `<intent_context>` block consumed by the generation
/// backend. Output is a pure function of the intent.
pub fn render_intent_context(intent: &Intent) -> String {
    let constraints: String = intent
        .constraints
        .iter()
        .map(|c| format!("<constraint>{}</constraint>", escape_xml(c)))
        .collect();
    let scope: String = intent
        .owned_scope
        .iter()
        .map(|s| format!("<scope>{}</scope>", escape_xml(s)))
        .collect();
    format!(
        "<intent_context>\n  <id>{}</id>\n  <name>{}</name>\n  <status>{}</status>\n  <constraints>{}</constraints>\n  <owned_scope>{}</owned_scope>\n</intent_context>",
        escape_xml(&intent.id),
        escape_xml(&intent.name),
        escape_xml(&intent.status),
        constraints,
        scope
    )
}

/// Recover the intent id from a rendered `<intent_context>` block.
pub fn intent_id_from_context(context: &str) -> Option<String> {
    let start = context.find("<id>")? + "<id>".len();
    let len = context[start..].find("</id>")?;
    let id = unescape_xml(&context[start..start + len]);
    if id.is_empty() { None } else { Some(id) }
}
