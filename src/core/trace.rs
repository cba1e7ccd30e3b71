//! Trace ledger: append-only audit of actions taken against an intent.
//!
//! One JSON document per entry under the traces directory, named
//! `<intent_id>-<timestamp>-<seq>.json`. Entries are never read back or
//! rewritten by gatehouse.

use crate::core::error::GatehouseError;
use crate::core::store::Workspace;
use crate::core::time;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{LazyLock, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub intent_id: String,
    pub action: String,
    pub details: Value,
    pub timestamp: String,
    pub sequence: u64,
}

/// Patterns that detect secrets in string content.
static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"(A3T[A-Z0-9]|AKIA|AGPA|AIDA|AROA|AIPA|ANPA|ANVA|ASIA)[0-9A-Z]{16}",
            "[AWS_KEY_REDACTED]",
        ),
        (
            r"(ghp|gho|ghu|ghs|ghr)_[a-zA-Z0-9_]{36,255}",
            "[GITHUB_TOKEN_REDACTED]",
        ),
        (r"(?i)bearer\s+[a-zA-Z0-9_\-\.]{20,}", "[BEARER_REDACTED]"),
        (
            r"-----BEGIN (?:RSA |DSA |EC |OPENSSH )?PRIVATE KEY-----[\s\S]*?-----END (?:RSA |DSA |EC |OPENSSH )?PRIVATE KEY-----",
            "[PEM_KEY_REDACTED]",
        ),
        (
            r#"(?i)(postgres|mysql|mongodb|redis)://[^\s'"]+:[^\s'"]+@[^\s'"]+"#,
            "[CONNECTION_STRING_REDACTED]",
        ),
        (
            r#"(?i)(password|passwd|pwd)['"]?\s*[:=]\s*['"]?[^\s'"]{8,}['"]?"#,
            "[PASSWORD_REDACTED]",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

pub fn redact_string(input: &str) -> String {
    SECRET_PATTERNS
        .iter()
        .fold(input.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

/// Recursively redact trace details. Keys that name credentials are blanked
/// wholesale; string values are scanned for secret patterns.
pub fn redact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    let lower = key.to_lowercase();
                    let sensitive = ["token", "secret", "password", "api_key", "authorization"]
                        .iter()
                        .any(|needle| lower.contains(needle));
                    if sensitive {
                        (key, Value::String("[REDACTED]".to_string()))
                    } else {
                        (key, redact(val))
                    }
                })
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        Value::String(s) => Value::String(redact_string(&s)),
        other => other,
    }
}

/// Intent ids become part of a filename, so separators and traversal are refused.
fn validate_intent_id(intent_id: &str) -> Result<(), GatehouseError> {
    if intent_id.trim().is_empty() {
        return Err(GatehouseError::MissingArgument {
            tool: "record_intent_trace",
            argument: "intent_id",
        });
    }
    if intent_id.contains(['/', '\\']) || intent_id.contains("..") {
        return Err(GatehouseError::InvalidArgument(format!(
            "intent id '{}' is not filesystem-safe",
            intent_id
        )));
    }
    Ok(())
}

/// Writer side of the audit trail. Holds the per-intent sequence counters.
#[derive(Debug, Default)]
pub struct TraceLedger {
    sequences: Mutex<HashMap<String, u64>>,
}

impl TraceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self, intent_id: &str) -> u64 {
        let mut guard = match self.sequences.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let seq = guard.entry(intent_id.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Append one entry and return the path it was written to.
    pub fn record(
        &self,
        ws: &Workspace,
        intent_id: &str,
        action: &str,
        details: Value,
    ) -> Result<PathBuf, GatehouseError> {
        validate_intent_id(intent_id)?;

        let dir = ws.traces_dir();
        std::fs::create_dir_all(&dir)?;

        let details = if ws.config.trace.redact_secrets {
            redact(details)
        } else {
            details
        };
        let timestamp = time::now_iso();
        let stamp = time::file_stamp(&timestamp);

        // Create-new so a clash with another writer bumps the sequence instead
        // of overwriting an existing entry.
        loop {
            let sequence = self.next_sequence(intent_id);
            let path = dir.join(format!("{}-{}-{:06}.json", intent_id, stamp, sequence));
            let file = OpenOptions::new().write(true).create_new(true).open(&path);
            let mut file = match file {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(GatehouseError::IoError(e)),
            };

            let entry = TraceEntry {
                intent_id: intent_id.to_string(),
                action: action.to_string(),
                details,
                timestamp,
                sequence,
            };
            let json = serde_json::to_string_pretty(&entry)?;
            file.write_all(json.as_bytes())?;
            tracing::debug!(intent = %intent_id, action = %action, path = %path.display(), "trace recorded");
            return Ok(path);
        }
    }
}
