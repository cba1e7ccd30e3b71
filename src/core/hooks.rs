//! Post-apply hooks: run after a batch of edits has landed in the workspace.
//!
//! They observe, they do not veto. The batch is already committed when they
//! run, so a failing hook is logged and reported back to the caller but
//! never rolls anything back.

use crate::core::store::Workspace;
use std::sync::Arc;

/// What was just written, and on whose authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedBatch<'a> {
    /// Tool that committed the batch (`approve_patch` or `apply_patch`).
    pub tool: &'a str,
    pub intent_id: Option<&'a str>,
    /// Workspace-relative targets, in write order.
    pub targets: &'a [String],
}

pub trait PostApplyHook: Send + Sync {
    fn name(&self) -> &str;

    fn after_apply(&self, batch: &AppliedBatch<'_>, ws: &Workspace) -> anyhow::Result<()>;
}

/// One hook failure from a post-apply pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    pub hook: String,
    pub error: String,
}

#[derive(Default, Clone)]
pub struct PostApplyHooks {
    hooks: Vec<Arc<dyn PostApplyHook>>,
}

impl std::fmt::Debug for PostApplyHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}

impl PostApplyHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Arc<dyn PostApplyHook>) {
        self.hooks.push(hook);
    }

    pub fn names(&self) -> Vec<String> {
        self.hooks.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Every hook runs, in registration order, whatever the others return.
    pub fn run(&self, batch: &AppliedBatch<'_>, ws: &Workspace) -> Vec<HookFailure> {
        let mut failures = Vec::new();
        for hook in &self.hooks {
            if let Err(err) = hook.after_apply(batch, ws) {
                tracing::warn!(hook = %hook.name(), tool = %batch.tool, error = %err, "post-apply hook failed");
                failures.push(HookFailure {
                    hook: hook.name().to_string(),
                    error: err.to_string(),
                });
            }
        }
        failures
    }
}
