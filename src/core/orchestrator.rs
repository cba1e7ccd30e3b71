//! The orchestrator owns everything one agent session needs: the tool
//! registry, the pre-dispatch hook chain, the trace ledger and the workspace.
//! There is no process-wide state; two orchestrators over two workspaces do
//! not see each other.

use crate::core::dispatch::{self, ModelClient};
use crate::core::error::GatehouseError;
use crate::core::gatekeeper::{Blocked, HookChain, IntentGate, PreDispatchHook, RequestPayload};
use crate::core::hooks::{PostApplyHook, PostApplyHooks};
use crate::core::registry::{ToolContext, ToolRegistration, ToolRegistry, ToolResult};
use crate::core::store::Workspace;
use crate::core::trace::TraceLedger;
use crate::plugins;
use serde_json::Value;
use std::sync::Arc;

pub struct Orchestrator {
    registry: ToolRegistry,
    hooks: HookChain,
    ledger: Arc<TraceLedger>,
    ctx: ToolContext,
}

impl Orchestrator {
    /// Built-in tools registered and the intent gate installed first in the chain.
    pub fn new(workspace: Workspace) -> Result<Self, GatehouseError> {
        let gate = IntentGate::new(&workspace.config.gate.intent_prefix)
            .map_err(|e| GatehouseError::ValidationError(format!("intent prefix: {}", e)))?;

        let mut orchestrator = Self::bare(workspace);
        plugins::register_builtin_tools(&mut orchestrator.registry, Arc::clone(&orchestrator.ledger))?;
        orchestrator.hooks.push(Arc::new(gate));
        tracing::debug!(
            root = %orchestrator.ctx.workspace.root.display(),
            tools = orchestrator.registry.list().len(),
            "orchestrator ready"
        );
        Ok(orchestrator)
    }

    /// No tools, no hooks. Hosts assemble their own surface.
    pub fn bare(workspace: Workspace) -> Self {
        Self {
            registry: ToolRegistry::new(),
            hooks: HookChain::new(),
            ledger: Arc::new(TraceLedger::new()),
            ctx: ToolContext::new(workspace),
        }
    }

    pub fn register(&mut self, registration: ToolRegistration) -> Result<(), GatehouseError> {
        self.registry.register(registration)
    }

    /// Appended after the hooks already installed.
    pub fn register_hook(&mut self, hook: Arc<dyn PreDispatchHook>) {
        self.hooks.push(hook);
    }

    /// Run after `approve_patch` / `apply_patch` commit, in registration order.
    pub fn register_post_apply_hook(&mut self, hook: Arc<dyn PostApplyHook>) {
        self.ctx.post_apply.push(hook);
    }

    pub fn invoke(&self, name: &str, args: Option<Value>) -> ToolResult {
        self.registry.invoke(name, args, &self.ctx)
    }

    pub fn list_tools(&self) -> Vec<String> {
        self.registry.list()
    }

    pub fn run_gate(&self, payload: &mut RequestPayload) -> Result<(), Blocked> {
        self.hooks.run(payload, &self.ctx)
    }

    pub fn prepare_payload(&self, payload: &mut RequestPayload) -> Result<(), GatehouseError> {
        dispatch::prepare_payload(&self.hooks, payload, &self.ctx)
    }

    pub fn send_to_model(
        &self,
        client: &dyn ModelClient,
        payload: &mut RequestPayload,
    ) -> Result<Value, GatehouseError> {
        dispatch::send_to_model(&self.hooks, &self.ledger, &self.ctx, client, payload)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.ctx.workspace
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    pub fn post_apply_hooks(&self) -> &PostApplyHooks {
        &self.ctx.post_apply
    }

    pub fn ledger(&self) -> &TraceLedger {
        &self.ledger
    }
}
