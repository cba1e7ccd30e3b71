//! Intent-first protocol preamble for the agent's system prompt.

pub const INTENT_PROTOCOL: &str = "\
You are an Intent-Driven Architect. You CANNOT write code immediately.
Your first action MUST be to analyze the user request and call the tool:
select_active_intent(intent_id: string)
The tool will return an <intent_context> XML block containing constraints and scope.
You must wait for the intent_context before generating code or staging a patch.
If you do not cite a valid active intent ID, the system will block your execution.";

/// Prefix the protocol to a host-supplied base prompt.
pub fn system_prompt(base: &str) -> String {
    if base.trim().is_empty() {
        INTENT_PROTOCOL.to_string()
    } else {
        format!("{}\n\n{}", INTENT_PROTOCOL, base)
    }
}
