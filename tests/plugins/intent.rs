use gatehouse::core::gatekeeper::{RequestPayload, SELECT_INTENT_TOOL};
use gatehouse::core::orchestrator::Orchestrator;
use gatehouse::core::store::Workspace;
use gatehouse::plugins::intent::select_active_intent;
use serde_json::json;
use std::fs;
use tempfile::tempdir;

fn workspace_with_intents(yaml: &str) -> (tempfile::TempDir, Orchestrator) {
    let tmp = tempdir().expect("tempdir");
    fs::create_dir_all(tmp.path().join(".orchestration")).unwrap();
    fs::write(tmp.path().join(".orchestration/active_intents.yaml"), yaml).unwrap();
    let orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();
    (tmp, orch)
}

const ONE_INTENT: &str = "\
active_intents:
  - id: INT-001
    name: Pure foo
    status: IN_PROGRESS
    constraints: [c1]
    owned_scope: [s1]
";

#[test]
fn test_select_returns_rendered_context() {
    let (_tmp, orch) = workspace_with_intents(ONE_INTENT);

    let result = orch.invoke(SELECT_INTENT_TOOL, Some(json!({"intent_id": "INT-001"})));
    let xml = result.value().and_then(|v| v.as_str()).expect("xml string");

    assert!(xml.starts_with("<intent_context>"));
    assert!(xml.ends_with("</intent_context>"));
    assert!(xml.contains("<id>INT-001</id>"));
    assert!(xml.contains("<name>Pure foo</name>"));
    assert!(xml.contains("<status>IN_PROGRESS</status>"));
    assert!(xml.contains("<constraints><constraint>c1</constraint></constraints>"));
    assert!(xml.contains("<owned_scope><scope>s1</scope></owned_scope>"));
}

#[test]
fn test_select_accepts_camel_case_argument() {
    let (_tmp, orch) = workspace_with_intents(ONE_INTENT);
    let result = orch.invoke(SELECT_INTENT_TOOL, Some(json!({"intentId": "INT-001"})));
    assert!(result.is_success());
}

#[test]
fn test_select_is_idempotent() {
    let (_tmp, orch) = workspace_with_intents(ONE_INTENT);
    let args = json!({"intent_id": "INT-001"});
    let first = orch.invoke(SELECT_INTENT_TOOL, Some(args.clone()));
    let second = orch.invoke(SELECT_INTENT_TOOL, Some(args));
    assert_eq!(first, second);
}

#[test]
fn test_select_unknown_intent_names_id_and_source() {
    let (_tmp, orch) = workspace_with_intents(ONE_INTENT);
    let result = orch.invoke(SELECT_INTENT_TOOL, Some(json!({"intent_id": "INT-999"})));
    let error = result.error().expect("failure");
    assert!(error.contains("INT-999"));
    assert!(error.contains("active_intents.yaml"));
}

#[test]
fn test_select_is_case_sensitive() {
    let (_tmp, orch) = workspace_with_intents(ONE_INTENT);
    let result = orch.invoke(SELECT_INTENT_TOOL, Some(json!({"intent_id": "int-001"})));
    assert!(!result.is_success());
}

#[test]
fn test_select_missing_argument() {
    let (_tmp, orch) = workspace_with_intents(ONE_INTENT);
    for args in [None, Some(json!({})), Some(json!({"intent_id": "  "}))] {
        let result = orch.invoke(SELECT_INTENT_TOOL, args);
        assert_eq!(
            result.error(),
            Some("MissingArgument: select_active_intent requires intent_id")
        );
    }
}

#[test]
fn test_select_without_intents_file_is_invalid_intent() {
    let tmp = tempdir().unwrap();
    let ws = Workspace::new(tmp.path());
    let err = select_active_intent(&ws, "INT-001").unwrap_err();
    assert!(err.to_string().contains("INT-001"));
}

#[test]
fn test_select_escapes_markup_in_values() {
    let (_tmp, orch) = workspace_with_intents(
        "active_intents:\n  - id: INT-002\n    name: \"a <b> & c\"\n    constraints: [\"x < y\"]\n",
    );
    let result = orch.invoke(SELECT_INTENT_TOOL, Some(json!({"intent_id": "INT-002"})));
    let xml = result.value().and_then(|v| v.as_str()).unwrap().to_string();
    assert!(xml.contains("<name>a &lt;b&gt; &amp; c</name>"));
    assert!(xml.contains("<constraint>x &lt; y</constraint>"));
}

#[test]
fn test_selection_result_satisfies_gate() {
    let (_tmp, orch) = workspace_with_intents(ONE_INTENT);
    let result = orch.invoke(SELECT_INTENT_TOOL, Some(json!({"intent_id": "INT-001"})));

    let mut payload = RequestPayload::new("write the code");
    assert!(orch.run_gate(&mut payload).is_err());

    payload.record_tool_result(SELECT_INTENT_TOOL, result.clone());
    orch.run_gate(&mut payload).expect("gated after selection");
    assert_eq!(
        payload.intent_context.as_deref(),
        result.value().and_then(|v| v.as_str())
    );
}

#[test]
fn test_select_rejects_invalid_declarations() {
    let (_tmp, orch) = workspace_with_intents(
        "active_intents:\n  - id: INT-001\n    constraints: [c1, \"\"]\n",
    );
    let result = orch.invoke(SELECT_INTENT_TOOL, Some(json!({"intent_id": "INT-001"})));
    let error = result.error().expect("failure");
    assert!(error.contains("INT-001 has an empty constraint"), "{}", error);

    let mut payload = RequestPayload::new("INT-001");
    let blocked = orch.run_gate(&mut payload).unwrap_err();
    assert!(blocked.reason.to_string().contains("failed validation"));
}

#[test]
fn test_select_rejects_blank_intent_id_declaration() {
    let (_tmp, orch) = workspace_with_intents("active_intents:\n  - id: \"\"\n    name: nameless\n");
    let result = orch.invoke(SELECT_INTENT_TOOL, Some(json!({"intent_id": "INT-001"})));
    assert!(result.error().unwrap().contains("empty id"));
}
