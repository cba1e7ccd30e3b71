use gatehouse::core::error::GatehouseError;
use gatehouse::core::hooks::{AppliedBatch, PostApplyHook};
use gatehouse::core::orchestrator::Orchestrator;
use gatehouse::core::store::Workspace;
use gatehouse::plugins::patch::{self, StagedEdit};
use serde_json::{Value, json};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn staged_files(result: &gatehouse::core::registry::ToolResult) -> Vec<String> {
    serde_json::from_value(result.value().expect("success")["stagedFiles"].clone())
        .expect("stagedFiles")
}

fn edit(path: &str, content: &str) -> StagedEdit {
    StagedEdit {
        path: path.to_string(),
        content: content.to_string(),
    }
}

#[test]
fn test_stage_then_approve_round_trip() {
    let tmp = tempdir().unwrap();
    let orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();

    let staged = orch.invoke(
        "stage_patch",
        Some(json!({"patch": [{"path": "a/b.txt", "content": "X"}], "description": "add b"})),
    );
    let files = staged_files(&staged);
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("a_b.txt"));
    assert!(!tmp.path().join("a/b.txt").exists());

    let approved = orch.invoke("approve_patch", Some(json!({"stagedFiles": files})));
    assert_eq!(approved.value().unwrap()["applied"], json!(["a/b.txt"]));
    assert_eq!(fs::read_to_string(tmp.path().join("a/b.txt")).unwrap(), "X");

    // Approved files leave the staging area.
    assert_eq!(
        orch.invoke("list_staged_changes", None).value(),
        Some(&json!([]))
    );
}

#[test]
fn test_stage_accepts_json_string_patch() {
    let tmp = tempdir().unwrap();
    let orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();

    let raw = r#"[{"path":"README.md","content":"hi\n"}]"#;
    let staged = orch.invoke("stage_patch", Some(json!({ "patch": raw })));
    assert_eq!(staged_files(&staged).len(), 1);
}

#[test]
fn test_stage_rejects_unsupported_patch_shapes() {
    let tmp = tempdir().unwrap();
    let orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();

    let result = orch.invoke("stage_patch", Some(json!({"patch": {"path": "a"}})));
    assert!(result.error().unwrap().starts_with("UnsupportedFormat"));

    let result = orch.invoke("stage_patch", Some(json!({"patch": "not json"})));
    assert!(result.error().unwrap().starts_with("UnsupportedFormat"));

    let result = orch.invoke("stage_patch", Some(json!({})));
    assert_eq!(
        result.error(),
        Some("MissingArgument: stage_patch requires patch")
    );
}

#[test]
fn test_stage_rejects_escaping_paths() {
    let tmp = tempdir().unwrap();
    let ws = Workspace::new(tmp.path());

    for path in ["../outside.txt", "/etc/passwd", ""] {
        let err = patch::stage(&ws, &[edit("ok.txt", "fine"), edit(path, "bad")], "").unwrap_err();
        assert!(
            matches!(
                err,
                GatehouseError::PathEscapesWorkspace(_) | GatehouseError::InvalidArgument(_)
            ),
            "{} => {}",
            path,
            err
        );
    }
    // Validation happens before anything is written.
    assert!(patch::list(&ws).unwrap().is_empty());
}

#[test]
fn test_flattened_name_collisions_keep_both_targets() {
    let tmp = tempdir().unwrap();
    let ws = Workspace::new(tmp.path());

    let staged = patch::stage(&ws, &[edit("a/b.txt", "slash"), edit("a_b.txt", "under")], "").unwrap();
    assert_ne!(staged[0].staged_name, staged[1].staged_name);

    let refs: Vec<String> = staged
        .iter()
        .map(|s| s.staged_path.to_string_lossy().to_string())
        .collect();
    let applied = patch::approve(&ws, &refs).unwrap();
    assert_eq!(applied, vec!["a/b.txt", "a_b.txt"]);
    assert_eq!(fs::read_to_string(tmp.path().join("a/b.txt")).unwrap(), "slash");
    assert_eq!(fs::read_to_string(tmp.path().join("a_b.txt")).unwrap(), "under");
}

#[test]
fn test_diff_reports_line_membership() {
    let tmp = tempdir().unwrap();
    let orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();
    fs::write(tmp.path().join("notes.txt"), "keep\nold\n").unwrap();

    let staged = orch.invoke(
        "stage_patch",
        Some(json!({"patch": [{"path": "notes.txt", "content": "keep\nnew\n"}]})),
    );
    let file = staged_files(&staged).remove(0);

    let result = orch.invoke("diff_staged_change", Some(json!({"stagedFile": file})));
    let value = result.value().unwrap();
    assert_eq!(value["diff"]["added"], json!(["new"]));
    assert_eq!(value["diff"]["removed"], json!(["old"]));
    assert_eq!(value["targetPath"], "notes.txt");
}

#[test]
fn test_diff_against_missing_target_is_all_added() {
    let tmp = tempdir().unwrap();
    let ws = Workspace::new(tmp.path());
    let staged = patch::stage(&ws, &[edit("src/new.rs", "fn a() {}\nfn b() {}\n")], "").unwrap();

    let diff = patch::diff(&ws, &staged[0].staged_name).unwrap();
    assert_eq!(diff.added, vec!["fn a() {}", "fn b() {}"]);
    assert!(diff.removed.is_empty());
}

#[test]
fn test_diff_requires_staged_file() {
    let tmp = tempdir().unwrap();
    let orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();
    let result = orch.invoke("diff_staged_change", None);
    assert_eq!(
        result.error(),
        Some("MissingArgument: diff_staged_change requires stagedFile")
    );
}

#[test]
fn test_list_staged_changes_is_sorted() {
    let tmp = tempdir().unwrap();
    let orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();
    assert_eq!(orch.invoke("list_staged_changes", None).value(), Some(&json!([])));

    orch.invoke(
        "stage_patch",
        Some(json!({"patch": [
            {"path": "z.txt", "content": "z"},
            {"path": "a.txt", "content": "a"}
        ]})),
    );
    let listed: Vec<String> =
        serde_json::from_value(orch.invoke("list_staged_changes", None).value().unwrap().clone())
            .unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].ends_with("a.txt"));
    assert!(listed[1].ends_with("z.txt"));
}

#[test]
fn test_approve_rejects_empty_input() {
    let tmp = tempdir().unwrap();
    let orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();
    for args in [None, Some(json!({"stagedFiles": []}))] {
        let result = orch.invoke("approve_patch", args);
        assert!(result.error().unwrap().starts_with("EmptyInput"));
    }
}

#[test]
fn test_approve_missing_staged_file_writes_nothing() {
    let tmp = tempdir().unwrap();
    let ws = Workspace::new(tmp.path());
    let staged = patch::stage(
        &ws,
        &[edit("one.txt", "1"), edit("two.txt", "2"), edit("three.txt", "3")],
        "",
    )
    .unwrap();
    fs::remove_file(&staged[1].staged_path).unwrap();

    let refs: Vec<String> = staged.iter().map(|s| s.staged_name.clone()).collect();
    let err = patch::approve(&ws, &refs).unwrap_err();
    match err {
        GatehouseError::ApprovalRolledBack { staged, .. } => assert_eq!(staged, "two.txt"),
        other => panic!("unexpected error: {}", other),
    }
    for name in ["one.txt", "two.txt", "three.txt"] {
        assert!(!tmp.path().join(name).exists(), "{} was written", name);
    }
    // Surviving staged files stay reviewable.
    assert!(staged[0].staged_path.exists());
    assert!(staged[2].staged_path.exists());
}

#[test]
fn test_approve_rename_failure_restores_earlier_targets() {
    let tmp = tempdir().unwrap();
    let ws = Workspace::new(tmp.path());
    fs::write(tmp.path().join("first.txt"), "original").unwrap();
    fs::create_dir_all(tmp.path().join("blocker/inner")).unwrap();

    let staged = patch::stage(
        &ws,
        &[
            edit("first.txt", "replaced"),
            edit("blocker", "cannot land on a directory"),
            edit("third.txt", "3"),
        ],
        "",
    )
    .unwrap();
    let refs: Vec<String> = staged.iter().map(|s| s.staged_name.clone()).collect();

    let err = patch::approve(&ws, &refs).unwrap_err();
    assert!(matches!(err, GatehouseError::ApprovalRolledBack { .. }));
    assert_eq!(fs::read_to_string(tmp.path().join("first.txt")).unwrap(), "original");
    assert!(tmp.path().join("blocker/inner").is_dir());
    assert!(!tmp.path().join("third.txt").exists());

    // No temp files left behind.
    let leftovers: Vec<_> = fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_restaging_same_target_replaces_content() {
    let tmp = tempdir().unwrap();
    let ws = Workspace::new(tmp.path());
    let first = patch::stage(&ws, &[edit("x.txt", "v1")], "").unwrap();
    let second = patch::stage(&ws, &[edit("x.txt", "v2")], "").unwrap();
    assert_eq!(first[0].staged_name, second[0].staged_name);

    patch::approve(&ws, &[second[0].staged_name.clone()]).unwrap();
    assert_eq!(fs::read_to_string(tmp.path().join("x.txt")).unwrap(), "v2");
}

#[test]
fn test_apply_patch_writes_directly() {
    let tmp = tempdir().unwrap();
    let orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();

    let result = orch.invoke(
        "apply_patch",
        Some(json!({"patch": [{"path": "docs/x.md", "content": "# x\n"}], "description": "doc"})),
    );
    let value: &Value = result.value().unwrap();
    assert_eq!(value["applied"], json!(["docs/x.md"]));
    assert_eq!(fs::read_to_string(tmp.path().join("docs/x.md")).unwrap(), "# x\n");
    assert_eq!(orch.invoke("list_staged_changes", None).value(), Some(&json!([])));
}

#[test]
fn test_manifest_records_original_targets() {
    let tmp = tempdir().unwrap();
    let ws = Workspace::new(tmp.path());
    patch::stage(&ws, &[edit("src/my_mod/lib.rs", "x")], "refactor").unwrap();

    let manifest = patch::load_manifest(&ws).unwrap();
    let entry = manifest.entries.get("src_my_mod_lib.rs").expect("entry");
    assert_eq!(entry.target, "src/my_mod/lib.rs");
    assert_eq!(entry.description, "refactor");

    // Manifest lookup beats the lossy reverse mapping.
    let diff = patch::diff(&ws, "src_my_mod_lib.rs").unwrap();
    assert_eq!(diff.target_path, "src/my_mod/lib.rs");
}

#[test]
fn test_restaging_a_hash_suffixed_target_keeps_newest_content() {
    let tmp = tempdir().unwrap();
    let orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();
    let ws = orch.workspace();

    let slash = patch::stage(ws, &[edit("a/b.txt", "slash")], "").unwrap();
    let under = patch::stage(ws, &[edit("a_b.txt", "OLD")], "").unwrap();
    assert_ne!(slash[0].staged_name, under[0].staged_name);

    // Frees the plain flattened name.
    patch::approve(ws, &[slash[0].staged_name.clone()]).unwrap();

    let restaged = patch::stage(ws, &[edit("a_b.txt", "NEW")], "").unwrap();
    assert_eq!(restaged[0].staged_name, under[0].staged_name);

    let listed: Vec<String> =
        serde_json::from_value(orch.invoke("list_staged_changes", None).value().unwrap().clone())
            .unwrap();
    assert_eq!(listed.len(), 1);

    let approved = orch.invoke("approve_patch", Some(json!({ "stagedFiles": listed })));
    assert!(approved.is_success());
    assert_eq!(fs::read_to_string(tmp.path().join("a_b.txt")).unwrap(), "NEW");
}

#[test]
fn test_paths_without_a_file_name_are_rejected() {
    let tmp = tempdir().unwrap();
    let ws = Workspace::new(tmp.path().join("ws"));
    fs::create_dir_all(&ws.root).unwrap();

    for path in [".", "sub/.", "sub/"] {
        let err = patch::apply_direct(&ws, &[edit(path, "x")]).unwrap_err();
        assert!(
            matches!(err, GatehouseError::InvalidArgument(_)),
            "{} => {}",
            path,
            err
        );
    }
    // Nothing was written beside the workspace root.
    let siblings: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
    assert_eq!(siblings.len(), 1);
}

#[test]
fn test_rollback_removes_directories_it_created() {
    let tmp = tempdir().unwrap();
    let ws = Workspace::new(tmp.path());
    fs::create_dir_all(tmp.path().join("blocker/inner")).unwrap();

    let staged = patch::stage(
        &ws,
        &[
            edit("fresh/deep/one.txt", "1"),
            edit("blocker", "cannot land on a directory"),
            edit("other/two.txt", "2"),
        ],
        "",
    )
    .unwrap();
    let refs: Vec<String> = staged.iter().map(|s| s.staged_name.clone()).collect();

    assert!(patch::approve(&ws, &refs).is_err());
    assert!(!tmp.path().join("fresh").exists());
    assert!(!tmp.path().join("other").exists());
    assert!(tmp.path().join("blocker/inner").is_dir());
}

struct RecordBatch {
    seen: Arc<Mutex<Vec<(String, Option<String>, Vec<String>)>>>,
}

impl PostApplyHook for RecordBatch {
    fn name(&self) -> &str {
        "record_batch"
    }

    fn after_apply(&self, batch: &AppliedBatch<'_>, ws: &Workspace) -> anyhow::Result<()> {
        // Targets are already on disk when the hook runs.
        for target in batch.targets {
            anyhow::ensure!(ws.root.join(target).is_file(), "{} missing", target);
        }
        self.seen.lock().unwrap().push((
            batch.tool.to_string(),
            batch.intent_id.map(str::to_string),
            batch.targets.to_vec(),
        ));
        Ok(())
    }
}

struct Refuse;

impl PostApplyHook for Refuse {
    fn name(&self) -> &str {
        "refuse"
    }

    fn after_apply(&self, _batch: &AppliedBatch<'_>, _ws: &Workspace) -> anyhow::Result<()> {
        anyhow::bail!("lint failed")
    }
}

#[test]
fn test_post_apply_hooks_run_after_approve_and_apply() {
    let tmp = tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();
    orch.register_post_apply_hook(Arc::new(RecordBatch {
        seen: Arc::clone(&seen),
    }));

    let staged = orch.invoke(
        "stage_patch",
        Some(json!({"patch": [{"path": "a.txt", "content": "A"}]})),
    );
    let approved = orch.invoke(
        "approve_patch",
        Some(json!({"stagedFiles": staged_files(&staged), "intent_id": "INT-001"})),
    );
    assert_eq!(approved.value().unwrap()["hookErrors"], json!([]));

    orch.invoke(
        "apply_patch",
        Some(json!({"patch": [{"path": "b.txt", "content": "B"}]})),
    );

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (
                "approve_patch".to_string(),
                Some("INT-001".to_string()),
                vec!["a.txt".to_string()]
            ),
            ("apply_patch".to_string(), None, vec!["b.txt".to_string()]),
        ]
    );
}

#[test]
fn test_post_apply_failure_is_reported_not_rolled_back() {
    let tmp = tempdir().unwrap();
    let mut orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();
    orch.register_post_apply_hook(Arc::new(Refuse));

    let result = orch.invoke(
        "apply_patch",
        Some(json!({"patch": [{"path": "c.txt", "content": "C"}]})),
    );
    assert!(result.is_success());
    assert_eq!(
        result.value().unwrap()["hookErrors"],
        json!([{ "hook": "refuse", "error": "lint failed" }])
    );
    assert_eq!(fs::read_to_string(tmp.path().join("c.txt")).unwrap(), "C");
}

#[test]
fn test_failed_approval_skips_post_apply_hooks() {
    let tmp = tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut orch = Orchestrator::new(Workspace::new(tmp.path())).unwrap();
    orch.register_post_apply_hook(Arc::new(RecordBatch {
        seen: Arc::clone(&seen),
    }));

    let result = orch.invoke("approve_patch", Some(json!({"stagedFiles": ["missing.txt"]})));
    assert!(!result.is_success());
    assert!(seen.lock().unwrap().is_empty());
}
