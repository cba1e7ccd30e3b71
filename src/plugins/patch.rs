//! Patch lifecycle: stage → diff → approve, plus direct apply.
//!
//! Staged edits live in the staging area under a flattened filename
//! (`src/foo.rs` → `src_foo.rs`). The flattening is lossy, so the original
//! target of every staged file is recorded in the staging manifest and all
//! lookups go through it. Approval writes a batch all-or-none: every target
//! is prepared as a temp file first, then renamed into place, and any failure
//! rolls the batch back.

use crate::core::error::GatehouseError;
use crate::core::hooks::AppliedBatch;
use crate::core::registry::{ToolContext, ToolHandler, ToolRegistration};
use crate::core::store::Workspace;
use crate::core::time;
use crate::core::trace::TraceLedger;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const STAGE_TOOL: &str = "stage_patch";
pub const DIFF_TOOL: &str = "diff_staged_change";
pub const APPROVE_TOOL: &str = "approve_patch";
pub const LIST_TOOL: &str = "list_staged_changes";
pub const APPLY_TOOL: &str = "apply_patch";

const FILLER: char = '_';

/// One file edit as authored by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEdit {
    #[serde(alias = "targetPath")]
    pub path: String,
    pub content: String,
}

/// An edit persisted in the staging area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedFile {
    pub staged_name: String,
    pub staged_path: PathBuf,
    pub target_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub target: String,
    #[serde(default)]
    pub description: String,
    pub staged_at: String,
}

/// Staged name → original target path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingManifest {
    #[serde(default)]
    pub entries: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub staged_file: PathBuf,
    pub target_path: String,
}

pub fn flatten_path(path: &str) -> String {
    path.replace(['/', '\\'], &FILLER.to_string())
}

/// Heuristic inverse of [`flatten_path`]; only used for staged files that
/// are missing from the manifest.
pub fn unflatten_name(name: &str) -> String {
    name.replace(FILLER, "/")
}

pub fn load_manifest(ws: &Workspace) -> Result<StagingManifest, GatehouseError> {
    let path = ws.manifest_file();
    if !path.exists() {
        return Ok(StagingManifest::default());
    }
    let raw = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn save_manifest(ws: &Workspace, manifest: &StagingManifest) -> Result<(), GatehouseError> {
    let path = ws.manifest_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(manifest)?)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

/// Accept either an array of edits or a JSON string encoding one.
pub fn parse_patch(patch: &Value) -> Result<Vec<StagedEdit>, GatehouseError> {
    match patch {
        Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
            GatehouseError::UnsupportedFormat(format!(
                "patch string is not a JSON array of {{path, content}} edits: {}",
                e
            ))
        }),
        Value::Array(_) => serde_json::from_value(patch.clone()).map_err(|e| {
            GatehouseError::UnsupportedFormat(format!("malformed edit in patch: {}", e))
        }),
        other => Err(GatehouseError::UnsupportedFormat(format!(
            "patch must be an array or JSON string, got {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn short_hash(input: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..8].to_string()
}

/// Staged name for `target`. A target that is already staged keeps its
/// existing name, so restaging replaces the pending content. Otherwise falls
/// back to a hashed suffix when the flattened name belongs to another target.
fn choose_staged_name(ws: &Workspace, manifest: &StagingManifest, target: &str) -> String {
    if let Some((name, _)) = manifest.entries.iter().find(|(_, e)| e.target == target) {
        return name.clone();
    }
    let flat = flatten_path(target);
    let owner = match manifest.entries.get(&flat) {
        Some(entry) => Some(entry.target.clone()),
        None if ws.staging_dir().join(&flat).exists() => Some(unflatten_name(&flat)),
        None => None,
    };
    match owner {
        Some(existing) if existing != target => {
            let name = format!("{}~{}", flat, short_hash(target));
            tracing::debug!(target_path = %target, staged = %name, "flattened name collision");
            name
        }
        _ => flat,
    }
}

/// Write edits into the staging area. No workspace target is touched.
pub fn stage(
    ws: &Workspace,
    edits: &[StagedEdit],
    description: &str,
) -> Result<Vec<StagedFile>, GatehouseError> {
    for edit in edits {
        ws.resolve_relative(&edit.path)?;
    }

    let staging_dir = ws.staging_dir();
    fs::create_dir_all(&staging_dir)?;
    let mut manifest = load_manifest(ws)?;
    let staged_at = time::now_iso();

    let mut staged = Vec::with_capacity(edits.len());
    for edit in edits {
        let name = choose_staged_name(ws, &manifest, &edit.path);
        let staged_path = staging_dir.join(&name);
        fs::write(&staged_path, &edit.content)?;
        manifest.entries.insert(
            name.clone(),
            ManifestEntry {
                target: edit.path.clone(),
                description: description.to_string(),
                staged_at: staged_at.clone(),
            },
        );
        staged.push(StagedFile {
            staged_name: name,
            staged_path,
            target_path: edit.path.clone(),
        });
    }

    save_manifest(ws, &manifest)?;
    tracing::info!(count = staged.len(), "staged edits");
    Ok(staged)
}

/// Resolve a staged-file reference (a staged path or bare staged name).
pub fn resolve_staged(
    ws: &Workspace,
    manifest: &StagingManifest,
    reference: &str,
) -> Result<StagedFile, GatehouseError> {
    let name = Path::new(reference)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            GatehouseError::InvalidArgument(format!("'{}' is not a staged file reference", reference))
        })?
        .to_string();

    let target_path = match manifest.entries.get(&name) {
        Some(entry) => entry.target.clone(),
        None => {
            let guess = unflatten_name(&name);
            tracing::warn!(staged = %name, target_path = %guess, "staged file missing from manifest; reversing flattened name");
            guess
        }
    };

    Ok(StagedFile {
        staged_path: ws.staging_dir().join(&name),
        staged_name: name,
        target_path,
    })
}

fn read_or_empty(path: &Path) -> Result<String, GatehouseError> {
    if path.exists() {
        Ok(fs::read_to_string(path)?)
    } else {
        Ok(String::new())
    }
}

/// Line-membership diff. Order follows the source text; duplicates collapse.
pub fn line_membership_diff(staged: &str, current: &str) -> (Vec<String>, Vec<String>) {
    fn missing_from(source: &str, other: &str) -> Vec<String> {
        let other: HashSet<&str> = other.lines().collect();
        let mut seen = HashSet::new();
        source
            .lines()
            .filter(|line| !other.contains(line) && seen.insert(*line))
            .map(str::to_string)
            .collect()
    }
    (missing_from(staged, current), missing_from(current, staged))
}

pub fn diff(ws: &Workspace, reference: &str) -> Result<StagedDiff, GatehouseError> {
    let manifest = load_manifest(ws)?;
    let staged = resolve_staged(ws, &manifest, reference)?;
    let target = ws.resolve_relative(&staged.target_path)?;

    let staged_content = read_or_empty(&staged.staged_path)?;
    let current_content = read_or_empty(&target)?;
    let (added, removed) = line_membership_diff(&staged_content, &current_content);

    Ok(StagedDiff {
        added,
        removed,
        staged_file: staged.staged_path,
        target_path: staged.target_path,
    })
}

struct PreparedWrite {
    target: PathBuf,
    temp: PathBuf,
    backup: Option<Vec<u8>>,
    /// Directories this write created, deepest first.
    created_dirs: Vec<PathBuf>,
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove file during rollback");
    }
}

fn create_missing_dirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let missing: Vec<PathBuf> = dir
        .ancestors()
        .take_while(|d| !d.exists())
        .map(Path::to_path_buf)
        .collect();
    fs::create_dir_all(dir)?;
    Ok(missing)
}

fn remove_created_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        if let Err(err) = fs::remove_dir(dir) {
            tracing::debug!(path = %dir.display(), error = %err, "left directory in place during rollback");
        }
    }
}

fn restore(prepared: &PreparedWrite) {
    let outcome = match &prepared.backup {
        Some(bytes) => fs::write(&prepared.target, bytes),
        None => fs::remove_file(&prepared.target),
    };
    if let Err(err) = outcome {
        tracing::warn!(path = %prepared.target.display(), error = %err, "failed to restore target during rollback");
    }
}

/// Undo a partially committed batch: restore `done` targets, drop `pending`
/// temp files, then remove directories the batch created.
fn rollback(done: &[PreparedWrite], pending: &[PreparedWrite]) {
    for p in done.iter().rev() {
        restore(p);
    }
    for p in pending {
        remove_quietly(&p.temp);
    }
    for p in done.iter().chain(pending).rev() {
        remove_created_dirs(&p.created_dirs);
    }
}

fn write_temp(target: &Path, temp: &Path, content: &[u8]) -> Result<Option<Vec<u8>>, GatehouseError> {
    let backup = if target.is_file() {
        Some(fs::read(target)?)
    } else {
        None
    };
    fs::write(temp, content)?;
    Ok(backup)
}

fn prepare_write(
    ws: &Workspace,
    target_rel: &str,
    content: &[u8],
) -> Result<PreparedWrite, GatehouseError> {
    let target = ws.resolve_relative(target_rel)?;
    let (Some(parent), Some(file_name)) = (target.parent(), target.file_name()) else {
        return Err(GatehouseError::InvalidArgument(format!(
            "'{}' does not name a file",
            target_rel
        )));
    };
    let created_dirs = create_missing_dirs(parent)?;
    let temp = parent.join(format!(
        ".{}.gatehouse-{}.tmp",
        file_name.to_string_lossy(),
        time::new_event_id()
    ));

    match write_temp(&target, &temp, content) {
        Ok(backup) => Ok(PreparedWrite {
            target,
            temp,
            backup,
            created_dirs,
        }),
        Err(err) => {
            remove_quietly(&temp);
            remove_created_dirs(&created_dirs);
            Err(err)
        }
    }
}

/// Write every `(target, content)` pair or none of them.
///
/// On failure returns the index of the write that failed.
fn commit_batch(
    ws: &Workspace,
    writes: &[(String, Vec<u8>)],
) -> Result<(), (usize, GatehouseError)> {
    let mut prepared: Vec<PreparedWrite> = Vec::with_capacity(writes.len());
    for (index, (target, content)) in writes.iter().enumerate() {
        match prepare_write(ws, target, content) {
            Ok(p) => prepared.push(p),
            Err(err) => {
                rollback(&[], &prepared);
                return Err((index, err));
            }
        }
    }

    for (index, p) in prepared.iter().enumerate() {
        if let Err(err) = fs::rename(&p.temp, &p.target) {
            rollback(&prepared[..index], &prepared[index..]);
            return Err((index, GatehouseError::IoError(err)));
        }
    }
    Ok(())
}

/// Copy staged files onto their targets as one all-or-none batch, then
/// retire them from the staging area. Returns applied targets in input order.
pub fn approve(ws: &Workspace, references: &[String]) -> Result<Vec<String>, GatehouseError> {
    if references.is_empty() {
        return Err(GatehouseError::EmptyInput(
            "approve_patch requires at least one staged file".to_string(),
        ));
    }

    let mut manifest = load_manifest(ws)?;
    let mut staged_files = Vec::with_capacity(references.len());
    let mut writes = Vec::with_capacity(references.len());
    for reference in references {
        let rolled_back = |reason: String| GatehouseError::ApprovalRolledBack {
            staged: reference.clone(),
            reason,
        };
        let staged = resolve_staged(ws, &manifest, reference).map_err(|e| rolled_back(e.to_string()))?;
        let content = fs::read(&staged.staged_path).map_err(|e| rolled_back(e.to_string()))?;
        writes.push((staged.target_path.clone(), content));
        staged_files.push(staged);
    }

    commit_batch(ws, &writes).map_err(|(index, err)| GatehouseError::ApprovalRolledBack {
        staged: references[index].clone(),
        reason: err.to_string(),
    })?;

    for staged in &staged_files {
        manifest.entries.remove(&staged.staged_name);
        remove_quietly(&staged.staged_path);
    }
    if let Err(err) = save_manifest(ws, &manifest) {
        tracing::warn!(error = %err, "approved batch applied but manifest could not be updated");
    }

    let applied: Vec<String> = staged_files.into_iter().map(|s| s.target_path).collect();
    tracing::info!(count = applied.len(), "approved staged edits");
    Ok(applied)
}

/// Enumerate the staging area (sorted). Missing area means nothing staged.
pub fn list(ws: &Workspace) -> Result<Vec<PathBuf>, GatehouseError> {
    let dir = ws.staging_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Write edits straight into the workspace, bypassing staging.
pub fn apply_direct(ws: &Workspace, edits: &[StagedEdit]) -> Result<Vec<String>, GatehouseError> {
    let writes: Vec<(String, Vec<u8>)> = edits
        .iter()
        .map(|e| (e.path.clone(), e.content.clone().into_bytes()))
        .collect();
    commit_batch(ws, &writes).map_err(|(_, err)| err)?;
    Ok(edits.iter().map(|e| e.path.clone()).collect())
}

// ===== Tool handlers =====

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: Value) -> Result<T, GatehouseError> {
    serde_json::from_value(args)
        .map_err(|e| GatehouseError::InvalidArgument(format!("{}: {}", tool, e)))
}

#[derive(Deserialize)]
struct PatchArgs {
    #[serde(default)]
    patch: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "intentId")]
    intent_id: Option<String>,
}

impl PatchArgs {
    fn edits(&self, tool: &'static str) -> Result<Vec<StagedEdit>, GatehouseError> {
        match &self.patch {
            None | Some(Value::Null) => Err(GatehouseError::MissingArgument {
                tool,
                argument: "patch",
            }),
            Some(patch) => parse_patch(patch),
        }
    }
}

fn stage_patch(args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
    let args: PatchArgs = parse_args(STAGE_TOOL, args)?;
    let edits = args.edits(STAGE_TOOL)?;
    let description = args.description.unwrap_or_default();
    let staged = stage(&ctx.workspace, &edits, &description)?;
    let staged_files: Vec<String> = staged
        .iter()
        .map(|s| s.staged_path.to_string_lossy().to_string())
        .collect();
    Ok(json!({
        "stagedFiles": staged_files,
        "description": description,
    }))
}

#[derive(Deserialize)]
struct DiffArgs {
    #[serde(default, rename = "stagedFile", alias = "staged_file")]
    staged_file: Option<String>,
}

fn diff_staged_change(args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
    let args: DiffArgs = parse_args(DIFF_TOOL, args)?;
    let reference = args
        .staged_file
        .filter(|s| !s.trim().is_empty())
        .ok_or(GatehouseError::MissingArgument {
            tool: DIFF_TOOL,
            argument: "stagedFile",
        })?;
    let result = diff(&ctx.workspace, &reference)?;
    Ok(json!({
        "diff": { "added": result.added, "removed": result.removed },
        "stagedFile": result.staged_file.to_string_lossy(),
        "targetPath": result.target_path,
    }))
}

#[derive(Deserialize)]
struct ApproveArgs {
    #[serde(default, rename = "stagedFiles", alias = "staged_files")]
    staged_files: Vec<String>,
    #[serde(default, alias = "intentId")]
    intent_id: Option<String>,
}

/// `approve_patch` also records an audit entry when an intent is cited.
pub struct ApprovePatchTool {
    ledger: Arc<TraceLedger>,
}

impl ToolHandler for ApprovePatchTool {
    fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let args: ApproveArgs = parse_args(APPROVE_TOOL, args)?;
        let applied = approve(&ctx.workspace, &args.staged_files)?;
        let intent_id = args.intent_id.as_deref().filter(|s| !s.trim().is_empty());

        if let Some(intent_id) = intent_id {
            let details = json!({ "applied": applied });
            if let Err(err) = self
                .ledger
                .record(&ctx.workspace, intent_id, APPROVE_TOOL, details)
            {
                tracing::warn!(intent = %intent_id, error = %err, "failed to record approval trace");
            }
        }

        let hook_errors = run_post_apply(ctx, APPROVE_TOOL, intent_id, &applied);

        Ok(json!({
            "applied": applied,
            "intentId": args.intent_id,
            "hookErrors": hook_errors,
        }))
    }
}

/// Post-apply hooks see the committed batch; their failures are reported, not fatal.
fn run_post_apply(
    ctx: &ToolContext,
    tool: &str,
    intent_id: Option<&str>,
    applied: &[String],
) -> Vec<Value> {
    let batch = AppliedBatch {
        tool,
        intent_id,
        targets: applied,
    };
    ctx.post_apply
        .run(&batch, &ctx.workspace)
        .into_iter()
        .map(|f| json!({ "hook": f.hook, "error": f.error }))
        .collect()
}

fn list_staged_changes(_args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
    let staged: Vec<String> = list(&ctx.workspace)?
        .into_iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    Ok(json!(staged))
}

fn apply_patch(args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
    let args: PatchArgs = parse_args(APPLY_TOOL, args)?;
    let edits = args.edits(APPLY_TOOL)?;
    let applied = apply_direct(&ctx.workspace, &edits)?;
    tracing::info!(count = applied.len(), "applied edits directly");
    let intent_id = args.intent_id.as_deref().filter(|s| !s.trim().is_empty());
    let hook_errors = run_post_apply(ctx, APPLY_TOOL, intent_id, &applied);
    Ok(json!({
        "applied": applied,
        "description": args.description.unwrap_or_default(),
        "hookErrors": hook_errors,
    }))
}

pub fn registrations(ledger: Arc<TraceLedger>) -> Vec<ToolRegistration> {
    vec![
        ToolRegistration::from_fn(
            STAGE_TOOL,
            "Stage a set of file edits ({path, content} array or JSON string) for review.",
            stage_patch,
        ),
        ToolRegistration::from_fn(
            DIFF_TOOL,
            "Show lines added and removed by a staged file relative to its target.",
            diff_staged_change,
        ),
        ToolRegistration::new(
            APPROVE_TOOL,
            "Apply staged files to the workspace as one all-or-none batch.",
            ApprovePatchTool { ledger },
        ),
        ToolRegistration::from_fn(
            LIST_TOOL,
            "List files currently in the staging area.",
            list_staged_changes,
        ),
        ToolRegistration::from_fn(
            APPLY_TOOL,
            "Apply file edits directly to the workspace without staging.",
            apply_patch,
        ),
    ]
}
