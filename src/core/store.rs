//! Workspace handle for gatehouse's on-disk state.
//!
//! Everything gatehouse persists lives under the workspace root at the
//! locations named by [`LayoutConfig`]: the intent configuration (owned by the
//! operator, read-only here), the staging area, the staging manifest, and the
//! audit directory.

use crate::core::config::{self, GatehouseConfig, LayoutConfig, ORCHESTRATION_DIR};
use crate::core::error::GatehouseError;
use std::path::{Component, Path, PathBuf};

pub const WORKSPACE_ENV: &str = "GATEHOUSE_WORKSPACE";

#[derive(Debug, Clone)]
pub struct Workspace {
    /// Absolute (or caller-supplied) path to the workspace root
    pub root: PathBuf,
    pub config: GatehouseConfig,
}

impl Workspace {
    /// Workspace with default layout, without reading any config file.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: GatehouseConfig::default(),
        }
    }

    /// Workspace with layout and gate settings from `.orchestration/gatehouse.toml`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GatehouseError> {
        let root = root.into();
        let config = config::load_config(&root)?;
        Ok(Self { root, config })
    }

    pub fn with_config(root: impl Into<PathBuf>, config: GatehouseConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    fn layout(&self) -> &LayoutConfig {
        &self.config.layout
    }

    pub fn intents_file(&self) -> PathBuf {
        self.root.join(&self.layout().intents_file)
    }

    /// Intents file path as written in the layout, for error messages.
    pub fn intents_file_display(&self) -> &str {
        &self.layout().intents_file
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(&self.layout().staging_dir)
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.root.join(&self.layout().manifest_file)
    }

    pub fn traces_dir(&self) -> PathBuf {
        self.root.join(&self.layout().traces_dir)
    }

    /// Join a workspace-relative edit path onto the root.
    ///
    /// Absolute paths and any `..` component are rejected so that edits can
    /// never land outside the workspace.
    pub fn resolve_relative(&self, relative: &str) -> Result<PathBuf, GatehouseError> {
        let candidate = Path::new(relative);
        if relative.trim().is_empty() {
            return Err(GatehouseError::InvalidArgument(
                "edit path must not be empty".to_string(),
            ));
        }
        let escapes = candidate.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(GatehouseError::PathEscapesWorkspace(candidate.to_path_buf()));
        }
        // `Path::components` folds away `.` and trailing separators, so the
        // last segment is checked on the raw string.
        let last_segment = relative.rsplit(['/', '\\']).next().unwrap_or_default();
        let names_file = matches!(candidate.components().next_back(), Some(Component::Normal(_)));
        if !names_file || last_segment.is_empty() || last_segment == "." {
            return Err(GatehouseError::InvalidArgument(format!(
                "'{}' does not name a file inside the workspace",
                relative
            )));
        }
        Ok(self.root.join(candidate))
    }
}

/// Find the workspace root: explicit path, then `GATEHOUSE_WORKSPACE`, then the
/// first ancestor of `start_dir` holding an `.orchestration/` directory, then
/// `start_dir` itself.
pub fn discover_root(explicit: Option<PathBuf>, start_dir: &Path) -> PathBuf {
    if let Some(root) = explicit {
        return root;
    }
    if let Ok(root) = std::env::var(WORKSPACE_ENV)
        && !root.trim().is_empty()
    {
        return PathBuf::from(root);
    }
    find_orchestration_root(start_dir).unwrap_or_else(|| start_dir.to_path_buf())
}

fn find_orchestration_root(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .find(|dir| dir.join(ORCHESTRATION_DIR).is_dir())
        .map(Path::to_path_buf)
}
