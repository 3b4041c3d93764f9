//! Project root discovery and project configuration.
//!
//! A project is any directory holding a `trellis.toml`. Discovery walks up
//! from the working directory; `--root-dir` skips the search entirely.

use crate::core::error::TrellisError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PROJECT_MANIFEST: &str = "trellis.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectSection {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommandsSection {
    /// Extra command manifests shipped with the project, relative to its root.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub commands: CommandsSection,
    /// Everything else, left for the commands to interpret.
    #[serde(flatten)]
    pub extra: toml::Table,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
}

impl Project {
    /// Resolve the project for an invocation. An explicit root is trusted
    /// as-is; otherwise the nearest ancestor holding `trellis.toml` is used.
    pub fn discover(root_override: Option<&Path>, cwd: &Path) -> Result<Option<Self>, TrellisError> {
        let root = match root_override {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => cwd.join(dir),
            None => match find_project_root(cwd) {
                Some(root) => root,
                None => return Ok(None),
            },
        };
        debug!(root = %root.display(), "project root resolved");
        let config = load_config(&root)?;
        Ok(Some(Self { root, config }))
    }

    /// Absolute project-local commands directory, when configured.
    pub fn commands_dir(&self) -> Option<PathBuf> {
        self.config
            .commands
            .dir
            .as_ref()
            .map(|dir| self.root.join(dir))
    }
}

pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        if current_dir.join(PROJECT_MANIFEST).is_file() {
            return Some(current_dir);
        }
        if !current_dir.pop() {
            return None;
        }
    }
}

/// Load `trellis.toml` from `root`. A missing file is an empty config.
pub fn load_config(root: &Path) -> Result<ProjectConfig, TrellisError> {
    let path = root.join(PROJECT_MANIFEST);
    if !path.is_file() {
        debug!(root = %root.display(), "no project config found");
        return Ok(ProjectConfig::default());
    }
    let content = fs::read_to_string(&path).map_err(TrellisError::IoError)?;
    let config: ProjectConfig = toml::from_str(&content).map_err(|e| {
        TrellisError::ConfigError(format!("{}: {}", path.display(), e))
    })?;
    debug!(path = %path.display(), "loaded project config");
    Ok(config)
}
