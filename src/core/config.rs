//! Dispatcher-level configuration, read once at startup.

use crate::core::logging;
use std::env;
use std::path::{Path, PathBuf};

pub const COMMANDS_DIR_ENV: &str = "TRELLIS_COMMANDS_DIR";
pub const DEFAULT_PROGRAM: &str = "trellis";
const COMMANDS_DIR_NAME: &str = "commands";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub program: String,
    pub version: String,
    /// Built-in command tree. `None` when nothing was found.
    pub commands_dir: Option<PathBuf>,
    pub debug: bool,
}

impl DispatcherConfig {
    /// Read the environment and raw argv. Nothing here fails: a missing
    /// commands directory only means an empty registry.
    pub fn from_env<S: AsRef<str>>(args: &[S]) -> Self {
        let exe_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            commands_dir: resolve_commands_dir(
                env::var_os(COMMANDS_DIR_ENV).map(PathBuf::from),
                exe_dir.as_deref(),
            ),
            debug: logging::debug_requested(args),
        }
    }
}

/// The explicit override wins even when it does not exist yet; otherwise the
/// first existing `commands` directory next to or above the executable.
pub fn resolve_commands_dir(explicit: Option<PathBuf>, exe_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = explicit.filter(|d| !d.as_os_str().is_empty()) {
        return Some(dir);
    }
    let exe_dir = exe_dir?;
    exe_dir
        .ancestors()
        .take(3)
        .map(|dir| dir.join(COMMANDS_DIR_NAME))
        .find(|candidate| candidate.is_dir())
}
