//! Trellis: a project scaffolding CLI whose commands are discovered at startup.
//!
//! Every command is a TOML manifest in a commands directory. The dispatcher
//! loads the tree once, groups commands that share a root token into a
//! family (`module add`, `module list`, ...), parses argv, binds positional
//! arguments by name into a per-invocation options object and runs a fresh
//! command unit with it.
//!
//! ```bash
//! trellis build src/main.ts --out dist
//! trellis module add https://example.com/mod.git --branch dev
//! trellis module --help
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: loader, router, option binding, execution wrapper and help
//! - [`plugins`]: built-in handlers manifests can point at (`exec`, `help`, `inspect`)

pub mod cli;
pub mod core;
pub mod plugins;

use crate::core::config::DispatcherConfig;
use crate::core::loader::{CommandLoader, ManifestImporter, Registry, RegistryEntry};
use crate::core::logging;
use crate::core::output::report_error;
use crate::core::project::Project;
use crate::core::router::Router;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `--root-dir` from raw argv, before clap has seen it. Needed to find a
/// project-local commands directory while the registry is being built.
fn root_dir_arg<S: AsRef<str>>(args: &[S]) -> Option<PathBuf> {
    let mut iter = args.iter().map(AsRef::as_ref).take_while(|a| *a != "--");
    while let Some(arg) = iter.next() {
        if arg == "--root-dir" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(dir) = arg.strip_prefix("--root-dir=") {
            return Some(PathBuf::from(dir));
        }
    }
    None
}

/// Load the built-in command tree, then the project's own commands. The
/// first registration of a path wins; `help` is added when nobody ships one.
pub fn load_registry(config: &DispatcherConfig, root_override: Option<&Path>, cwd: &Path) -> Registry {
    let loader = CommandLoader::new(ManifestImporter::new(plugins::builtin_handlers()));
    let mut entries: Vec<RegistryEntry> = Vec::new();

    if let Some(dir) = &config.commands_dir {
        entries.extend(loader.load(dir));
    }

    match Project::discover(root_override, cwd) {
        Ok(Some(project)) => {
            if let Some(dir) = project.commands_dir() {
                debug!(dir = %dir.display(), "loading project commands");
                entries.extend(loader.load(&dir));
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "ignoring project commands"),
    }

    if !entries.iter().any(|e| e.key() == plugins::help::HANDLER_NAME) {
        entries.push(plugins::help::entry());
    }
    Registry::new(entries)
}

/// Dispatch `args` against a freshly loaded registry.
pub fn run_with<S: AsRef<str>>(
    config: &DispatcherConfig,
    args: &[S],
    cwd: PathBuf,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> i32 {
    let registry = load_registry(config, root_dir_arg(args).as_deref(), &cwd);
    Router::new(config.program.clone(), config.version.clone(), registry)
        .with_cwd(cwd)
        .dispatch(args, out, err)
}

/// Process entry point. Returns the exit code.
pub fn run() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    let config = DispatcherConfig::from_env(&args);
    logging::init(config.debug);

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            report_error(&mut io::stderr(), &format!("cannot read working directory: {}", e));
            return 1;
        }
    };

    let stdout = io::stdout();
    let stderr = io::stderr();
    let code = run_with(&config, &args, cwd, &mut stdout.lock(), &mut stderr.lock());
    let _ = io::stdout().flush();
    code
}
