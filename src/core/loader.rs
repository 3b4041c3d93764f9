//! Command discovery.
//!
//! The loader walks a directory of command manifests and turns every eligible
//! file into a registry entry:
//! - directory names become path-prefix tokens
//! - the file stem becomes the trailing token (`module/add.toml` → `module add`)
//! - `index.toml` collapses to its directory; a root-level `index.toml` maps to
//!   nothing and is ignored
//! - `*.d.toml` files are declaration-only fragments and never load
//!
//! A file that fails to import is logged and skipped. One bad manifest never
//! keeps the rest of the tree from loading.

use crate::core::descriptor::{CommandPath, Descriptor};
use crate::core::error::TrellisError;
use crate::core::unit::Factory;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const MANIFEST_EXTENSION: &str = "toml";
const DECLARATION_SUFFIX: &str = ".d.toml";
const INDEX_STEM: &str = "index";

/// What importing one manifest yields: its descriptor and, when the manifest
/// names a usable handler, the factory that builds it.
pub struct CommandModule {
    pub descriptor: Descriptor,
    pub factory: Option<Factory>,
}

/// Turns one file into a [`CommandModule`].
pub trait Importer {
    fn import(&self, path: &Path) -> Result<CommandModule, TrellisError>;
}

/// On-disk command manifest: a descriptor plus the handler that runs it.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandManifest {
    #[serde(flatten)]
    pub descriptor: Descriptor,
    /// Built-in handler name. Defaults to `exec` when `exec` is given.
    #[serde(default)]
    pub handler: Option<String>,
    /// Program and leading arguments for the `exec` handler.
    #[serde(default)]
    pub exec: Vec<String>,
}

impl CommandManifest {
    pub fn handler_name(&self) -> Option<&str> {
        match &self.handler {
            Some(name) => Some(name.as_str()),
            None if !self.exec.is_empty() => Some("exec"),
            None => None,
        }
    }
}

pub type HandlerBuilder = fn(&CommandManifest) -> Result<Factory, TrellisError>;

/// Named built-in handlers a manifest can point at.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: BTreeMap<String, HandlerBuilder>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: &str, builder: HandlerBuilder) -> Self {
        self.handlers.insert(name.to_string(), builder);
        self
    }

    pub fn get(&self, name: &str) -> Option<HandlerBuilder> {
        self.handlers.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// Default importer: parses TOML manifests and resolves their handler.
pub struct ManifestImporter {
    handlers: HandlerTable,
}

impl ManifestImporter {
    pub fn new(handlers: HandlerTable) -> Self {
        Self { handlers }
    }
}

impl Importer for ManifestImporter {
    fn import(&self, path: &Path) -> Result<CommandModule, TrellisError> {
        let content = fs::read_to_string(path).map_err(TrellisError::IoError)?;
        let manifest: CommandManifest = toml::from_str(&content)?;
        let factory = match manifest.handler_name() {
            Some(name) => {
                let builder = self.handlers.get(name).ok_or_else(|| {
                    TrellisError::NotFound(format!(
                        "handler '{}' (known: {})",
                        name,
                        self.handlers.names().collect::<Vec<_>>().join(", ")
                    ))
                })?;
                Some(builder(&manifest)?)
            }
            None => None,
        };
        Ok(CommandModule {
            descriptor: manifest.descriptor,
            factory,
        })
    }
}

/// One discovered command.
#[derive(Clone)]
pub struct RegistryEntry {
    pub path: CommandPath,
    pub source: Option<PathBuf>,
    pub descriptor: Descriptor,
    pub factory: Factory,
    /// Label of the unit the factory builds, taken from one throwaway instance.
    pub kind: &'static str,
}

impl RegistryEntry {
    /// Build an entry, reading `kind` from one unit the factory builds. A factory
    /// that panics is reported as [`TrellisError::FactoryPanicked`].
    pub fn try_new(path: CommandPath, descriptor: Descriptor, factory: Factory) -> Result<Self, TrellisError> {
        let kind = panic::catch_unwind(AssertUnwindSafe(|| factory().kind()))
            .map_err(|_| TrellisError::FactoryPanicked(path.key()))?;
        Ok(Self {
            path,
            source: None,
            descriptor,
            factory,
            kind,
        })
    }

    /// Like [`RegistryEntry::try_new`] for factories known to be sound, such
    /// as the built-in handlers. A factory that panics leaves `kind` as `"unknown"`.
    pub fn new(path: CommandPath, descriptor: Descriptor, factory: Factory) -> Self {
        let kind = panic::catch_unwind(AssertUnwindSafe(|| factory().kind())).unwrap_or("unknown");
        Self {
            path,
            source: None,
            descriptor,
            factory,
            kind,
        }
    }

    pub fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }

    pub fn key(&self) -> String {
        self.path.key()
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("path", &self.path.key())
            .field("source", &self.source)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The per-process set of commands. Built once, never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    /// Keep the first entry for every path; later duplicates and entries with
    /// an invalid descriptor are logged and dropped.
    pub fn new(entries: impl IntoIterator<Item = RegistryEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for entry in entries {
            let key = entry.key();
            if entry.path.is_empty() {
                warn!(source = ?entry.source, "skipping command with an empty path");
                continue;
            }
            if let Err(e) = entry.descriptor.validate() {
                warn!(command = %key, source = ?entry.source, error = %e, "skipping command");
                continue;
            }
            if !seen.insert(key.clone()) {
                warn!(command = %key, source = ?entry.source, "duplicate command path ignored");
                continue;
            }
            kept.push(entry);
        }
        Self { entries: kept }
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.key() == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Map a manifest file under `root` to its command path.
pub fn command_path_for(root: &Path, file: &Path) -> Option<CommandPath> {
    let file_name = file.file_name()?.to_str()?;
    if file.extension()?.to_str()? != MANIFEST_EXTENSION || file_name.ends_with(DECLARATION_SUFFIX) {
        return None;
    }
    let relative = file.strip_prefix(root).ok()?;
    let mut tokens = Vec::new();
    if let Some(parent) = relative.parent() {
        for component in parent.components() {
            tokens.push(component.as_os_str().to_str()?.to_string());
        }
    }
    let stem = file.file_stem()?.to_str()?;
    if stem != INDEX_STEM {
        tokens.push(stem.to_string());
    } else if tokens.is_empty() {
        return None;
    }
    Some(CommandPath::new(tokens))
}

pub struct CommandLoader<I: Importer> {
    importer: I,
}

impl<I: Importer> CommandLoader<I> {
    pub fn new(importer: I) -> Self {
        Self { importer }
    }

    /// Scan `root` recursively. A missing directory yields no entries.
    pub fn load(&self, root: &Path) -> Vec<RegistryEntry> {
        if !root.is_dir() {
            debug!(dir = %root.display(), "commands directory not found");
            return Vec::new();
        }

        let mut entries = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name();
        for item in walker {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry in commands directory");
                    continue;
                }
            };
            if !item.file_type().is_file() {
                continue;
            }
            let Some(path) = command_path_for(root, item.path()) else {
                continue;
            };
            if let Some(entry) = self.load_one(item.path(), path) {
                entries.push(entry);
            }
        }
        debug!(dir = %root.display(), count = entries.len(), "commands loaded");
        entries
    }

    fn load_one(&self, file: &Path, path: CommandPath) -> Option<RegistryEntry> {
        let module = match self.importer.import(file) {
            Ok(module) => module,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "failed to load command");
                return None;
            }
        };
        let Some(factory) = module.factory else {
            warn!(path = %file.display(), "command has no runnable handler, skipping");
            return None;
        };
        let entry = match RegistryEntry::try_new(path, module.descriptor, factory) {
            Ok(entry) => entry.with_source(file.to_path_buf()),
            Err(e) => {
                warn!(path = %file.display(), error = %e, "failed to load command");
                return None;
            }
        };
        debug!(command = %entry.key(), kind = entry.kind, "command discovered");
        Some(entry)
    }
}
