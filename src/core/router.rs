//! Routing: grouping the registry by root token and dispatching invocations.
//!
//! Grouping is decided once, right after the registry is loaded:
//! - a root with exactly one entry whose path is the root alone becomes a
//!   [`Route::Singleton`] with its own argument shape
//! - every other root becomes a [`Route::Family`] registered as
//!   `root [subcommand] [...args]`, resolved by exact `"root subcommand"`
//!   lookup at invocation time
//!
//! Dispatch never exits the process; it returns the exit code and leaves
//! terminating to the binary.

use crate::cli;
use crate::core::binder::{apply_defaults, bind, ensure_globals, parse_family_tail, split_family_tail};
use crate::core::error::TrellisError;
use crate::core::exec::execute;
use crate::core::help::{FlagHelp, HelpIndex, ParsedCommand};
use crate::core::loader::{Registry, RegistryEntry};
use crate::core::options::Options;
use crate::core::output::report_error;
use crate::core::unit::CommandContext;
use clap::error::ErrorKind;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

/// How one root token is exposed. Indices point into the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Singleton { entry: usize },
    Family {
        root: String,
        /// Remainder of the path (`"add"` for `module add`) → entry index.
        members: BTreeMap<String, usize>,
    },
}

/// Group registry entries by root token.
pub fn group_routes(registry: &Registry) -> BTreeMap<String, Route> {
    let mut by_root: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, entry) in registry.entries().iter().enumerate() {
        if let Some(root) = entry.path.root() {
            by_root.entry(root.to_string()).or_default().push(index);
        }
    }

    by_root
        .into_iter()
        .map(|(root, indices)| {
            let entries = registry.entries();
            let route = match indices.as_slice() {
                [only] if entries[*only].path.len() == 1 => Route::Singleton { entry: *only },
                _ => Route::Family {
                    root: root.clone(),
                    members: indices
                        .iter()
                        .filter(|&&i| {
                            let shadowed = entries[i].path.len() == 1;
                            if shadowed {
                                warn!(
                                    command = %root,
                                    "command shares its name with a family root; it is listed but not runnable"
                                );
                            }
                            !shadowed
                        })
                        .map(|&i| (entries[i].path.tokens()[1..].join(" "), i))
                        .collect(),
                },
            };
            (root, route)
        })
        .collect()
}

/// Raw tokens after the family root in `argv`, exactly as typed.
fn family_tail<'a>(argv: &'a [String], root: &str) -> &'a [String] {
    let mut index = 1;
    while index < argv.len() {
        match argv[index].as_str() {
            "--root-dir" => index += 2,
            token if token == root => return &argv[index + 1..],
            _ => index += 1,
        }
    }
    &[]
}

fn family_usage(root: &str) -> String {
    format!("{} [subcommand] [...args]", root)
}

fn parsed_command(entry: &RegistryEntry) -> ParsedCommand {
    ParsedCommand {
        usage: entry.descriptor.usage_line(&entry.path),
        description: entry.descriptor.description.clone(),
        flags: entry
            .descriptor
            .options
            .iter()
            .map(|o| FlagHelp {
                raw: o.raw.clone(),
                description: o.description.clone(),
                default: o.default.clone(),
            })
            .collect(),
    }
}

pub struct Router {
    program: String,
    version: String,
    registry: Registry,
    routes: BTreeMap<String, Route>,
    help: HelpIndex,
    cwd: PathBuf,
}

impl Router {
    pub fn new(program: impl Into<String>, version: impl Into<String>, registry: Registry) -> Self {
        let program = program.into();
        let routes = group_routes(&registry);

        let mut help = HelpIndex::new(program.clone());
        for entry in registry.entries() {
            help.list(
                entry.key(),
                entry.descriptor.description.clone(),
                entry.descriptor.args.clone(),
            );
            help.record_parsed(entry.key(), parsed_command(entry));
        }
        for (root, route) in &routes {
            if matches!(route, Route::Family { .. }) {
                help.mark_family(root.clone());
            }
        }

        debug!(commands = registry.len(), routes = routes.len(), "routes registered");
        Self {
            program,
            version: version.into(),
            registry,
            routes,
            help,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Working directory commands see; defaults to the process cwd.
    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn routes(&self) -> &BTreeMap<String, Route> {
        &self.routes
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn help(&self) -> &HelpIndex {
        &self.help
    }

    /// The clap command tree for every route.
    pub fn command(&self) -> clap::Command {
        let mut cmd = cli::root_command(&self.program, &self.version);
        for (root, route) in &self.routes {
            cmd = cmd.subcommand(match route {
                Route::Singleton { entry } => {
                    let entry = &self.registry.entries()[*entry];
                    let usage = entry.descriptor.usage_line(&entry.path);
                    cli::singleton_command(&entry.path, &entry.descriptor, &usage)
                }
                Route::Family { .. } => cli::family_command(root, &family_usage(root)),
            });
        }
        cmd
    }

    /// Dispatch one invocation. `argv[0]` is the program name.
    pub fn dispatch<S: AsRef<str>>(&self, argv: &[S], out: &mut dyn Write, err: &mut dyn Write) -> i32 {
        let argv: Vec<String> = argv.iter().map(|a| a.as_ref().to_string()).collect();
        let tokens = argv.get(1..).unwrap_or_default();

        if let Some(path) = self.help_target(tokens) {
            debug!(path = ?path, "help requested");
            return self.print_help(&path, out, err);
        }

        let matches = match self.command().try_get_matches_from(&argv) {
            Ok(matches) => matches,
            Err(e) if e.kind() == ErrorKind::DisplayVersion => {
                let _ = write!(out, "{}", e);
                return 0;
            }
            Err(e) => {
                report_error(err, e.to_string().trim_end());
                return 1;
            }
        };

        let Some((root, sub)) = matches.subcommand() else {
            return self.print_help(&[], out, err);
        };
        match self.routes.get(root) {
            Some(Route::Singleton { entry }) => self.dispatch_singleton(*entry, sub, out, err),
            Some(Route::Family { root, members }) => {
                let tail = family_tail(&argv, root);
                self.dispatch_family(root, members, tail, sub, out, err)
            }
            None => {
                report_error(err, &TrellisError::UnknownCommand(root.to_string()).to_string());
                1
            }
        }
    }

    fn dispatch_singleton(
        &self,
        index: usize,
        matches: &clap::ArgMatches,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> i32 {
        let entry = &self.registry.entries()[index];
        let descriptor = &entry.descriptor;

        let mut options = Options::new();
        for spec in &descriptor.options {
            if let Some(value) = cli::option_value(matches, spec) {
                options.insert(spec.key(), value);
            }
        }
        apply_defaults(&descriptor.options, &mut options);
        let (root_dir, debug) = cli::global_values(matches);
        ensure_globals(root_dir.as_deref(), debug, &mut options);

        let positionals = cli::positional_values(matches, descriptor);
        bind(&descriptor.args, &positionals, &mut options);

        debug!(command = %entry.path, "dispatching singleton route");
        self.run_entry(entry, &options, out, err)
    }

    fn dispatch_family(
        &self,
        root: &str,
        members: &BTreeMap<String, usize>,
        tail: &[String],
        matches: &clap::ArgMatches,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> i32 {
        let tail = split_family_tail(tail);
        let Some(subcommand) = tail.subcommand.clone() else {
            return self.print_help(&[root.to_string()], out, err);
        };
        let target = members.get(&subcommand).map(|&i| &self.registry.entries()[i]);
        let known = target.map(|e| e.descriptor.options.as_slice()).unwrap_or_default();
        let (positionals, mut options) = parse_family_tail(&tail, known);

        if cli::help_requested(matches) || options.get_bool("help") {
            return self.print_help(&[root.to_string(), subcommand], out, err);
        }
        options.remove("help");

        let Some(entry) = target else {
            let e = TrellisError::UnknownSubcommand {
                root: root.to_string(),
                subcommand,
            };
            report_error(err, &e.to_string());
            return 1;
        };
        let descriptor = &entry.descriptor;

        apply_defaults(&descriptor.options, &mut options);
        let (root_dir, debug) = cli::global_values(matches);
        ensure_globals(root_dir.as_deref(), debug, &mut options);
        bind(&descriptor.args, &positionals, &mut options);

        debug!(command = %entry.path, "dispatching family member");
        self.run_entry(entry, &options, out, err)
    }

    fn run_entry(&self, entry: &RegistryEntry, options: &Options, out: &mut dyn Write, err: &mut dyn Write) -> i32 {
        let ctx = CommandContext::new(
            &entry.path,
            &entry.descriptor,
            options,
            &self.help,
            self.cwd.clone(),
            out,
        );
        execute(&entry.factory, &ctx, options, err)
    }

    /// Help path requested by raw tokens, checked before parsing so help wins
    /// over missing required arguments. `None` means no help was asked for.
    fn help_target(&self, tokens: &[String]) -> Option<Vec<String>> {
        if tokens.is_empty() {
            return Some(Vec::new());
        }

        let mut help = false;
        let mut path = Vec::new();
        let mut iter = tokens.iter();
        while let Some(token) = iter.next() {
            match token.as_str() {
                "--" => break,
                "-h" | "--help" => help = true,
                "--root-dir" => {
                    iter.next();
                }
                t if t.starts_with('-') => {}
                t => path.push(t.to_string()),
            }
        }
        if !help {
            return None;
        }

        let Some(root) = path.first().cloned() else {
            return Some(Vec::new());
        };
        Some(match self.routes.get(&root) {
            Some(Route::Family { .. }) => path.into_iter().take(2).collect(),
            _ => vec![root],
        })
    }

    fn print_help(&self, path: &[String], out: &mut dyn Write, err: &mut dyn Write) -> i32 {
        match self.help.render(path) {
            Ok(text) => {
                let _ = write!(out, "{}", text);
                0
            }
            Err(e) => {
                report_error(err, &e.to_string());
                1
            }
        }
    }
}
