//! Help synthesis.
//!
//! [`HelpIndex`] holds two views of the command set: the listing built from
//! the loader's registry, and the per-command metadata the parser layer was
//! registered with (usage line and declared flags). Rendering only reads them.

use crate::core::descriptor::ArgumentSpec;
use crate::core::error::TrellisError;
use crate::core::output::{column_width, compact_line, display_value};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

const LISTING_DESCRIPTION_CHARS: usize = 72;

/// A registry path as shown in listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedCommand {
    pub path: String,
    pub description: Option<String>,
    #[serde(skip)]
    pub args: Vec<ArgumentSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlagHelp {
    pub raw: String,
    pub description: Option<String>,
    pub default: Option<Value>,
}

/// Metadata the parser layer holds for one invocable command.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub usage: String,
    pub description: Option<String>,
    pub flags: Vec<FlagHelp>,
}

#[derive(Debug, Clone)]
pub struct HelpIndex {
    program: String,
    commands: Vec<ListedCommand>,
    parsed: BTreeMap<String, ParsedCommand>,
    /// Roots registered as families. A bare family root always lists its
    /// members, even when the root path is itself registered.
    families: BTreeSet<String>,
}

impl HelpIndex {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            commands: Vec::new(),
            parsed: BTreeMap::new(),
            families: BTreeSet::new(),
        }
    }

    pub fn list(&mut self, path: impl Into<String>, description: Option<String>, args: Vec<ArgumentSpec>) {
        let path = path.into();
        if self.commands.iter().any(|c| c.path == path) {
            return;
        }
        self.commands.push(ListedCommand {
            path,
            description,
            args,
        });
    }

    pub fn record_parsed(&mut self, path: impl Into<String>, parsed: ParsedCommand) {
        self.parsed.insert(path.into(), parsed);
    }

    pub fn mark_family(&mut self, root: impl Into<String>) {
        self.families.insert(root.into());
    }

    pub fn is_family(&self, root: &str) -> bool {
        self.families.contains(root)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn commands(&self) -> &[ListedCommand] {
        &self.commands
    }

    pub fn parsed(&self, path: &str) -> Option<&ParsedCommand> {
        self.parsed.get(path)
    }

    /// Render help for `tokens`:
    /// - empty: global listing
    /// - a single family root: listing scoped to that family, the root path
    ///   itself included when registered
    /// - an exact registered path: detail (empty when the parser has no entry)
    /// - a prefix of registered paths: listing scoped to that prefix
    /// - anything else: [`TrellisError::UnknownCommand`]
    pub fn render(&self, tokens: &[String]) -> Result<String, TrellisError> {
        if tokens.is_empty() {
            return Ok(self.render_global());
        }
        let joined = tokens.join(" ");
        let prefix = format!("{} ", joined);
        let under_prefix = |c: &&ListedCommand| c.path.starts_with(&prefix);

        if let [root] = tokens {
            if self.is_family(root) {
                let members: Vec<&ListedCommand> = self
                    .commands
                    .iter()
                    .filter(|c| c.path == joined || under_prefix(c))
                    .collect();
                return Ok(self.render_family(&joined, &members));
            }
        }
        if let Some(listed) = self.commands.iter().find(|c| c.path == joined) {
            return Ok(match self.parsed.get(&joined) {
                Some(parsed) => render_detail(listed, parsed),
                None => String::new(),
            });
        }
        let members: Vec<&ListedCommand> = self.commands.iter().filter(under_prefix).collect();
        if !members.is_empty() {
            return Ok(self.render_family(&joined, &members));
        }
        Err(TrellisError::UnknownCommand(joined))
    }

    fn render_global(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} <command> [options]",
            "Usage:".bold(),
            self.program
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Commands:".bold());
        let all: Vec<&ListedCommand> = self.commands.iter().collect();
        write_listing(&mut out, &all);
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Options:".bold());
        let globals = [
            ("-h, --help", "Display this message"),
            ("-V, --version", "Display version number"),
            ("--root-dir <path>", "Override project root"),
            ("--debug", "Enable debug mode"),
        ];
        let width = column_width(globals.iter().map(|(flag, _)| *flag));
        for (flag, description) in globals {
            let _ = writeln!(out, "  {:<width$}  {}", flag, description, width = width);
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Run `{} <command> --help` for more information on a command.",
            self.program
        );
        out
    }

    fn render_family(&self, prefix: &str, members: &[&ListedCommand]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", format!("Commands for {}:", prefix).bold());
        write_listing(&mut out, members);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Run `{} {} <subcommand> --help` for more information.",
            self.program, prefix
        );
        out
    }
}

fn write_listing(out: &mut String, commands: &[&ListedCommand]) {
    let width = column_width(commands.iter().map(|c| c.path.as_str()));
    for command in commands {
        let description = command
            .description
            .as_deref()
            .map(|d| compact_line(d, LISTING_DESCRIPTION_CHARS))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {}  {}",
            format!("{:<width$}", command.path, width = width).cyan(),
            description
        );
    }
}

fn render_detail(listed: &ListedCommand, parsed: &ParsedCommand) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Usage:".bold(), parsed.usage);
    let description = parsed
        .description
        .as_deref()
        .or(listed.description.as_deref());
    if let Some(description) = description {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", description);
    }

    if !listed.args.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Arguments:".bold());
        let width = column_width(listed.args.iter().map(|a| a.name.as_str()));
        for arg in &listed.args {
            let mut line = arg.description.clone().unwrap_or_default();
            if arg.required {
                if !line.is_empty() {
                    line.push(' ');
                }
                line.push_str(&"(required)".dimmed().to_string());
            }
            let _ = writeln!(
                out,
                "  {}  {}",
                format!("{:<width$}", arg.name, width = width).cyan(),
                line
            );
        }
    }

    if !parsed.flags.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Options:".bold());
        let width = column_width(parsed.flags.iter().map(|f| f.raw.as_str()));
        for flag in &parsed.flags {
            let mut line = flag.description.clone().unwrap_or_default();
            if let Some(default) = flag.default.as_ref().filter(|d| !d.is_null()) {
                if !line.is_empty() {
                    line.push(' ');
                }
                line.push_str(
                    &format!("(default: {})", display_value(default))
                        .dimmed()
                        .to_string(),
                );
            }
            let _ = writeln!(
                out,
                "  {}  {}",
                format!("{:<width$}", flag.raw, width = width).yellow(),
                line
            );
        }
    }
    out
}
