//! Parser surface for the dispatcher.
//!
//! Routes are only known after the command tree is loaded, so the clap
//! command tree is assembled with the builder API instead of derive structs.
//! Dispatch logic lives in `core::router`.

use crate::core::descriptor::{ArgumentSpec, CommandPath, Descriptor, OptionSpec};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;

pub(crate) const ROOT_DIR_ID: &str = "root-dir";
pub(crate) const DEBUG_ID: &str = "debug";
pub(crate) const HELP_ID: &str = "help";
pub(crate) const REST_ID: &str = "args";

pub(crate) fn positional_id(spec: &ArgumentSpec) -> String {
    format!("arg:{}", spec.name)
}

pub(crate) fn option_id(spec: &OptionSpec) -> String {
    format!("opt:{}", spec.long)
}

/// Top-level command. The two dispatcher flags and the help flag are global
/// so every route accepts them.
pub(crate) fn root_command(program: &str, version: &str) -> Command {
    Command::new(program.to_string())
        .version(version.to_string())
        .disable_help_flag(true)
        .disable_help_subcommand(true)
        .arg(
            Arg::new(ROOT_DIR_ID)
                .long("root-dir")
                .value_name("path")
                .help("Override project root")
                .action(ArgAction::Set)
                .global(true),
        )
        .arg(
            Arg::new(DEBUG_ID)
                .long("debug")
                .help("Enable debug mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new(HELP_ID)
                .short('h')
                .long("help")
                .help("Display this message")
                .action(ArgAction::SetTrue)
                .global(true),
        )
}

/// `root <req> [opt] [...rest]` with every declared option attached.
pub(crate) fn singleton_command(path: &CommandPath, descriptor: &Descriptor, usage: &str) -> Command {
    let mut cmd = Command::new(path.key())
        .disable_help_flag(true)
        .override_usage(usage.to_string());
    if let Some(description) = &descriptor.description {
        cmd = cmd.about(description.clone());
    }
    for spec in &descriptor.args {
        cmd = cmd.arg(positional_arg(spec));
    }
    for spec in &descriptor.options {
        cmd = cmd.arg(option_arg(spec));
    }
    cmd
}

/// `root [subcommand] [...args]`. The parser only has to accept the tail;
/// the router reads it raw from argv, unknown flags and `--` included, and
/// picks the subcommand out itself.
pub(crate) fn family_command(root: &str, usage: &str) -> Command {
    Command::new(root.to_string())
        .about(format!("Manage {} commands", root))
        .disable_help_flag(true)
        .override_usage(usage.to_string())
        .arg(
            Arg::new(REST_ID)
                .value_name("args")
                .num_args(0..)
                .action(ArgAction::Append)
                .trailing_var_arg(true)
                .allow_hyphen_values(true),
        )
}

fn positional_arg(spec: &ArgumentSpec) -> Arg {
    let mut arg = Arg::new(positional_id(spec))
        .value_name(spec.name.clone())
        .required(spec.required);
    if let Some(description) = &spec.description {
        arg = arg.help(description.clone());
    }
    if spec.variadic {
        arg.num_args(1..).action(ArgAction::Append)
    } else {
        arg.action(ArgAction::Set)
    }
}

fn option_arg(spec: &OptionSpec) -> Arg {
    let mut arg = Arg::new(option_id(spec)).long(spec.long.clone());
    if let Some(short) = spec.short {
        arg = arg.short(short);
    }
    if let Some(description) = &spec.description {
        arg = arg.help(description.clone());
    }
    match &spec.value_name {
        None => arg.action(ArgAction::SetTrue),
        Some(value_name) => {
            let arg = arg.action(ArgAction::Set).value_name(value_name.clone());
            if spec.value_optional {
                arg.num_args(0..=1)
            } else {
                arg.num_args(1)
            }
        }
    }
}

/// Positional values in declaration order, as clap assigned them.
pub(crate) fn positional_values(matches: &ArgMatches, descriptor: &Descriptor) -> Vec<String> {
    descriptor
        .args
        .iter()
        .flat_map(|spec| {
            matches
                .get_many::<String>(&positional_id(spec))
                .into_iter()
                .flatten()
                .cloned()
        })
        .collect()
}

/// Value of a declared option when it was given on the command line.
/// A switch, or a `[value]` option given bare, is `true`.
pub(crate) fn option_value(matches: &ArgMatches, spec: &OptionSpec) -> Option<Value> {
    let id = option_id(spec);
    if matches.value_source(&id) != Some(ValueSource::CommandLine) {
        return None;
    }
    if !spec.takes_value() {
        return Some(Value::Bool(true));
    }
    Some(match matches.get_one::<String>(&id) {
        Some(value) => Value::String(value.clone()),
        None => Value::Bool(true),
    })
}

/// `--root-dir` and `--debug` as given to this route.
pub(crate) fn global_values(matches: &ArgMatches) -> (Option<String>, bool) {
    (
        matches.get_one::<String>(ROOT_DIR_ID).cloned(),
        matches.get_flag(DEBUG_ID),
    )
}

pub(crate) fn help_requested(matches: &ArgMatches) -> bool {
    matches.get_flag(HELP_ID)
}
