//! `exec`: run an external program for a command.
//!
//! The manifest's `exec` list is the program and its leading arguments; the
//! bound positional values follow in declaration order. A leading argument
//! written as `{key}` is replaced by that option's value and dropped when the
//! option is unset. The child inherits
//! stdio, runs in the project root when there is one, and receives the full
//! options object as JSON in `TRELLIS_OPTIONS`.

use crate::core::descriptor::Descriptor;
use crate::core::error::TrellisError;
use crate::core::loader::CommandManifest;
use crate::core::options::Options;
use crate::core::unit::{CommandContext, CommandUnit, Factory, factory};
use anyhow::{Context, bail};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

pub const HANDLER_NAME: &str = "exec";
pub const OPTIONS_ENV: &str = "TRELLIS_OPTIONS";

#[derive(Debug, Clone)]
pub struct ExecCommand {
    program: Vec<String>,
    workdir: Option<PathBuf>,
}

impl ExecCommand {
    pub fn new(program: Vec<String>) -> Self {
        Self {
            program,
            workdir: None,
        }
    }
}

/// Positional values in declaration order; variadic lists are flattened and
/// absent arguments contribute nothing.
pub fn positional_argv(descriptor: &Descriptor, options: &Options) -> Vec<String> {
    descriptor
        .args
        .iter()
        .flat_map(|arg| options.get_list(&arg.name))
        .collect()
}

/// Expand `{key}` placeholders in the leading arguments.
pub fn expand_leading(leading: &[String], options: &Options) -> Vec<String> {
    leading
        .iter()
        .flat_map(|arg| {
            match arg.strip_prefix('{').and_then(|a| a.strip_suffix('}')) {
                Some(key) => options.get_list(key),
                None => vec![arg.clone()],
            }
        })
        .collect()
}

impl CommandUnit for ExecCommand {
    fn init(&mut self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        self.workdir = ctx.project()?.map(|p| p.root);
        Ok(())
    }

    fn run(&mut self, ctx: &CommandContext<'_>, options: &Options) -> anyhow::Result<()> {
        let Some((program, leading)) = self.program.split_first() else {
            bail!("'{}' has nothing to execute", ctx.path());
        };
        let workdir = self.workdir.clone().unwrap_or_else(|| ctx.cwd().to_path_buf());

        let mut cmd = Command::new(program);
        cmd.args(expand_leading(leading, options))
            .args(positional_argv(ctx.descriptor(), options))
            .current_dir(&workdir)
            .env(OPTIONS_ENV, serde_json::to_string(options)?);

        debug!(command = %ctx.path(), program = %program, dir = %workdir.display(), "spawning");
        let status = cmd
            .status()
            .with_context(|| format!("failed to start '{}'", program))?;
        if !status.success() {
            bail!(
                "'{}' exited with {}",
                program,
                status.code().map_or("a signal".to_string(), |c| format!("status {}", c))
            );
        }
        Ok(())
    }
}

pub fn build(manifest: &CommandManifest) -> Result<Factory, TrellisError> {
    if manifest.exec.is_empty() {
        return Err(TrellisError::DescriptorError(
            "the exec handler needs a non-empty `exec` list".to_string(),
        ));
    }
    let program = manifest.exec.clone();
    Ok(factory(move || ExecCommand::new(program.clone())))
}
