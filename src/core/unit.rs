//! The runnable-command interface.
//!
//! Every discovered command is a [`CommandUnit`] built by a [`Factory`]. The
//! dispatcher builds a fresh unit per invocation and hands it an explicit
//! [`CommandContext`] instead of a back-reference to the CLI.

use crate::core::descriptor::{CommandPath, Descriptor};
use crate::core::error::TrellisError;
use crate::core::help::{HelpIndex, ListedCommand};
use crate::core::options::Options;
use crate::core::project::Project;
use std::cell::RefCell;
use std::fmt::Display;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub trait CommandUnit {
    /// Context and project setup. The default discovers the project and fails
    /// when the command requires one and none is found.
    fn init(&mut self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        ctx.project()?;
        Ok(())
    }

    fn run(&mut self, ctx: &CommandContext<'_>, options: &Options) -> anyhow::Result<()>;

    /// Introspection label, recorded by the loader.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Builds a fresh unit. Called once per invocation.
pub type Factory = Rc<dyn Fn() -> Box<dyn CommandUnit>>;

pub fn factory<F, U>(build: F) -> Factory
where
    F: Fn() -> U + 'static,
    U: CommandUnit + 'static,
{
    Rc::new(move || Box::new(build()) as Box<dyn CommandUnit>)
}

/// What a running command may ask of the dispatcher.
pub struct CommandContext<'a> {
    path: &'a CommandPath,
    descriptor: &'a Descriptor,
    options: &'a Options,
    help: &'a HelpIndex,
    cwd: PathBuf,
    out: RefCell<&'a mut dyn Write>,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        path: &'a CommandPath,
        descriptor: &'a Descriptor,
        options: &'a Options,
        help: &'a HelpIndex,
        cwd: PathBuf,
        out: &'a mut dyn Write,
    ) -> Self {
        Self {
            path,
            descriptor,
            options,
            help,
            cwd,
            out: RefCell::new(out),
        }
    }

    pub fn path(&self) -> &CommandPath {
        self.path
    }

    pub fn descriptor(&self) -> &Descriptor {
        self.descriptor
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn root_dir_override(&self) -> Option<PathBuf> {
        self.options.root_dir()
    }

    pub fn debug(&self) -> bool {
        self.options.debug()
    }

    /// Discover the project for this invocation. `--root-dir` wins over the
    /// upward search. Errors when the command requires a project and none is
    /// found.
    pub fn project(&self) -> Result<Option<Project>, TrellisError> {
        let project = Project::discover(self.root_dir_override().as_deref(), &self.cwd)?;
        if project.is_none() && self.descriptor.requires_project {
            return Err(TrellisError::ProjectRequired(self.path.key()));
        }
        Ok(project)
    }

    /// Render help for `tokens` (empty for the global listing).
    pub fn help(&self, tokens: &[String]) -> Result<String, TrellisError> {
        self.help.render(tokens)
    }

    /// Every registered command path with its description.
    pub fn routes(&self) -> &[ListedCommand] {
        self.help.commands()
    }

    /// Write one line to the dispatcher's output sink.
    pub fn println(&self, line: impl Display) -> io::Result<()> {
        let mut out = self.out.borrow_mut();
        writeln!(out, "{}", line)
    }
}
