//! `inspect`: print the resolved options object. Handy while writing manifests.

use crate::core::error::TrellisError;
use crate::core::loader::CommandManifest;
use crate::core::options::Options;
use crate::core::unit::{CommandContext, CommandUnit, Factory, factory};

pub const HANDLER_NAME: &str = "inspect";

#[derive(Debug, Default)]
pub struct InspectCommand;

impl CommandUnit for InspectCommand {
    fn run(&mut self, ctx: &CommandContext<'_>, options: &Options) -> anyhow::Result<()> {
        ctx.println(serde_json::to_string_pretty(options)?)?;
        Ok(())
    }
}

pub fn build(_manifest: &CommandManifest) -> Result<Factory, TrellisError> {
    Ok(factory(|| InspectCommand))
}
