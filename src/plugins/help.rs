//! `help [...command]`: the help synthesizer exposed as a command.

use crate::core::descriptor::{ArgumentSpec, CommandPath, Descriptor, OptionSpec};
use crate::core::error::TrellisError;
use crate::core::loader::{CommandManifest, RegistryEntry};
use crate::core::options::Options;
use crate::core::unit::{CommandContext, CommandUnit, Factory, factory};
use anyhow::bail;
use serde_json::Value;

pub const HANDLER_NAME: &str = "help";
const COMMAND_ARG: &str = "command";
const FORMAT_KEY: &str = "format";

#[derive(Debug, Default)]
pub struct HelpCommand;

impl CommandUnit for HelpCommand {
    /// Help never needs a project.
    fn init(&mut self, _ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn run(&mut self, ctx: &CommandContext<'_>, options: &Options) -> anyhow::Result<()> {
        let tokens = options.get_list(COMMAND_ARG);
        match options.get_str(FORMAT_KEY).unwrap_or("text") {
            "text" => {
                let text = ctx.help(&tokens)?;
                ctx.println(text.trim_end())?;
            }
            "json" => {
                let prefix = tokens.join(" ");
                let routes: Vec<_> = ctx
                    .routes()
                    .iter()
                    .filter(|c| prefix.is_empty() || c.path == prefix || c.path.starts_with(&format!("{} ", prefix)))
                    .collect();
                if routes.is_empty() {
                    return Err(TrellisError::UnknownCommand(prefix).into());
                }
                ctx.println(serde_json::to_string_pretty(&routes)?)?;
            }
            other => bail!("Unsupported help format '{}' (expected text or json)", other),
        }
        Ok(())
    }
}

pub fn descriptor() -> Descriptor {
    let format = OptionSpec {
        raw: "--format <fmt>".to_string(),
        long: FORMAT_KEY.to_string(),
        short: None,
        value_name: Some("fmt".to_string()),
        value_optional: false,
        description: None,
        default: None,
    };
    Descriptor::new()
        .with_description("Display help for a command")
        .with_arg(ArgumentSpec::optional("command...").with_description("Command path to describe"))
        .with_option(
            format
                .with_description("Output format: text or json")
                .with_default(Value::String("text".to_string())),
        )
}

pub fn build(_manifest: &CommandManifest) -> Result<Factory, TrellisError> {
    Ok(factory(|| HelpCommand))
}

/// Registry entry used when the command tree ships no `help` manifest.
pub fn entry() -> RegistryEntry {
    RegistryEntry::new(CommandPath::parse(HANDLER_NAME), descriptor(), factory(|| HelpCommand))
}
