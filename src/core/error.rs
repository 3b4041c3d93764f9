use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrellisError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Manifest parse error: {0}")]
    ManifestError(#[from] toml::de::Error),
    #[error("Invalid command descriptor: {0}")]
    DescriptorError(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Unknown subcommand '{subcommand}' for '{root}'")]
    UnknownSubcommand { root: String, subcommand: String },
    #[error("{0}")]
    ParseError(String),
    #[error(
        "Command '{0}' requires to be run within a Trellis project (no trellis.toml found in current or parent directories)"
    )]
    ProjectRequired(String),
    #[error("Command factory for '{0}' panicked")]
    FactoryPanicked(String),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}
