//! Dispatcher core: discovery, routing, option binding and help.
//!
//! Built-in command handlers live in `plugins`; everything they need from the
//! dispatcher goes through [`unit::CommandContext`].

pub mod binder;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod exec;
pub mod help;
pub mod loader;
pub mod logging;
pub mod options;
pub mod output;
pub mod project;
pub mod router;
pub mod unit;
