//! Built-in command handlers a manifest can name with `handler = "..."`.

pub mod exec;
pub mod help;
pub mod inspect;

use crate::core::loader::HandlerTable;

pub fn builtin_handlers() -> HandlerTable {
    HandlerTable::new()
        .register(exec::HANDLER_NAME, exec::build)
        .register(help::HANDLER_NAME, help::build)
        .register(inspect::HANDLER_NAME, inspect::build)
}
