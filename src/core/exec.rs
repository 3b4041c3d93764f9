//! Execution boundary shared by both dispatch paths.

use crate::core::options::Options;
use crate::core::output::report_error;
use crate::core::unit::{CommandContext, Factory};
use std::io::Write;
use tracing::debug;

/// Build a fresh unit, run `init` then `run`, and turn any failure into exit
/// code 1. The error message always goes to `err`; the full chain only with
/// `--debug`. Side effects of a failed command are not rolled back.
pub fn execute(factory: &Factory, ctx: &CommandContext<'_>, options: &Options, err: &mut dyn Write) -> i32 {
    let mut unit = factory();
    debug!(command = %ctx.path(), kind = unit.kind(), "executing command");

    let result = unit.init(ctx).and_then(|()| unit.run(ctx, options));
    match result {
        Ok(()) => 0,
        Err(e) => {
            report_error(err, &e.to_string());
            if options.debug() {
                let _ = writeln!(err, "{:?}", e);
            }
            1
        }
    }
}
