use std::process::ExitCode;

fn main() -> ExitCode {
    ExitCode::from(trellis::run().clamp(0, 255) as u8)
}
