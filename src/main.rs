//! Binary entrypoint that launches the Lexcitator server.

use std::process::ExitCode;

use lexcitator::bootstrap;

fn main() -> ExitCode {
    bootstrap::run()
}
