//! Entry point of the `hmibridged` daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match hmibridged::run_bridge() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr().lock(), "hmibridged: {error}");
            ExitCode::FAILURE
        }
    }
}
