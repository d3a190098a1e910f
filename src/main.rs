//! Binary entrypoint that compacts a transcript file.

use std::process::ExitCode;

use thread_memory::cli;

/// Compact the transcript named on the command line and print it as JSON.
fn main() -> ExitCode {
    cli::run()
}
