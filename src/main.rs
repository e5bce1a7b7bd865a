//! Deskpet - Command-line tool for indexing, packing and playing desktop pet animations

use std::process::ExitCode;

use deskpet::cli;

fn main() -> ExitCode {
    cli::run()
}
