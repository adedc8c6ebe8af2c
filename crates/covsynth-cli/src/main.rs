//! covsynth: generate unit tests until a branch-coverage target is met
//!
//! ## Usage
//!
//! ```bash
//! covsynth validate scoring.py            # Check the source is in the subset
//! covsynth analyze scoring.py --format json
//! covsynth generate scoring.py --target 90 --max-iterations 5
//! ```

use clap::Parser;
use covsynth_cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    match covsynth_cli::run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
