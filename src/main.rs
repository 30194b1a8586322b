use clap::Parser;
use fxpilot::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
