use clap::Parser;
use fxsweep::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
