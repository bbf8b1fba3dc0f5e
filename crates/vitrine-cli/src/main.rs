//! `vitrine` binary entry point.

use std::process::ExitCode;

use clap::Parser;

use vitrine_cli::{CliArgs, VitrineCli};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let cli = match VitrineCli::from_args("vitrine", &args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
