//! Panel agent binary.

use std::process::ExitCode;

use clap::Parser;

use panel_agent::{cli, AgentArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let args = AgentArgs::parse();

    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
