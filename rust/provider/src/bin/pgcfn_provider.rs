//! Handles a single CloudFormation custom-resource event and prints the
//! response document.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;

#[derive(Parser, Debug)]
#[command(name = "pgcfn-provider", version, about)]
struct Args {
    /// Event JSON to handle. Read from stdin when omitted.
    #[arg(long, env = "PGCFN_EVENT_PATH")]
    event: Option<PathBuf>,
    /// Provider configuration file. Falls back to $CONFIG_PATH, then ./pgcfn_config.yaml.
    #[arg(long)]
    config: Option<String>,
}

async fn read_event(path: Option<&PathBuf>) -> std::io::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path).await,
        None => {
            let mut event = String::new();
            tokio::io::stdin().read_to_string(&mut event).await?;
            Ok(event)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let event = match read_event(args.event.as_ref()).await {
        Ok(event) => event,
        Err(e) => {
            eprintln!("Failed to read event: {e}");
            return ExitCode::FAILURE;
        }
    };
    let result = pgcfn_provider::provider_entrypoint(&event, args.config.as_deref()).await;
    if let Err(e) = pgcfn_provider::flush_tracing().await {
        eprintln!("Failed to flush traces: {e}");
    }
    match serde_json::to_string(&result) {
        Ok(response) => {
            println!("{response}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize response: {e}");
            ExitCode::FAILURE
        }
    }
}
