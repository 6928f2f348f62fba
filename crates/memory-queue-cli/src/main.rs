use clap::Parser;
use memory_queue_cli::{run_cli, Cli};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Run CLI and map failures to the documented exit codes
    if let Err(e) = run_cli(cli).await {
        error!("CLI error: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
