// draftbench - experiment runner for generation/evaluation consistency
// Main entry point

use anyhow::Result;
use clap::Parser;

use draftbench::cli::{init_tracing, run_cli, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    run_cli(Cli::parse()).await
}
