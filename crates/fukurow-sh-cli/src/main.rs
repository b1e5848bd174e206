//! Classifier CLI main entry point

use anyhow::Result;
use clap::Parser;
use fukurow_sh_cli::commands::{Cli, CommandExecutor};

fn main() -> Result<()> {
    // Initialize tracing; stdout carries the hierarchy
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut executor = CommandExecutor::new();
    let result = executor.execute(cli.command)?;

    if result.success {
        eprintln!("{}", result.message);
        std::process::exit(0);
    } else {
        eprintln!("Error: {}", result.message);
        std::process::exit(1);
    }
}
