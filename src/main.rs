//! Cocina CLI. Evaluates provisioning recipes into a resource plan.

use clap::Parser;
use std::io::IsTerminal;

#[derive(Parser, Debug)]
#[command(
    name = "cocina",
    version,
    about = "Evaluate provisioning recipes into a resource tree and resolve notifications"
)]
struct Cli {
    /// Log level filter (overridden by RUST_LOG)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: cocina::cli::Commands,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    if let Err(e) = cocina::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
