use clap::Parser;
use tracing_subscriber::EnvFilter;

use critical_cli::cli::{Cli, Commands};
use critical_cli::commands;
use critical_cli::error::CliError;
use critical_cli::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable with --output json.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Suppress(args) => commands::suppress::execute(args, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &writer).await,
        Commands::DryRun(args) => commands::dry_run::execute(args, &writer).await,
    }
}
