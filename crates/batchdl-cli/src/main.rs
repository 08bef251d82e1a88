//! CLI entry point - the composition root.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use batchdl_cli::{Cli, CliConfig, Commands, bootstrap, handlers};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = CliConfig::from_cli(&cli)?;
    let ctx = bootstrap(config).await?;

    match cli.command {
        Commands::Fetch { downloads } => handlers::fetch::execute(&ctx, downloads).await?,
        Commands::List => handlers::list::execute(&ctx).await?,
        Commands::CancelAll => handlers::cancel::execute(&ctx).await?,
    }

    Ok(())
}
