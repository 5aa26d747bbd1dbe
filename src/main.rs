use clap::Parser;
use hookbus::logger::init_tracing;
use tracing::{error, info};

mod cli;

use cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (mut config, env_file) = cli.common.resolve()?;

    let prefix = match &cli.command {
        Commands::Flavors(args) => return cli::flavors::execute(args),
        Commands::Host(_) => "hookbus-host",
        Commands::Client(_) => "hookbus-client",
    };
    config.log.prefix = prefix.to_string();
    let _guard = init_tracing(&config.log)?;
    if let Some(path) = env_file {
        info!("Loaded .env from {}", path.display());
    }

    let result = match cli.command {
        Commands::Host(args) => cli::host::execute(args, config).await,
        Commands::Client(args) => cli::client::execute(args, config).await,
        Commands::Flavors(_) => Ok(()),
    };
    if let Err(err) = &result {
        error!("{err:#}");
    }
    result
}
