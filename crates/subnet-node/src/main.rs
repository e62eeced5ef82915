mod config;
mod error;
mod graceful_shutdown;
mod identity;
mod rpc_server;
mod service;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use service::NodeService;
use tracing::info;

#[derive(Parser)]
#[clap(name = "subnet-node")]
#[clap(author, version, about = "Subnet node runtime: consensus, commit-reveal, and authenticated RPC", long_about = None)]
struct Cli {
    /// Configuration file path
    #[clap(short, long, value_name = "FILE", default_value = "config.toml")]
    config: String,

    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start,

    /// Write a default configuration file
    Init {
        #[clap(short, long, default_value = "config.toml")]
        output: String,
    },

    /// Show node version
    Version,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { output }) => init_config(&output)?,
        Some(Commands::Version) => show_version(),
        Some(Commands::Start) | None => start_node(&cli.config).await?,
    }

    Ok(())
}

fn init_config(output: &str) -> Result<()> {
    let config = Config::default();
    config.to_file(output)?;
    println!("configuration file created: {output}");
    Ok(())
}

fn show_version() {
    println!("subnet-node {}", env!("CARGO_PKG_VERSION"));
}

async fn start_node(config_path: &str) -> Result<()> {
    let config = if std::path::Path::new(config_path).exists() {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    init_logging(&config)?;
    info!(public_name = %config.node.public_name, "starting subnet node");

    let mut service = NodeService::new(config).await?;
    service.start().await?;
    service.wait_for_shutdown().await?;

    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    Ok(())
}
