use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridcalc::config::DEFAULT_PORT;
use gridcalc::{ComputeServer, ServerConfig};

#[derive(Parser)]
#[command(name = "gridcalc")]
#[command(about = "Line-oriented TCP server evaluating expressions over value spaces", long_about = None)]
struct Cli {
    /// TCP port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::new().with_port(cli.port);
    info!(port = cli.port, workers = config.worker_threads(), "starting gridcalc");

    let mut server = ComputeServer::new(config)?;
    server
        .bind()
        .await
        .with_context(|| format!("failed to bind port {}", cli.port))?;
    server.start().await?;
    Ok(())
}
