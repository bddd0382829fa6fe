use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tls_forward::config::{load_dotenv, Config};
use tls_forward::engine::RustlsEngine;
use tls_forward::{ForwardServer, Forwarder};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tls-forward", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "TLS_FORWARD_CONFIG")]
    config: Option<String>,

    /// Listen host, overrides the configuration file
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Listen port, overrides the configuration file
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Before argument parsing so SERVER_HOST and SERVER_PORT can come from .env
    let env_file = load_dotenv();
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(ref path) = env_file {
        info!("Loaded environment from {}", path.display());
    }

    let config = match args.config {
        Some(ref path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from '{path}'"))?,
        None => Config::default(),
    }
    .with_overrides(args.host, args.port);
    config.validate()?;

    let profiles = Arc::new(config.profile_table()?);
    info!(
        "Loaded {} client profiles: {}",
        profiles.len(),
        profiles.names().join(", ")
    );

    let forwarder = Forwarder::new(profiles, Arc::new(RustlsEngine::new()));
    let server = ForwardServer::new(config, forwarder);

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
