/* demo/server-rust/src/main.rs */

mod routes;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trellis_server::trellis_kit::KitConfig;
use trellis_server::Server;
use trellis_server_axum::{IntoAxumRouter, ReqwestFetch};

#[derive(Parser)]
#[command(name = "trellis-demo", about = "Serve the Trellis demo app")]
struct Cli {
  /// Address to listen on
  #[arg(short, long, default_value = "127.0.0.1:3000")]
  addr: String,
  /// Path to trellis.toml (defaults are used when omitted)
  #[arg(short, long)]
  config: Option<PathBuf>,
}

fn load_config(path: Option<PathBuf>) -> Result<KitConfig> {
  match path {
    Some(path) => {
      KitConfig::load(&path).with_context(|| format!("failed to load config from {}", path.display()))
    }
    None => Ok(KitConfig::default()),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
    .with(tracing_subscriber::fmt::layer())
    .init();

  let cli = Cli::parse();
  let config = load_config(cli.config)?;
  tracing::info!(base = %config.paths.base, trailing_slash = ?config.trailing_slash, "configuration loaded");

  let store = routes::Store::default();
  let server = routes::install(Server::builder(routes::manifest(&store)?))
    .config(config)
    .external_fetch(std::sync::Arc::new(ReqwestFetch::default()))
    .build()
    .context("failed to build server")?;

  server.serve(&cli.addr).await
}
