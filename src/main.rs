mod assistant;
mod config;
mod context;
mod logging;
mod run;
mod server;
mod session;
mod tools;

#[cfg(test)]
mod test_utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::logging::init_logging;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "assistant-relay",
    version,
    about = "HTTP relay between a chat client and a hosted assistant"
)]
pub struct Cli {
    /// Address to listen on (default 127.0.0.1:3000)
    #[arg(long)]
    listen: Option<String>,

    /// Assistants API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// API key (set via env OPENAI_API_KEY recommended)
    #[arg(long)]
    api_key: Option<String>,

    /// Assistant to start runs with
    #[arg(long)]
    assistant_id: Option<String>,

    /// Explicit config file, replacing the global one
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (error,warn,info,debug,trace)
    #[arg(long, env = "RELAY_LOG", default_value = "info")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_file.as_deref())?;

    let cfg = AppConfig::from_cli(&cli)?;
    info!(
        base_url = %cfg.base_url,
        listen = %cfg.listen,
        assistant_id = ?cfg.assistant_id,
        "app config"
    );

    let shutdown = CancellationToken::new();
    let ctx = AppContext::from_config(&cfg, shutdown.clone())?;
    info!(tools = ?ctx.registry.names(), "tools registered");

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        shutdown.cancel();
    });

    server::serve(ctx, &cfg.listen).await
}
