//! edu-mcp-server: Educational Content MCP Server
//!
//! Usage:
//!   edu-mcp-server                          # HTTP on 127.0.0.1:8000 behind an ngrok tunnel
//!   edu-mcp-server --no-tunnel --port 9000  # local HTTP only
//!   edu-mcp-server --stdio                  # stdio transport (no HTTP, no tunnel)
//!   edu-mcp-server --config edu-mcp.toml --backend-timeout 60
//!
//! The LLM endpoint comes from `[llm]` in the config file or from
//! `OPENAI_BASE_URL` / `OPENAI_API_KEY`, which may also be set in a `.env`.

use anyhow::{Context, Result};
use clap::Parser;
use edu_mcp::{app::shutdown_signal, App, Settings};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "edu-mcp-server")]
#[command(about = "Educational content MCP server (MCQs and lesson plans)")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long, short)]
    port: Option<u16>,

    /// Run stdio transport instead of HTTP
    #[arg(long)]
    stdio: bool,

    /// Serve locally without an ngrok tunnel
    #[arg(long)]
    no_tunnel: bool,

    /// Deadline in seconds for each generation call
    #[arg(long, value_name = "SECS")]
    backend_timeout: Option<u64>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Server name override
    #[arg(long)]
    name: Option<String>,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(name) = &self.name {
            settings.server.name = name.clone();
        }
        if let Some(secs) = self.backend_timeout {
            settings.backend.timeout_secs = Some(secs);
        }
        if self.no_tunnel {
            settings.tunnel.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_file = edu_core::load_environment();

    // stderr keeps stdout free for stdio transport and the startup line
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log level")?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(path) = env_file {
        info!(path = %path, "Loaded environment file");
    }

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    cli.apply(&mut settings);

    info!(
        name = %settings.server.name,
        version = edu_mcp::SERVER_VERSION,
        transport = if cli.stdio { "stdio" } else { "http" },
        "Starting edu-mcp-server"
    );

    let app = App::build(settings)?;

    if cli.stdio {
        app.run_stdio().await
    } else {
        app.run_http(shutdown_signal()).await
    }
}
