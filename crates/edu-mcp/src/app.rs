//! Application wiring
//!
//! Builds the backend, registry and server from [`Settings`] and runs them
//! on a transport. Startup order for HTTP:
//!
//! 1. bind the listener (fatal on failure)
//! 2. open the ngrok tunnel if enabled (fatal on failure, no retry)
//! 3. print the public URL to stdout
//! 4. serve until the shutdown signal, then close the tunnel

use anyhow::{Context, Result};
use edu_llm::{
    ContentBackend, GenerationOptions, LlmContentBackend, OpenAiCompatClient, TimeoutBackend,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::register_default_capabilities;
use crate::config::Settings;
use crate::registry::CapabilityRegistry;
use crate::server::{McpServer, McpServerConfig};
use crate::transport::{HttpTransport, StdioTransport, Transport};
use crate::tunnel::NgrokTunnel;

/// A fully wired server, not yet bound to a transport
pub struct App {
    settings: Settings,
    server: Arc<McpServer>,
}

impl App {
    /// Build with the OpenAI-compatible backend described by `settings`
    pub fn build(settings: Settings) -> Result<Self> {
        let client = llm_client(&settings)?;
        info!(
            base_url = %client.base_url(),
            model = %settings.llm.model,
            "Using LLM backend"
        );

        let options = GenerationOptions {
            model: settings.llm.model.clone(),
            temperature: settings.llm.temperature,
            max_tokens: settings.llm.max_tokens,
            num_questions: settings.llm.num_questions,
        };
        let backend: Arc<dyn ContentBackend> = Arc::new(LlmContentBackend::new(client, options));

        Self::with_backend(settings, backend)
    }

    /// Build around an existing backend
    pub fn with_backend(settings: Settings, backend: Arc<dyn ContentBackend>) -> Result<Self> {
        let timeout = settings.backend.timeout();
        match timeout {
            Some(t) => info!(timeout = ?t, "Backend deadline enabled"),
            None => info!("No backend deadline"),
        }
        let backend: Arc<dyn ContentBackend> = Arc::new(TimeoutBackend::new(backend, timeout));

        let mut registry = CapabilityRegistry::new();
        register_default_capabilities(&mut registry, backend)
            .context("failed to register capabilities")?;
        registry.log_summary();

        let config = McpServerConfig {
            name: Some(settings.server.name.clone()),
        };
        let server = Arc::new(McpServer::new(config, registry));

        Ok(Self { settings, server })
    }

    pub fn server(&self) -> &Arc<McpServer> {
        &self.server
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Bind the HTTP listener and open the tunnel
    pub async fn bind_http(self) -> Result<HttpApp> {
        let addr = self.settings.server.bind_addr();
        let transport = HttpTransport::bind(&addr).await?;
        let local_addr = transport.local_addr()?;

        let tunnel = if self.settings.tunnel.enabled {
            let tunnel = NgrokTunnel::open(&self.settings.tunnel, local_addr.port())
                .await
                .context("failed to open ngrok tunnel")?;
            Some(tunnel)
        } else {
            info!("Tunnel disabled");
            None
        };

        Ok(HttpApp {
            server: self.server,
            transport,
            tunnel,
            local_addr,
        })
    }

    /// Bind, announce and serve over HTTP until `shutdown` resolves
    pub async fn run_http<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.bind_http().await?;
        println!("✅ MCP Server is running at: {}", app.public_url());
        app.serve(shutdown).await
    }

    /// Serve newline-delimited JSON-RPC on stdin/stdout
    pub async fn run_stdio(self) -> Result<()> {
        StdioTransport::new().serve(self.server).await
    }
}

/// A bound HTTP server with its tunnel, ready to serve
pub struct HttpApp {
    server: Arc<McpServer>,
    transport: HttpTransport,
    tunnel: Option<NgrokTunnel>,
    local_addr: SocketAddr,
}

impl HttpApp {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Tunnel URL, or the local address when running without one
    pub fn public_url(&self) -> String {
        match &self.tunnel {
            Some(tunnel) => tunnel.public_url().to_string(),
            None => format!("http://{}", self.local_addr),
        }
    }

    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let served = self
            .transport
            .with_shutdown(shutdown)
            .serve(self.server)
            .await;

        if let Some(tunnel) = self.tunnel {
            if let Err(e) = tunnel.close().await {
                warn!(error = %e, "Failed to close tunnel");
            }
        }

        served
    }
}

/// Settings first, then `OPENAI_BASE_URL` / `OPENAI_API_KEY`
fn llm_client(settings: &Settings) -> Result<OpenAiCompatClient> {
    let client = match &settings.llm.base_url {
        Some(base_url) => {
            let client = OpenAiCompatClient::new(base_url.as_str());
            match std::env::var("OPENAI_API_KEY") {
                Ok(key) if !key.is_empty() => client.with_api_key(key),
                _ => client,
            }
        }
        None => OpenAiCompatClient::from_env(),
    };

    let client = match &settings.llm.api_key {
        Some(key) => client.with_api_key(key.as_str()),
        None => client,
    };

    client
        .with_timeout(settings.llm.request_timeout())
        .context("failed to configure LLM client")
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}
