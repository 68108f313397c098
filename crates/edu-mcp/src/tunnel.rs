//! Public Tunnel (ngrok)
//!
//! Talks to the ngrok agent's local API:
//!
//! | Call | Purpose |
//! |------|---------|
//! | `GET /api/tunnels` | readiness check for a spawned agent |
//! | `POST /api/tunnels` | open `{"addr", "proto": "http", "name"}` |
//! | `DELETE /api/tunnels/{name}` | close |
//!
//! A tunnel is an owned value: open it at startup, `close()` it on
//! shutdown. A spawned agent is killed when the tunnel is closed or
//! dropped.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::TunnelSettings;

const READINESS_POLL: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("failed to start ngrok agent '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ngrok agent API at {url} did not come up within {timeout:?}")]
    AgentNotReady { url: String, timeout: Duration },

    #[error("ngrok agent request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("ngrok agent rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("ngrok agent response had no public_url")]
    MissingUrl,
}

/// An open ngrok tunnel
pub struct NgrokTunnel {
    client: Client,
    api_url: String,
    name: String,
    public_url: String,
    agent: Option<Child>,
}

impl NgrokTunnel {
    /// Expose `local_port` publicly
    pub async fn open(settings: &TunnelSettings, local_port: u16) -> Result<Self, TunnelError> {
        // bounds every agent call, readiness polling included
        let client = Client::builder()
            .timeout(settings.agent_start_timeout())
            .build()?;
        let api_url = settings.api_url.trim_end_matches('/').to_string();

        let agent = if settings.spawn_agent {
            let child = spawn_agent(settings)?;
            wait_for_agent(&client, &api_url, settings.agent_start_timeout()).await?;
            Some(child)
        } else {
            None
        };

        let name = format!("edu-mcp-{}", uuid::Uuid::new_v4().simple());
        let body = json!({
            "addr": local_port.to_string(),
            "proto": "http",
            "name": name
        });

        debug!(api = %api_url, name = %name, port = local_port, "Requesting tunnel");

        let response = client
            .post(format!("{}/api/tunnels", api_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TunnelError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: Value = response.json().await?;
        let public_url = created
            .get("public_url")
            .and_then(|u| u.as_str())
            .filter(|u| !u.is_empty())
            .ok_or(TunnelError::MissingUrl)?
            .to_string();

        info!(public_url = %public_url, port = local_port, "Tunnel opened");

        Ok(Self {
            client,
            api_url,
            name,
            public_url,
            agent,
        })
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close the tunnel and stop a spawned agent
    pub async fn close(mut self) -> Result<(), TunnelError> {
        let response = self
            .client
            .delete(format!("{}/api/tunnels/{}", self.api_url, self.name))
            .send()
            .await;

        if let Some(mut agent) = self.agent.take() {
            if let Err(e) = agent.kill().await {
                warn!(error = %e, "Failed to stop ngrok agent");
            }
        }

        let response = response?;
        let status = response.status();
        if !(status.is_success() || status == StatusCode::NOT_FOUND) {
            let body = response.text().await.unwrap_or_default();
            return Err(TunnelError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(name = %self.name, "Tunnel closed");
        Ok(())
    }
}

fn spawn_agent(settings: &TunnelSettings) -> Result<Child, TunnelError> {
    let mut command = Command::new(&settings.ngrok_path);
    command
        .args(["start", "--none", "--log", "stdout"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    if let Some(token) = &settings.authtoken {
        command.env("NGROK_AUTHTOKEN", token);
    }

    info!(path = %settings.ngrok_path, "Starting ngrok agent");

    command.spawn().map_err(|source| TunnelError::Spawn {
        path: settings.ngrok_path.clone(),
        source,
    })
}

/// Poll the agent API until it answers or `timeout` elapses
async fn wait_for_agent(client: &Client, api_url: &str, timeout: Duration) -> Result<(), TunnelError> {
    let started = Instant::now();
    let tunnels_url = format!("{}/api/tunnels", api_url);

    loop {
        match client.get(&tunnels_url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(elapsed = ?started.elapsed(), "ngrok agent ready");
                return Ok(());
            }
            Ok(response) => debug!(status = %response.status(), "ngrok agent not ready"),
            Err(e) => debug!(error = %e, "ngrok agent not reachable yet"),
        }

        if started.elapsed() >= timeout {
            return Err(TunnelError::AgentNotReady {
                url: api_url.to_string(),
                timeout,
            });
        }
        tokio::time::sleep(READINESS_POLL).await;
    }
}
