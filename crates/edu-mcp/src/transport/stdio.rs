//! Stdio Transport
//!
//! Standard MCP transport over stdin/stdout.

use super::{McpHandler, Transport};
use crate::{JsonRpcError, McpRequest, McpResponse};
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

/// Stdio transport - reads JSON-RPC from stdin, writes to stdout
pub struct StdioTransport;

impl StdioTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn serve<H: McpHandler + 'static>(self, handler: Arc<H>) -> Result<()> {
        info!("Starting MCP stdio transport");
        serve_lines(handler, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
        info!("Stdio transport shutting down");
        Ok(())
    }
}

/// One JSON-RPC message per line in, one response per line out.
///
/// Notifications get no response line.
pub(crate) async fn serve_lines<H, R, W>(handler: Arc<H>, reader: R, mut writer: W) -> Result<()>
where
    H: McpHandler + 'static,
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        debug!(request = %line, "Received request");

        let response = match serde_json::from_str::<McpRequest>(line) {
            Ok(request) if request.is_notification() => {
                handler.handle_request(request).await;
                continue;
            }
            Ok(request) => handler.handle_request(request).await,
            Err(e) => {
                error!(error = %e, "Parse error");
                McpResponse::error(None, JsonRpcError::parse_error(e.to_string()))
            }
        };

        let response_json = serde_json::to_string(&response)?;
        debug!(response = %response_json, "Sending response");

        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}
