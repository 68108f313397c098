//! HTTP Transport
//!
//! Two ways to talk to the server:
//!
//! - **Direct**: `POST /`, `/mcp` or `/message` with a JSON-RPC body; the
//!   response comes back in the HTTP body.
//! - **HTTP+SSE** (MCP 2024-11-05): `GET /sse` opens a session and first
//!   sends an `endpoint` event naming `/message?sessionId=<id>`. Requests
//!   posted there are answered with `202 Accepted` and the JSON-RPC
//!   response arrives on the session's stream as a `message` event.
//!
//! The listener is bound up front so callers know the port before serving
//! starts (the tunnel needs it).

use super::{McpHandler, Transport};
use crate::{JsonRpcError, McpRequest, McpResponse};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

type ShutdownSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Responses buffered per SSE session before a slow client lags
const SESSION_BUFFER: usize = 64;

/// Open SSE sessions, keyed by session id
#[derive(Default)]
struct SseSessions {
    senders: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl SseSessions {
    fn open(&self) -> (String, broadcast::Receiver<String>) {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let (tx, rx) = broadcast::channel(SESSION_BUFFER);
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), tx);
        (id, rx)
    }

    fn sender(&self, id: &str) -> Option<broadcast::Sender<String>> {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn close(&self, id: &str) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Drops the session when its stream is dropped (client disconnected)
struct SessionGuard {
    id: String,
    sessions: Arc<SseSessions>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.close(&self.id);
        info!(session = %self.id, "SSE client disconnected");
    }
}

/// Shared state for HTTP handlers
struct HttpState<H> {
    handler: Arc<H>,
    sessions: Arc<SseSessions>,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// HTTP transport on a pre-bound listener
pub struct HttpTransport {
    listener: TcpListener,
    shutdown: Option<ShutdownSignal>,
}

impl HttpTransport {
    /// Bind `addr` (e.g. `127.0.0.1:8000`)
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        Ok(Self::from_listener(listener))
    }

    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listener,
            shutdown: None,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Stop accepting and drain in-flight requests once `signal` resolves
    pub fn with_shutdown<F>(mut self, signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shutdown = Some(Box::pin(signal));
        self
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn serve<H: McpHandler + 'static>(self, handler: Arc<H>) -> Result<()> {
        let addr = self.local_addr()?;
        let app = router(handler);

        info!(addr = %addr, "HTTP transport listening");

        match self.shutdown {
            Some(signal) => {
                axum::serve(self.listener, app)
                    .with_graceful_shutdown(signal)
                    .await?
            }
            None => axum::serve(self.listener, app).await?,
        }

        info!(addr = %addr, "HTTP transport stopped");
        Ok(())
    }
}

/// Routes for an MCP handler
pub fn router<H: McpHandler + 'static>(handler: Arc<H>) -> Router {
    let state = Arc::new(HttpState {
        handler,
        sessions: Arc::new(SseSessions::default()),
    });

    Router::new()
        .route("/", get(root_handler).post(mcp_handler::<H>))
        .route("/mcp", post(mcp_handler::<H>))
        .route("/message", post(mcp_handler::<H>))
        .route("/sse", get(sse_handler::<H>))
        .route("/health", get(health_handler::<H>))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

// === Handlers ===

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": crate::SERVER_NAME,
        "version": crate::SERVER_VERSION,
        "protocol": crate::PROTOCOL_VERSION,
        "endpoints": {
            "mcp": "POST /mcp",
            "sse": "GET /sse",
            "message": "POST /message?sessionId=<id>",
            "health": "GET /health"
        }
    }))
}

async fn health_handler<H: McpHandler>(State(state): State<Arc<HttpState<H>>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": crate::SERVER_NAME,
        "version": crate::SERVER_VERSION,
        "sse_sessions": state.sessions.len()
    }))
}

async fn mcp_handler<H: McpHandler>(
    State(state): State<Arc<HttpState<H>>>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    // Resolve the session first so an unknown id fails before any work
    let session = match &query.session_id {
        Some(id) => match state.sessions.sender(id) {
            Some(tx) => Some((id.as_str(), tx)),
            None => {
                warn!(session = %id, "Message for unknown SSE session");
                return (StatusCode::NOT_FOUND, format!("Unknown session: {}", id))
                    .into_response();
            }
        },
        None => None,
    };

    let response = match serde_json::from_slice::<McpRequest>(&body) {
        Ok(request) => {
            debug!(method = %request.method, session = ?query.session_id, "HTTP MCP request");
            let notification = request.is_notification();
            let response = state.handler.handle_request(request).await;
            if notification {
                return StatusCode::ACCEPTED.into_response();
            }
            response
        }
        Err(e) => {
            debug!(error = %e, "Unparseable HTTP MCP request");
            McpResponse::error(None, JsonRpcError::parse_error(e.to_string()))
        }
    };

    match session {
        Some((id, tx)) => {
            match serde_json::to_string(&response) {
                Ok(text) => {
                    if tx.send(text).is_err() {
                        warn!(session = %id, "SSE session closed before response was sent");
                    }
                }
                Err(e) => warn!(session = %id, error = %e, "Failed to encode response"),
            }
            StatusCode::ACCEPTED.into_response()
        }
        None => Json(response).into_response(),
    }
}

async fn sse_handler<H: McpHandler>(
    State(state): State<Arc<HttpState<H>>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = state.sessions.open();
    info!(session = %id, "SSE client connected");

    let endpoint = stream::iter(vec![Ok::<_, Infallible>(
        Event::default()
            .event("endpoint")
            .data(format!("/message?sessionId={}", id)),
    )]);

    let guard = SessionGuard {
        id,
        sessions: state.sessions.clone(),
    };
    let messages = BroadcastStream::new(rx).filter_map(move |item| {
        let _session = &guard;
        futures::future::ready(match item {
            Ok(data) => Some(Ok(Event::default().event("message").data(data))),
            // lagged: skip what was dropped
            Err(_) => None,
        })
    });

    Sse::new(endpoint.chain(messages)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keepalive"),
    )
}
