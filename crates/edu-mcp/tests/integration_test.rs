//! Integration tests for the edu-mcp server: JSON-RPC, HTTP router and
//! the bound application with a tunnel.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::{Path, State},
        http::{Request, StatusCode},
        routing::{delete, post},
        Json, Router,
    };
    use edu_core::BackendError;
    use edu_llm::{ContentBackend, GenerationResult};
    use edu_mcp::{
        server::resource_uri_with_input, transport::router, App, McpRequest, McpServer, Settings,
    };
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Returns fixed content regardless of input
    struct StubBackend;

    #[async_trait]
    impl ContentBackend for StubBackend {
        async fn generate_mcq(&self, _topic: &str) -> Result<GenerationResult, BackendError> {
            Ok(json!([{ "q": "2+2=?", "options": ["3", "4"], "answer": "4" }]))
        }

        async fn generate_lesson_plan(&self, _subject: &str) -> Result<GenerationResult, BackendError> {
            Ok(json!({ "title": "Cell Biology", "sections": ["Intro", "Mitosis"] }))
        }
    }

    struct DownBackend;

    #[async_trait]
    impl ContentBackend for DownBackend {
        async fn generate_mcq(&self, _topic: &str) -> Result<GenerationResult, BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }

        async fn generate_lesson_plan(&self, _subject: &str) -> Result<GenerationResult, BackendError> {
            Err(BackendError::generation_failed("model returned prose"))
        }
    }

    fn local_settings() -> Settings {
        let mut settings = Settings::default();
        settings.server.port = 0;
        settings.tunnel.enabled = false;
        settings
    }

    fn server_with(backend: Arc<dyn ContentBackend>) -> Arc<McpServer> {
        App::with_backend(local_settings(), backend).unwrap().server().clone()
    }

    fn call_tool(id: i64, input: &str) -> McpRequest {
        McpRequest::new("tools/call").with_id(json!(id)).with_params(json!({
            "name": "generate_mcq_tool",
            "arguments": { "input_text": input }
        }))
    }

    fn read_resource(id: i64, input: &str) -> McpRequest {
        McpRequest::new("resources/read").with_id(json!(id)).with_params(json!({
            "uri": resource_uri_with_input("generate_lesson_plan_resource", input)
        }))
    }

    fn tool_text(result: &Value) -> &str {
        result["content"][0]["text"].as_str().unwrap()
    }

    #[tokio::test]
    async fn test_mcp_initialize() {
        let server = server_with(Arc::new(StubBackend));
        let request = McpRequest::new("initialize").with_id(json!(1)).with_params(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0.0" }
        }));

        let response = server.handle_request(request).await;

        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "edu-mcp");
    }

    #[tokio::test]
    async fn test_tools_and_resources_listed() {
        let server = server_with(Arc::new(StubBackend));

        let tools = server
            .handle_request(McpRequest::new("tools/list").with_id(json!(1)))
            .await
            .result
            .unwrap();
        let tools = tools["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "generate_mcq_tool");
        assert_eq!(
            tools[0]["description"],
            "Generates multiple-choice questions for any given topic"
        );
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["input_text"]));

        let resources = server
            .handle_request(McpRequest::new("resources/list").with_id(json!(2)))
            .await
            .result
            .unwrap();
        let resources = resources["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0]["uri"], "edu://generate_lesson_plan_resource");
        assert_eq!(
            resources[0]["description"],
            "Returns a detailed lesson plan for a user-specified subject"
        );

        let templates = server
            .handle_request(McpRequest::new("resources/templates/list").with_id(json!(3)))
            .await
            .result
            .unwrap();
        assert_eq!(
            templates["resourceTemplates"][0]["uriTemplate"],
            "edu://generate_lesson_plan_resource{?input_text}"
        );
    }

    #[tokio::test]
    async fn test_algebra_mcq_envelope() {
        let server = server_with(Arc::new(StubBackend));

        let response = server.handle_request(call_tool(1, "Algebra")).await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);

        let expected = serde_json::to_string_pretty(&json!({
            "topic": "Algebra",
            "mcqs": [{ "q": "2+2=?", "options": ["3", "4"], "answer": "4" }]
        }))
        .unwrap();
        assert_eq!(tool_text(&result), expected);
    }

    #[tokio::test]
    async fn test_biology_lesson_plan_envelope() {
        let server = server_with(Arc::new(StubBackend));

        let response = server.handle_request(read_resource(1, "Biology")).await;
        let result = response.result.unwrap();
        let content = &result["contents"][0];
        assert_eq!(content["mimeType"], "application/json");

        let expected = serde_json::to_string_pretty(&json!({
            "subject": "Biology",
            "lesson_plan": { "title": "Cell Biology", "sections": ["Intro", "Mitosis"] }
        }))
        .unwrap();
        assert_eq!(content["text"], expected);
    }

    #[tokio::test]
    async fn test_resource_input_from_arguments() {
        let server = server_with(Arc::new(StubBackend));
        let request = McpRequest::new("resources/read").with_id(json!(1)).with_params(json!({
            "uri": "edu://generate_lesson_plan_resource",
            "arguments": { "input_text": "" }
        }));

        let result = server.handle_request(request).await.result.unwrap();
        let text = result["contents"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["subject"], "");
    }

    #[tokio::test]
    async fn test_resource_query_echoes_plus_and_space() {
        let server = server_with(Arc::new(StubBackend));

        let cases = [
            ("edu://generate_lesson_plan_resource?input_text=C++", "C++"),
            ("edu://generate_lesson_plan_resource?input_text=a%20b", "a b"),
            ("edu://generate_lesson_plan_resource?input_text=a b", "a b"),
        ];
        for (id, (uri, subject)) in cases.into_iter().enumerate() {
            let request = McpRequest::new("resources/read")
                .with_id(json!(id))
                .with_params(json!({ "uri": uri }));
            let result = server.handle_request(request).await.result.unwrap();
            let text = result["contents"][0]["text"].as_str().unwrap();
            let parsed: Value = serde_json::from_str(text).unwrap();
            assert_eq!(parsed["subject"], subject, "uri: {}", uri);
        }

        let result = server.handle_request(read_resource(9, "C++ & Rust")).await.result.unwrap();
        let text = result["contents"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["subject"], "C++ & Rust");
    }

    #[tokio::test]
    async fn test_backend_failure_reported() {
        let server = server_with(Arc::new(DownBackend));

        let result = server
            .handle_request(call_tool(1, "Algebra"))
            .await
            .result
            .unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["_meta"]["errorKind"], "backend");
        assert!(tool_text(&result).contains("connection refused"));

        let error = server
            .handle_request(read_resource(2, "Biology"))
            .await
            .error
            .unwrap();
        assert_eq!(error.code, -32603);
        assert!(error.message.contains("model returned prose"));
        assert_eq!(error.data.unwrap()["errorKind"], "backend");
    }

    #[tokio::test]
    async fn test_invalid_calls() {
        let server = server_with(Arc::new(StubBackend));

        let unknown_tool = McpRequest::new("tools/call")
            .with_id(json!(1))
            .with_params(json!({ "name": "nope", "arguments": { "input_text": "x" } }));
        assert_eq!(server.handle_request(unknown_tool).await.error.unwrap().code, -32602);

        let missing_input = McpRequest::new("tools/call")
            .with_id(json!(2))
            .with_params(json!({ "name": "generate_mcq_tool", "arguments": {} }));
        assert_eq!(server.handle_request(missing_input).await.error.unwrap().code, -32602);

        let missing_resource_input = McpRequest::new("resources/read")
            .with_id(json!(5))
            .with_params(json!({ "uri": "edu://generate_lesson_plan_resource" }));
        let error = server.handle_request(missing_resource_input).await.error.unwrap();
        assert_eq!(error.code, -32602);
        assert_eq!(error.data.unwrap()["errorKind"], "invalid_input");

        let unknown_resource = McpRequest::new("resources/read")
            .with_id(json!(3))
            .with_params(json!({ "uri": "edu://nope?input_text=x" }));
        assert_eq!(server.handle_request(unknown_resource).await.error.unwrap().code, -32002);

        let unknown_method = McpRequest::new("prompts/list").with_id(json!(4));
        assert_eq!(server.handle_request(unknown_method).await.error.unwrap().code, -32601);
    }

    // === HTTP router ===

    async fn post_json(app: Router, path: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::post(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_http_tools_call() {
        let app = router(server_with(Arc::new(StubBackend)));
        let body = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": "generate_mcq_tool", "arguments": { "input_text": "Algebra" } }
        });

        let (status, bytes) = post_json(app, "/mcp", &body.to_string()).await;
        assert_eq!(status, StatusCode::OK);

        let response: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(response["id"], 7);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let envelope: Value = serde_json::from_str(text).unwrap();
        assert_eq!(envelope["topic"], "Algebra");
    }

    #[tokio::test]
    async fn test_http_parse_error_and_notification() {
        let server = server_with(Arc::new(StubBackend));

        let (status, bytes) = post_json(router(server.clone()), "/", "{not json").await;
        assert_eq!(status, StatusCode::OK);
        let response: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(response["error"]["code"], -32700);

        let notification = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        let (status, _) = post_json(router(server), "/message", &notification.to_string()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_http_health() {
        let app = router(server_with(Arc::new(StubBackend)));
        let request = Request::get("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health["status"], "ok");
    }

    // === HTTP+SSE sessions ===

    /// Next `(event, data)` from an SSE body, skipping keepalive comments
    async fn next_event(response: &mut reqwest::Response, buffer: &mut String) -> (String, String) {
        loop {
            if let Some(end) = buffer.find("\n\n") {
                let block: String = buffer.drain(..end + 2).collect();
                let mut event = String::new();
                let mut data = String::new();
                for line in block.lines() {
                    if let Some(v) = line.strip_prefix("event:") {
                        event = v.trim().to_string();
                    } else if let Some(v) = line.strip_prefix("data:") {
                        data.push_str(v.trim_start());
                    }
                }
                if event.is_empty() && data.is_empty() {
                    continue;
                }
                return (event, data);
            }

            let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
                .await
                .expect("no SSE event within 5s")
                .unwrap()
                .expect("SSE stream ended");
            buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }

    async fn spawn_router(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_sse_session_delivers_responses() {
        let base = spawn_router(router(server_with(Arc::new(StubBackend)))).await;
        let client = reqwest::Client::new();

        let mut stream = client.get(format!("{}/sse", base)).send().await.unwrap();
        assert_eq!(stream.status(), reqwest::StatusCode::OK);
        let mut buffer = String::new();

        let (event, endpoint) = next_event(&mut stream, &mut buffer).await;
        assert_eq!(event, "endpoint");
        assert!(endpoint.starts_with("/message?sessionId="), "endpoint: {}", endpoint);

        let posted = client
            .post(format!("{}{}", base, endpoint))
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": { "name": "generate_mcq_tool", "arguments": { "input_text": "Algebra" } }
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(posted.status(), reqwest::StatusCode::ACCEPTED);

        let (event, data) = next_event(&mut stream, &mut buffer).await;
        assert_eq!(event, "message");
        let response: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(response["id"], 1);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let envelope: Value = serde_json::from_str(text).unwrap();
        assert_eq!(envelope["topic"], "Algebra");

        // notifications are accepted without anything on the stream
        let notified = client
            .post(format!("{}{}", base, endpoint))
            .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .send()
            .await
            .unwrap();
        assert_eq!(notified.status(), reqwest::StatusCode::ACCEPTED);

        let pinged = client
            .post(format!("{}{}", base, endpoint))
            .json(&json!({ "jsonrpc": "2.0", "id": 2, "method": "ping" }))
            .send()
            .await
            .unwrap();
        assert_eq!(pinged.status(), reqwest::StatusCode::ACCEPTED);
        let (_, data) = next_event(&mut stream, &mut buffer).await;
        let response: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(response["id"], 2);
    }

    #[tokio::test]
    async fn test_sse_sessions_are_separate() {
        let base = spawn_router(router(server_with(Arc::new(StubBackend)))).await;
        let client = reqwest::Client::new();

        let mut first = client.get(format!("{}/sse", base)).send().await.unwrap();
        let mut first_buf = String::new();
        let (_, first_endpoint) = next_event(&mut first, &mut first_buf).await;

        let mut second = client.get(format!("{}/sse", base)).send().await.unwrap();
        let mut second_buf = String::new();
        let (_, second_endpoint) = next_event(&mut second, &mut second_buf).await;
        assert_ne!(first_endpoint, second_endpoint);

        for (endpoint, id) in [(&second_endpoint, 20), (&first_endpoint, 10)] {
            let status = client
                .post(format!("{}{}", base, endpoint))
                .json(&json!({ "jsonrpc": "2.0", "id": id, "method": "ping" }))
                .send()
                .await
                .unwrap()
                .status();
            assert_eq!(status, reqwest::StatusCode::ACCEPTED);
        }

        let (_, data) = next_event(&mut first, &mut first_buf).await;
        assert_eq!(serde_json::from_str::<Value>(&data).unwrap()["id"], 10);
        let (_, data) = next_event(&mut second, &mut second_buf).await;
        assert_eq!(serde_json::from_str::<Value>(&data).unwrap()["id"], 20);
    }

    #[tokio::test]
    async fn test_message_for_unknown_session() {
        let app = router(server_with(Arc::new(StubBackend)));
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });

        let (status, _) = post_json(app, "/message?sessionId=missing", &body.to_string()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // === Bound application with a fake ngrok agent ===

    #[derive(Clone, Default)]
    struct FakeAgent {
        closed: Arc<Mutex<Vec<String>>>,
    }

    async fn open_tunnel(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({ "name": body["name"], "public_url": "https://edu-app.ngrok.app" }))
    }

    async fn close_tunnel(State(agent): State<FakeAgent>, Path(name): Path<String>) -> StatusCode {
        agent.closed.lock().unwrap().push(name);
        StatusCode::NO_CONTENT
    }

    #[tokio::test]
    async fn test_app_serves_through_tunnel_and_closes_it() {
        let agent = FakeAgent::default();
        let agent_app = Router::new()
            .route("/api/tunnels", post(open_tunnel))
            .route("/api/tunnels/:name", delete(close_tunnel))
            .with_state(agent.clone());
        let agent_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let agent_addr = agent_listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(agent_listener, agent_app).await.unwrap();
        });

        let mut settings = local_settings();
        settings.tunnel.enabled = true;
        settings.tunnel.api_url = format!("http://{}", agent_addr);

        let app = App::with_backend(settings, Arc::new(StubBackend)).unwrap();
        let http = app.bind_http().await.unwrap();
        assert_eq!(http.public_url(), "https://edu-app.ngrok.app");

        let local = http.local_addr();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let serving = tokio::spawn(http.serve(async move {
            let _ = stop_rx.await;
        }));

        let response: Value = reqwest::Client::new()
            .post(format!("http://{}/mcp", local))
            .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["result"]["tools"][0]["name"], "generate_mcq_tool");

        stop_tx.send(()).unwrap();
        serving.await.unwrap().unwrap();

        let closed = agent.closed.lock().unwrap().clone();
        assert_eq!(closed.len(), 1);
        assert!(closed[0].starts_with("edu-mcp-"));
    }
}
