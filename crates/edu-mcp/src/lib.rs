//! edu-mcp: Educational Content MCP Server
//!
//! Exposes two capabilities over the Model Context Protocol:
//!
//! - `generate_mcq_tool` (tool): multiple-choice questions for a topic
//! - `generate_lesson_plan_resource` (resource): a lesson plan for a subject
//!
//! Architecture:
//! HTTP / stdio → MCP JSON-RPC → McpServer → CapabilityRegistry → Capability → ContentBackend
//!
//! Each capability forwards the caller's text to the backend and wraps the
//! result in a two-key JSON envelope (see [`codec`]).

pub mod adapters;
pub mod app;
pub mod capability;
pub mod codec;
pub mod config;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;
pub mod tunnel;

/// MCP protocol revision spoken by this server
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Default server name reported in `initialize`
pub const SERVER_NAME: &str = "edu-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use adapters::{register_default_capabilities, LessonPlanResource, McqTool};
pub use app::{shutdown_signal, App, HttpApp};
pub use capability::{BoxedCapability, Capability, CapabilityKind};
pub use config::Settings;
pub use protocol::{JsonRpcError, McpRequest, McpResponse};
pub use registry::{CapabilityRegistry, RegistryError};
pub use server::{McpServer, McpServerConfig};
pub use tunnel::{NgrokTunnel, TunnelError};
