//! Capability Interface
//!
//! A capability is a named function from input text to an encoded
//! envelope. Tools and resources share the same signature and differ only
//! in how the server exposes them.

use async_trait::async_trait;
use edu_core::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Argument carrying the input text in `tools/call` and resource URIs
pub const INPUT_ARGUMENT: &str = "input_text";

/// How the server exposes a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Resource,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Tool => write!(f, "tool"),
            CapabilityKind::Resource => write!(f, "resource"),
        }
    }
}

/// Capability trait - implement this to expose an operation
#[async_trait]
pub trait Capability: Send + Sync {
    /// Stable discovery name
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    fn kind(&self) -> CapabilityKind;

    /// What the input text means, shown in the input schema
    fn input_description(&self) -> &str {
        "Input text"
    }

    /// JSON schema for the capability's arguments
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                INPUT_ARGUMENT: {
                    "type": "string",
                    "description": self.input_description()
                }
            },
            "required": [INPUT_ARGUMENT]
        })
    }

    /// Run the capability on `input`
    async fn invoke(&self, input: &str) -> Result<String>;
}

pub type BoxedCapability = Arc<dyn Capability>;
