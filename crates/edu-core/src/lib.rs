//! edu-core: Shared types for the edu-mcp workspace
//!
//! - [`error`]: the error taxonomy shared by the backend and the MCP layer
//! - [`env`]: environment file loading used at process startup

pub mod env;
pub mod error;

pub use env::load_environment;
pub use error::{BackendError, CapabilityError, Result};
