//! Capability Registry
//!
//! Filled once at startup and then handed to the server, which only reads
//! from it. There is no deregistration.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::capability::{BoxedCapability, CapabilityKind};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} '{name}' is already registered")]
    Duplicate { kind: CapabilityKind, name: String },
}

/// Named tools and resources
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: BTreeMap<String, BoxedCapability>,
    resources: BTreeMap<String, BoxedCapability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its own name and kind
    pub fn register(&mut self, capability: BoxedCapability) -> Result<(), RegistryError> {
        let kind = capability.kind();
        let name = capability.name().to_string();

        let slot = match kind {
            CapabilityKind::Tool => &mut self.tools,
            CapabilityKind::Resource => &mut self.resources,
        };

        if slot.contains_key(&name) {
            return Err(RegistryError::Duplicate { kind, name });
        }

        debug!(kind = %kind, name = %name, "Registered capability");
        slot.insert(name, capability);
        Ok(())
    }

    pub fn tool(&self, name: &str) -> Option<&BoxedCapability> {
        self.tools.get(name)
    }

    pub fn resource(&self, name: &str) -> Option<&BoxedCapability> {
        self.resources.get(name)
    }

    /// Tools, ordered by name
    pub fn tools(&self) -> impl Iterator<Item = &BoxedCapability> {
        self.tools.values()
    }

    /// Resources, ordered by name
    pub fn resources(&self) -> impl Iterator<Item = &BoxedCapability> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len() + self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log what is registered
    pub fn log_summary(&self) {
        info!(
            tools = ?self.tools.keys().collect::<Vec<_>>(),
            resources = ?self.resources.keys().collect::<Vec<_>>(),
            "Capabilities registered"
        );
    }
}
