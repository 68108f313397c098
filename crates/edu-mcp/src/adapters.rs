//! Educational Content Capabilities
//!
//! Two thin adapters over a [`ContentBackend`]:
//!
//! | Name | Kind | Envelope |
//! |------|------|----------|
//! | `generate_mcq_tool` | tool | `{"topic": ..., "mcqs": ...}` |
//! | `generate_lesson_plan_resource` | resource | `{"subject": ..., "lesson_plan": ...}` |
//!
//! Neither adapter validates or rewrites its input, and backend errors are
//! passed through as-is.

use async_trait::async_trait;
use edu_core::Result;
use edu_llm::ContentBackend;
use std::sync::Arc;
use tracing::debug;

use crate::capability::{Capability, CapabilityKind};
use crate::codec::encode_envelope;
use crate::registry::{CapabilityRegistry, RegistryError};

/// Multiple-choice question generator, exposed as a tool
pub struct McqTool {
    backend: Arc<dyn ContentBackend>,
}

impl McqTool {
    pub const NAME: &'static str = "generate_mcq_tool";
    pub const DESCRIPTION: &'static str = "Generates multiple-choice questions for any given topic";
    pub const LABEL_KEY: &'static str = "topic";
    pub const OUTPUT_KEY: &'static str = "mcqs";

    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Capability for McqTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        Self::DESCRIPTION
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Tool
    }

    fn input_description(&self) -> &str {
        "The topic on which to generate questions"
    }

    async fn invoke(&self, input: &str) -> Result<String> {
        debug!(topic = %input, "Invoking MCQ backend");
        let mcqs = self.backend.generate_mcq(input).await?;
        Ok(encode_envelope(Self::LABEL_KEY, input, Self::OUTPUT_KEY, &mcqs)?)
    }
}

/// Lesson plan generator, exposed as a resource
pub struct LessonPlanResource {
    backend: Arc<dyn ContentBackend>,
}

impl LessonPlanResource {
    pub const NAME: &'static str = "generate_lesson_plan_resource";
    pub const DESCRIPTION: &'static str = "Returns a detailed lesson plan for a user-specified subject";
    pub const LABEL_KEY: &'static str = "subject";
    pub const OUTPUT_KEY: &'static str = "lesson_plan";

    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Capability for LessonPlanResource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        Self::DESCRIPTION
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Resource
    }

    fn input_description(&self) -> &str {
        "The subject to generate a lesson plan for"
    }

    async fn invoke(&self, input: &str) -> Result<String> {
        debug!(subject = %input, "Invoking lesson plan backend");
        let plan = self.backend.generate_lesson_plan(input).await?;
        Ok(encode_envelope(Self::LABEL_KEY, input, Self::OUTPUT_KEY, &plan)?)
    }
}

/// Register the MCQ tool and the lesson plan resource
pub fn register_default_capabilities(
    registry: &mut CapabilityRegistry,
    backend: Arc<dyn ContentBackend>,
) -> std::result::Result<(), RegistryError> {
    registry.register(Arc::new(McqTool::new(backend.clone())))?;
    registry.register(Arc::new(LessonPlanResource::new(backend)))?;
    Ok(())
}
