//! Lowering of finished workflows.
//!
//! Two shapes are produced: the structured full-scope object (a stable, engine
//! independent view of everything the builder accumulated) and the Argo
//! `WorkflowTemplate` manifest.

mod full_scope;
mod manifest;

pub use full_scope::full_scope;
pub use manifest::{
    manifest, Arguments, ContainerManifest, DagManifest, EnvVar, InvocationManifest,
    ManifestMetadata, ManifestTemplate, OutputEntry, OutputList, ParameterEntry, ParameterList,
    ResourceManifest, SequenceManifest, TemplateRefManifest, ValueFrom, WorkflowManifest,
    WorkflowSpec,
};

use crate::core::error::{BuildError, BuildResult};
use crate::core::types::OutputFormat;
use crate::core::workflow_builder::expression::Expr;
use crate::core::workflow_builder::value_type::ValueType;

pub const DEFAULT_API_VERSION: &str = "argoproj.io/v1alpha1";
pub const DEFAULT_KIND: &str = "WorkflowTemplate";
pub const SUPPORTED_KINDS: [&str; 3] = ["WorkflowTemplate", "ClusterWorkflowTemplate", "Workflow"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub api_version: String,
    pub kind: String,
    pub format: OutputFormat,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            api_version: DEFAULT_API_VERSION.to_string(),
            kind: DEFAULT_KIND.to_string(),
            format: OutputFormat::Yaml,
        }
    }
}

impl RenderOptions {
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

/// Conditions were type-checked at construction; a non-boolean here is a builder bug.
pub(crate) fn checked_condition(expr: &Expr) -> BuildResult<String> {
    if expr.value_type() != &ValueType::Boolean {
        return Err(BuildError::internal(format!(
            "condition of type {} reached the renderer",
            expr.value_type()
        )));
    }
    let text = crate::core::workflow_builder::expression::render::condition(expr);
    tracing::trace!(condition = %text, "lowered condition");
    Ok(text)
}
