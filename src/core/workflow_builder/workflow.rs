//! The top-level builder and the finished, immutable workflow.

use crate::core::error::{BuildError, BuildResult};
use crate::core::types::OutputFormat;
use crate::core::workflow_builder::expression::{Expr, ParamSource};
use crate::core::workflow_builder::params::{workflow_parameters_as_expressions, InputParamDef};
use crate::core::workflow_builder::render::{self, RenderOptions, WorkflowManifest};
use crate::core::workflow_builder::scope::{validate_name, Scope};
use crate::core::workflow_builder::task::TemplateTarget;
use crate::core::workflow_builder::template::{
    Template, TemplateBuilder, TemplateContext, TemplateSignature,
};
use crate::core::workflow_builder::value_type::ValueType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub annotations: IndexMap<String, String>,
}

impl WorkflowMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        WorkflowMetadata {
            name: name.into(),
            ..WorkflowMetadata::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_service_account(mut self, account: impl Into<String>) -> Self {
        self.service_account_name = Some(account.into());
        self
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for WorkflowMetadata {
    fn from(name: &str) -> Self {
        WorkflowMetadata::new(name)
    }
}

/// A finished workflow. Never mutated after [`WorkflowBuilder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    metadata: WorkflowMetadata,
    parameters: Scope<InputParamDef>,
    templates: Scope<Template>,
    entrypoint: Option<String>,
}

impl Workflow {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &WorkflowMetadata {
        &self.metadata
    }

    pub fn parameters(&self) -> &Scope<InputParamDef> {
        &self.parameters
    }

    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter().map(|(_, template)| template)
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn entrypoint(&self) -> Option<&str> {
        self.entrypoint.as_deref()
    }

    /// Reference one of this workflow's templates from another workflow (`templateRef`).
    pub fn template_ref(&self, template: &str) -> BuildResult<TemplateTarget> {
        let template = self.templates.require(template).map_err(|e| e.in_workflow(self.name()))?;
        Ok(TemplateTarget::External {
            workflow: self.name().to_string(),
            signature: template.signature(),
        })
    }

    /// The structured scope object: metadata, workflow parameters and templates.
    pub fn get_full_scope(&self) -> BuildResult<Value> {
        render::full_scope(self).map_err(|e| e.in_workflow(self.name()))
    }

    pub fn to_manifest(&self, options: &RenderOptions) -> BuildResult<WorkflowManifest> {
        render::manifest(self, options).map_err(|e| e.in_workflow(self.name()))
    }

    /// Render the engine manifest in the configured output format.
    pub fn render(&self, options: &RenderOptions) -> BuildResult<String> {
        let manifest = self.to_manifest(options)?;
        let text = match options.format {
            OutputFormat::Yaml => serde_yaml::to_string(&manifest)?,
            OutputFormat::Json => {
                let mut text = serde_json::to_string_pretty(&manifest)?;
                text.push('\n');
                text
            }
        };
        Ok(text)
    }
}

/// Accumulates workflow parameters and templates, one call at a time.
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn create(metadata: impl Into<WorkflowMetadata>) -> BuildResult<Self> {
        let metadata = metadata.into();
        validate_name("workflow", &metadata.name)?;
        Ok(WorkflowBuilder {
            workflow: Workflow {
                metadata,
                parameters: Scope::new("workflow parameter"),
                templates: Scope::new("template"),
                entrypoint: None,
            },
        })
    }

    pub fn name(&self) -> &str {
        self.workflow.name()
    }

    fn context(&self) -> BuildResult<Arc<TemplateContext>> {
        let mut templates = Scope::new("template");
        for template in self.workflow.templates() {
            templates.insert(template.name(), template.signature())?;
        }
        Ok(Arc::new(TemplateContext {
            workflow_name: self.workflow.name().to_string(),
            workflow_parameters: self.workflow.parameters.clone(),
            templates,
        }))
    }

    pub fn add_param(mut self, name: &str, def: InputParamDef) -> BuildResult<Self> {
        let wf = self.workflow.metadata.name.clone();
        if let Some(default) = &def.default {
            if default.uses_loop_item() {
                return Err(BuildError::reference(
                    "WFB-REF-003",
                    "'item' cannot appear in a workflow parameter default",
                )
                .for_parameter(name)
                .in_workflow(&wf));
            }
            for param in default.references() {
                if param.source != ParamSource::Workflow
                    || !self.workflow.parameters.contains(&param.name)
                {
                    return Err(BuildError::reference(
                        "WFB-REF-001",
                        format!(
                            "workflow parameter defaults may only reference earlier workflow parameters, found {}",
                            param
                        ),
                    )
                    .for_parameter(name)
                    .in_workflow(&wf));
                }
            }
        }
        self.workflow
            .parameters
            .insert(name, def)
            .map_err(|e| e.for_parameter(name).in_workflow(&wf))?;
        debug!(workflow = %wf, parameter = name, "registered workflow parameter");
        Ok(self)
    }

    pub fn add_required_param(self, name: &str, value_type: ValueType) -> BuildResult<Self> {
        self.add_param(name, InputParamDef::required(value_type))
    }

    pub fn add_optional_param(self, name: &str, default: impl Into<Expr>) -> BuildResult<Self> {
        self.add_param(name, InputParamDef::optional(default))
    }

    pub fn workflow_parameters(&self) -> IndexMap<String, Expr> {
        workflow_parameters_as_expressions(&self.workflow.parameters)
    }

    pub fn workflow_parameter(&self, name: &str) -> BuildResult<Expr> {
        let def = self.workflow.parameters.require(name)?;
        Ok(Expr::parameter(
            ParamSource::Workflow,
            name,
            def.value_type.clone(),
        ))
    }

    /// Signature of a template already added to this workflow.
    pub fn template_signature(&self, name: &str) -> BuildResult<TemplateSignature> {
        Ok(self.workflow.templates.require(name)?.signature())
    }

    pub fn add_template<F>(mut self, name: &str, build: F) -> BuildResult<Self>
    where
        F: FnOnce(TemplateBuilder) -> BuildResult<Template>,
    {
        let wf = self.workflow.metadata.name.clone();
        self.workflow
            .templates
            .check_available(name)
            .map_err(|e| e.in_template(name).in_workflow(&wf))?;
        let template = self
            .context()
            .and_then(|context| build(TemplateBuilder::new(name, context)))
            .map_err(|e| e.in_template(name).in_workflow(&wf))?;
        if template.name() != name {
            return Err(BuildError::internal(format!(
                "template built as '{}' was registered under '{}'",
                template.name(),
                name
            )));
        }
        let kind = template.body().kind();
        self.workflow
            .templates
            .insert(name, template)
            .map_err(|e| e.in_template(name).in_workflow(&wf))?;
        debug!(workflow = %wf, template = name, kind = kind, "registered template");
        Ok(self)
    }

    pub fn set_entrypoint(mut self, name: &str) -> BuildResult<Self> {
        self.workflow
            .templates
            .require(name)
            .map_err(|e| e.in_workflow(self.workflow.name()))?;
        self.workflow.entrypoint = Some(name.to_string());
        Ok(self)
    }

    pub fn get_full_scope(&self) -> BuildResult<Value> {
        self.workflow.get_full_scope()
    }

    pub fn build(self) -> BuildResult<Workflow> {
        info!(
            workflow = %self.workflow.name(),
            templates = self.workflow.templates.len(),
            parameters = self.workflow.parameters.len(),
            "workflow built"
        );
        Ok(self.workflow)
    }
}
