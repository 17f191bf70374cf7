//! Template construction: the inputs phase, the body attachment, and the finished template.
//!
//! A [`TemplateBuilder`] only knows how to declare inputs. Attaching a body
//! consumes it and hands its scope to exactly one body builder, so inputs can
//! never be declared once a body exists and a body can never be swapped.

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::container::{ContainerBuilder, ContainerSpec};
use crate::core::workflow_builder::dag::DagBuilder;
use crate::core::workflow_builder::expression::{Expr, ParamSource};
use crate::core::workflow_builder::params::{
    template_input_parameters_as_expressions, workflow_parameters_as_expressions,
    InputParamDef, OutputParamDef,
};
use crate::core::workflow_builder::resource::{ResourceBuilder, ResourceSpec};
use crate::core::workflow_builder::scope::Scope;
use crate::core::workflow_builder::steps::StepsBuilder;
use crate::core::workflow_builder::task::TaskSpec;
use crate::core::workflow_builder::value_type::ValueType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// The externally visible contract of a template: its name, inputs and outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSignature {
    pub name: String,
    pub inputs: Scope<InputParamDef>,
    pub outputs: Scope<OutputParamDef>,
}

impl TemplateSignature {
    pub fn new(
        name: impl Into<String>,
        inputs: Scope<InputParamDef>,
        outputs: Scope<OutputParamDef>,
    ) -> Self {
        TemplateSignature {
            name: name.into(),
            inputs,
            outputs,
        }
    }

    pub fn required_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .filter(|(_, def)| def.is_required())
            .map(|(name, _)| name)
    }
}

/// What the enclosing workflow exposes to a template while it is being built.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub workflow_name: String,
    pub workflow_parameters: Scope<InputParamDef>,
    pub templates: Scope<TemplateSignature>,
}

/// The names a template body can see: its own inputs plus the workflow context.
#[derive(Debug, Clone)]
pub struct BodyScope {
    pub(crate) template_name: String,
    pub(crate) context: Arc<TemplateContext>,
    pub(crate) inputs: Scope<InputParamDef>,
}

impl BodyScope {
    pub(crate) fn new(template_name: impl Into<String>, context: Arc<TemplateContext>) -> Self {
        BodyScope {
            template_name: template_name.into(),
            context,
            inputs: Scope::new("input"),
        }
    }

    /// Verify that every name `expr` reads is declared and visible here.
    ///
    /// Inputs and workflow parameters are checked directly; step and task outputs
    /// are delegated to `resolve_output`, which knows the body's visibility rules.
    pub(crate) fn check_references<F>(
        &self,
        expr: &Expr,
        allow_item: bool,
        resolve_output: F,
    ) -> BuildResult<()>
    where
        F: Fn(&ParamSource, &str) -> BuildResult<()>,
    {
        if !allow_item && expr.uses_loop_item() {
            return Err(BuildError::reference(
                "WFB-REF-003",
                "'item' is only available in the arguments and condition of a looped step or task",
            ));
        }
        for param in expr.references() {
            match &param.source {
                ParamSource::Input => {
                    if !self.inputs.contains(&param.name) {
                        return Err(BuildError::reference(
                            "WFB-REF-001",
                            format!(
                                "template '{}' has no input '{}'",
                                self.template_name, param.name
                            ),
                        ));
                    }
                }
                ParamSource::Workflow => {
                    if !self.context.workflow_parameters.contains(&param.name) {
                        return Err(BuildError::reference(
                            "WFB-REF-001",
                            format!(
                                "workflow '{}' has no parameter '{}'",
                                self.context.workflow_name, param.name
                            ),
                        ));
                    }
                }
                other => resolve_output(other, &param.name)?,
            }
        }
        Ok(())
    }
}

pub(crate) fn no_outputs_in(place: &'static str) -> impl Fn(&ParamSource, &str) -> BuildResult<()> {
    move |source, name| {
        Err(BuildError::reference(
            "WFB-REF-001",
            format!("{}.{} is not visible in {}", source, name, place),
        ))
    }
}

/// Read access to the names visible while building a template.
pub trait TemplateScope {
    fn body_scope(&self) -> &BodyScope;

    fn template_name(&self) -> &str {
        &self.body_scope().template_name
    }

    fn inputs(&self) -> IndexMap<String, Expr> {
        template_input_parameters_as_expressions(&self.body_scope().inputs)
    }

    fn input(&self, name: &str) -> BuildResult<Expr> {
        let def = self.body_scope().inputs.require(name)?;
        Ok(Expr::parameter(
            ParamSource::Input,
            name,
            def.value_type.clone(),
        ))
    }

    fn workflow_parameters(&self) -> IndexMap<String, Expr> {
        workflow_parameters_as_expressions(&self.body_scope().context.workflow_parameters)
    }

    fn workflow_parameter(&self, name: &str) -> BuildResult<Expr> {
        let def = self.body_scope().context.workflow_parameters.require(name)?;
        Ok(Expr::parameter(
            ParamSource::Workflow,
            name,
            def.value_type.clone(),
        ))
    }

    /// A template declared earlier in the same workflow.
    fn template(&self, name: &str) -> BuildResult<&TemplateSignature> {
        self.body_scope().context.templates.require(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    Always,
    OnFailure,
    OnError,
    OnTransientError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backoff {
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<String>,
}

/// Emitted as the template's `retryStrategy` block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStrategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<Backoff>,
}

impl RetryStrategy {
    pub fn limit(limit: u32) -> Self {
        RetryStrategy {
            limit: Some(limit),
            ..RetryStrategy::default()
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn validate(&self) -> BuildResult<()> {
        if let Some(backoff) = &self.backoff {
            if backoff.duration.trim().is_empty() {
                return Err(BuildError::declaration(
                    "WFB-DECL-006",
                    "retryStrategy.backoff.duration must not be empty",
                ));
            }
            if backoff.factor == Some(0) {
                return Err(BuildError::declaration(
                    "WFB-DECL-006",
                    "retryStrategy.backoff.factor must be >= 1",
                ));
            }
        }
        Ok(())
    }
}

/// Template-wide execution settings that are independent of the body kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemplateSettings {
    pub retry_strategy: Option<RetryStrategy>,
    pub active_deadline_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateBody {
    Container(ContainerSpec),
    /// Ordered step groups; steps within a group run in parallel.
    Steps(Vec<Vec<TaskSpec>>),
    Dag(Vec<TaskSpec>),
    Resource(ResourceSpec),
}

impl TemplateBody {
    pub fn kind(&self) -> &'static str {
        match self {
            TemplateBody::Container(_) => "container",
            TemplateBody::Steps(_) => "steps",
            TemplateBody::Dag(_) => "dag",
            TemplateBody::Resource(_) => "resource",
        }
    }

    /// Every step or task invoked by this body, in declaration order.
    pub fn invocations(&self) -> Vec<&TaskSpec> {
        match self {
            TemplateBody::Steps(groups) => groups.iter().flatten().collect(),
            TemplateBody::Dag(tasks) => tasks.iter().collect(),
            TemplateBody::Container(_) | TemplateBody::Resource(_) => Vec::new(),
        }
    }
}

/// A finished template: signature plus exactly one body.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    inputs: Scope<InputParamDef>,
    outputs: Scope<OutputParamDef>,
    body: TemplateBody,
    settings: TemplateSettings,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &Scope<InputParamDef> {
        &self.inputs
    }

    pub fn outputs(&self) -> &Scope<OutputParamDef> {
        &self.outputs
    }

    pub fn body(&self) -> &TemplateBody {
        &self.body
    }

    pub fn settings(&self) -> &TemplateSettings {
        &self.settings
    }

    pub fn signature(&self) -> TemplateSignature {
        TemplateSignature::new(&self.name, self.inputs.clone(), self.outputs.clone())
    }

    /// Every expression the template evaluates, input defaults included.
    pub fn expressions(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = self
            .inputs
            .iter()
            .filter_map(|(_, def)| def.default.as_ref())
            .collect();
        out.extend(self.outputs.iter().filter_map(|(_, def)| def.source.expression()));
        match &self.body {
            TemplateBody::Container(spec) => {
                out.push(&spec.image);
                out.extend(spec.args.iter());
                out.extend(spec.env.iter().map(|(_, value)| value));
            }
            TemplateBody::Resource(spec) => out.extend(spec.manifest.expressions()),
            TemplateBody::Steps(_) | TemplateBody::Dag(_) => {
                for task in self.body.invocations() {
                    out.extend(task.expressions());
                }
            }
        }
        out
    }
}

/// Inputs phase of a template.
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    scope: BodyScope,
    settings: TemplateSettings,
}

impl TemplateScope for TemplateBuilder {
    fn body_scope(&self) -> &BodyScope {
        &self.scope
    }
}

impl TemplateBuilder {
    pub(crate) fn new(name: impl Into<String>, context: Arc<TemplateContext>) -> Self {
        TemplateBuilder {
            scope: BodyScope::new(name, context),
            settings: TemplateSettings::default(),
        }
    }

    pub fn add_input(mut self, name: &str, def: InputParamDef) -> BuildResult<Self> {
        if let Some(default) = &def.default {
            self.scope
                .check_references(default, false, no_outputs_in("template input defaults"))
                .map_err(|e| e.for_parameter(name))?;
        }
        self.scope
            .inputs
            .insert(name, def)
            .map_err(|e| e.for_parameter(name))?;
        debug!(
            template = %self.scope.template_name,
            input = name,
            "registered template input"
        );
        Ok(self)
    }

    pub fn add_required_input(self, name: &str, value_type: ValueType) -> BuildResult<Self> {
        self.add_input(name, InputParamDef::required(value_type))
    }

    pub fn add_optional_input(self, name: &str, default: impl Into<Expr>) -> BuildResult<Self> {
        self.add_input(name, InputParamDef::optional(default))
    }

    pub fn add_optional_input_typed(
        self,
        name: &str,
        value_type: ValueType,
        default: Expr,
    ) -> BuildResult<Self> {
        let def = InputParamDef::optional_typed(value_type, default)
            .map_err(|e| e.for_parameter(name))?;
        self.add_input(name, def)
    }

    /// Declare an optional input whose default is computed from the inputs declared so far.
    pub fn add_optional_input_with<F>(self, name: &str, default: F) -> BuildResult<Self>
    where
        F: FnOnce(&Self) -> BuildResult<Expr>,
    {
        let default = default(&self).map_err(|e| e.for_parameter(name))?;
        self.add_input(name, InputParamDef::optional(default))
    }

    /// Declare a batch of inputs through a nested builder function.
    pub fn add_inputs<F>(self, declare: F) -> BuildResult<Self>
    where
        F: FnOnce(Self) -> BuildResult<Self>,
    {
        declare(self)
    }

    pub fn with_retry_strategy(mut self, retry: RetryStrategy) -> BuildResult<Self> {
        retry.validate()?;
        self.settings.retry_strategy = Some(retry);
        Ok(self)
    }

    pub fn with_active_deadline(mut self, seconds: u64) -> Self {
        self.settings.active_deadline_seconds = Some(seconds);
        self
    }

    fn assemble(
        scope: BodyScope,
        settings: TemplateSettings,
        outputs: Scope<OutputParamDef>,
        body: TemplateBody,
    ) -> Template {
        debug!(
            template = %scope.template_name,
            kind = body.kind(),
            inputs = scope.inputs.len(),
            outputs = outputs.len(),
            "attached template body"
        );
        Template {
            name: scope.template_name,
            inputs: scope.inputs,
            outputs,
            body,
            settings,
        }
    }

    pub fn add_container<F>(self, build: F) -> BuildResult<Template>
    where
        F: FnOnce(ContainerBuilder) -> BuildResult<ContainerBuilder>,
    {
        let builder = build(ContainerBuilder::new(self.scope.clone()))?;
        let (spec, outputs) = builder.finish()?;
        Ok(Self::assemble(
            self.scope,
            self.settings,
            outputs,
            TemplateBody::Container(spec),
        ))
    }

    pub fn add_steps<F>(self, build: F) -> BuildResult<Template>
    where
        F: FnOnce(StepsBuilder) -> BuildResult<StepsBuilder>,
    {
        let builder = build(StepsBuilder::new(self.scope.clone()))?;
        let (groups, outputs) = builder.finish();
        Ok(Self::assemble(
            self.scope,
            self.settings,
            outputs,
            TemplateBody::Steps(groups),
        ))
    }

    pub fn add_dag<F>(self, build: F) -> BuildResult<Template>
    where
        F: FnOnce(DagBuilder) -> BuildResult<DagBuilder>,
    {
        let builder = build(DagBuilder::new(self.scope.clone()))?;
        let (tasks, outputs) = builder.finish();
        Ok(Self::assemble(
            self.scope,
            self.settings,
            outputs,
            TemplateBody::Dag(tasks),
        ))
    }

    pub fn add_resource_task<F>(self, build: F) -> BuildResult<Template>
    where
        F: FnOnce(ResourceBuilder) -> BuildResult<ResourceBuilder>,
    {
        let builder = build(ResourceBuilder::new(self.scope.clone()))?;
        let (spec, outputs) = builder.finish()?;
        Ok(Self::assemble(
            self.scope,
            self.settings,
            outputs,
            TemplateBody::Resource(spec),
        ))
    }
}
