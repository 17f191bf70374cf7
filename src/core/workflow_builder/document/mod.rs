//! Declarative YAML workflow documents.
//!
//! A document is replayed through [`WorkflowBuilder`] one declaration at a time,
//! so it is held to exactly the same ordering, scoping and typing rules as code
//! that calls the builder directly.

pub mod expr;

pub use expr::TypeDescriptor;

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::container::{ContainerBuilder, PullPolicy, ResourceRequirements};
use crate::core::workflow_builder::dag::DagBuilder;
use crate::core::workflow_builder::params::{InputParamDef, OutputParamDef, OutputSource};
use crate::core::workflow_builder::resource::{
    ManifestValue, MergeStrategy, ResourceAction, ResourceBuilder,
};
use crate::core::workflow_builder::steps::{StepGroupBuilder, StepsBuilder};
use crate::core::workflow_builder::task::{Invocation, LoopSource, TemplateTarget};
use crate::core::workflow_builder::template::{
    RetryStrategy, Template, TemplateBuilder, TemplateScope,
};
use crate::core::workflow_builder::value_type::ValueType;
use crate::core::workflow_builder::workflow::{Workflow, WorkflowBuilder, WorkflowMetadata};
use expr::{operator, parse_expr, typed_value, Bindings, OutputBindings};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkflowDocument {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub service_account_name: Option<String>,
    #[serde(default)]
    pub parallelism: Option<u32>,
    #[serde(default)]
    pub labels: IndexMap<String, String>,
    #[serde(default)]
    pub annotations: IndexMap<String, String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDoc>,
    #[serde(default)]
    pub templates: Vec<TemplateDoc>,
    #[serde(default)]
    pub entrypoint: Option<String>,
}

/// A workflow parameter or template input. Needs a type, a default, or both.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterDoc {
    pub name: String,
    #[serde(default, rename = "type")]
    pub value_type: Option<TypeDescriptor>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutputDoc {
    pub name: String,
    #[serde(default, rename = "type")]
    pub value_type: Option<TypeDescriptor>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub expression: Option<Value>,
    #[serde(default)]
    pub parameter: Option<Value>,
    #[serde(default)]
    pub json_path: Option<String>,
    #[serde(default)]
    pub jq_filter: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub config_map_key_ref: Option<ConfigMapKeyDoc>,
    #[serde(default)]
    pub supplied: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigMapKeyDoc {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TemplateDoc {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<ParameterDoc>,
    #[serde(default)]
    pub outputs: Vec<OutputDoc>,
    #[serde(default)]
    pub retry_strategy: Option<RetryStrategy>,
    #[serde(default)]
    pub active_deadline_seconds: Option<u64>,
    #[serde(default)]
    pub container: Option<ContainerDoc>,
    #[serde(default)]
    pub steps: Option<Vec<Vec<InvocationDoc>>>,
    #[serde(default)]
    pub dag: Option<Vec<InvocationDoc>>,
    #[serde(default)]
    pub resource: Option<ResourceDoc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerDoc {
    pub image: Value,
    #[serde(default)]
    pub image_pull_policy: Option<PullPolicy>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: IndexMap<String, Value>,
    /// Expose every input as an upper-snake-case environment variable.
    #[serde(default)]
    pub inputs_as_env: bool,
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceDoc {
    pub action: ResourceAction,
    pub manifest: Value,
    #[serde(default)]
    pub success_condition: Option<String>,
    #[serde(default)]
    pub failure_condition: Option<String>,
    #[serde(default)]
    pub set_owner_reference: bool,
    #[serde(default)]
    pub merge_strategy: Option<MergeStrategy>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplateRefDoc {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceDoc {
    pub count: Value,
    #[serde(default)]
    pub start: Option<Value>,
}

/// A step or DAG task.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InvocationDoc {
    pub name: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub template_ref: Option<TemplateRefDoc>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub arguments: IndexMap<String, Value>,
    #[serde(default)]
    pub when: Option<Value>,
    #[serde(default)]
    pub with_items: Option<Vec<Value>>,
    #[serde(default)]
    pub with_param: Option<Value>,
    #[serde(default)]
    pub with_sequence: Option<SequenceDoc>,
}

enum BodyDoc<'a> {
    Container(&'a ContainerDoc),
    Steps(&'a [Vec<InvocationDoc>]),
    Dag(&'a [InvocationDoc]),
    Resource(&'a ResourceDoc),
}

impl TemplateDoc {
    fn body(&self) -> BuildResult<BodyDoc<'_>> {
        let mut bodies = Vec::new();
        if let Some(container) = &self.container {
            bodies.push(BodyDoc::Container(container));
        }
        if let Some(steps) = &self.steps {
            bodies.push(BodyDoc::Steps(steps));
        }
        if let Some(dag) = &self.dag {
            bodies.push(BodyDoc::Dag(dag));
        }
        if let Some(resource) = &self.resource {
            bodies.push(BodyDoc::Resource(resource));
        }
        let count = bodies.len();
        match bodies.pop() {
            Some(body) if count == 1 => Ok(body),
            _ => Err(BuildError::document(format!(
                "template '{}' must declare exactly one of container, steps, dag or resource (found {})",
                self.name, count
            ))
            .with_code("WFB-DOC-002")),
        }
    }
}

impl WorkflowDocument {
    pub fn from_yaml_str(text: &str) -> BuildResult<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| BuildError::document(format!("invalid workflow document: {}", e)))
    }

    pub fn from_path(path: &Path) -> BuildResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BuildError::from(e).with_context("document", path.display().to_string()))?;
        Self::from_yaml_str(&text).map_err(|e| e.with_context("document", path.display().to_string()))
    }

    fn metadata(&self) -> WorkflowMetadata {
        WorkflowMetadata {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            service_account_name: self.service_account_name.clone(),
            parallelism: self.parallelism,
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
        }
    }

    /// Replay the document through the builder. `loaded` holds workflows that
    /// `templateRef` entries may point at.
    pub fn build(&self, loaded: &[Workflow]) -> BuildResult<Workflow> {
        let mut builder = WorkflowBuilder::create(self.metadata())?;
        for param in &self.parameters {
            let def = input_def(param, Bindings::for_workflow(&builder))
                .map_err(|e| e.for_parameter(&param.name).in_workflow(&self.name))?;
            builder = builder.add_param(&param.name, def)?;
        }
        for template in &self.templates {
            builder = builder.add_template(&template.name, |tb| {
                build_template(template, tb, loaded)
            })?;
        }
        if let Some(entrypoint) = &self.entrypoint {
            builder = builder.set_entrypoint(entrypoint)?;
        }
        builder.build()
    }
}

/// Load and build documents in order; each may reference templates of the ones before it.
pub fn load_documents<P: AsRef<Path>>(paths: &[P]) -> BuildResult<Vec<Workflow>> {
    let mut workflows: Vec<Workflow> = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let document = WorkflowDocument::from_path(path)?;
        if workflows.iter().any(|w| w.name() == document.name) {
            return Err(BuildError::declaration(
                "WFB-DECL-001",
                format!("workflow '{}' is defined by more than one document", document.name),
            )
            .with_context("document", path.display().to_string()));
        }
        let workflow = document
            .build(&workflows)
            .map_err(|e| e.with_context("document", path.display().to_string()))?;
        info!(document = %path.display(), workflow = %workflow.name(), "loaded workflow document");
        workflows.push(workflow);
    }
    Ok(workflows)
}

fn input_def(doc: &ParameterDoc, env: Bindings) -> BuildResult<InputParamDef> {
    let value_type = doc
        .value_type
        .as_ref()
        .map(TypeDescriptor::to_value_type)
        .transpose()?;
    let def = match (value_type, &doc.default) {
        (Some(value_type), None) => InputParamDef::required(value_type),
        (None, Some(default)) => InputParamDef::optional(parse_expr(default, &env)?),
        (Some(value_type), Some(default)) => {
            let default = if operator(default).is_some() {
                parse_expr(default, &env)?
            } else {
                typed_value(default, Some(&value_type))?
            };
            InputParamDef::optional_typed(value_type, default)?
        }
        (None, None) => {
            return Err(BuildError::document(format!(
                "parameter '{}' needs a type, a default, or both",
                doc.name
            ))
            .with_code("WFB-DOC-008"))
        }
    };
    Ok(match &doc.description {
        Some(description) => def.with_description(description),
        None => def,
    })
}

fn output_def(doc: &OutputDoc, env: Bindings) -> BuildResult<OutputParamDef> {
    let declared = doc
        .value_type
        .as_ref()
        .map(TypeDescriptor::to_value_type)
        .transpose()?;
    let mut sources = Vec::new();
    if let Some(path) = &doc.path {
        sources.push(OutputSource::Path(path.clone()));
    }
    if let Some(expression) = &doc.expression {
        sources.push(OutputSource::Expression(parse_expr(expression, &env)?));
    }
    if let Some(parameter) = &doc.parameter {
        sources.push(OutputSource::Parameter(parse_expr(parameter, &env)?));
    }
    if let Some(path) = &doc.json_path {
        sources.push(OutputSource::JsonPath(path.clone()));
    }
    if let Some(filter) = &doc.jq_filter {
        sources.push(OutputSource::JqFilter(filter.clone()));
    }
    if let Some(event) = &doc.event {
        sources.push(OutputSource::Event(event.clone()));
    }
    if let Some(key) = &doc.config_map_key_ref {
        sources.push(OutputSource::ConfigMapKey {
            name: key.name.clone(),
            key: key.key.clone(),
        });
    }
    if doc.supplied.is_some() {
        sources.push(OutputSource::Supplied);
    }
    let count = sources.len();
    let source = match sources.pop() {
        Some(source) if count == 1 => source,
        _ => {
            return Err(BuildError::document(format!(
                "output '{}' must declare exactly one value source (found {})",
                doc.name, count
            ))
            .with_code("WFB-DOC-003"))
        }
    };
    let value_type = match (declared, source.expression()) {
        (Some(declared), _) => declared,
        (None, Some(expr)) => expr.value_type().clone(),
        (None, None) => ValueType::String,
    };
    let def = OutputParamDef::new(value_type, source);
    Ok(match &doc.description {
        Some(description) => def.with_description(description),
        None => def,
    })
}

fn build_template(doc: &TemplateDoc, mut tb: TemplateBuilder, loaded: &[Workflow]) -> BuildResult<Template> {
    for input in &doc.inputs {
        let def = input_def(input, Bindings::for_template(&tb)).map_err(|e| e.for_parameter(&input.name))?;
        tb = tb.add_input(&input.name, def)?;
    }
    if let Some(retry) = &doc.retry_strategy {
        tb = tb.with_retry_strategy(retry.clone())?;
    }
    if let Some(seconds) = doc.active_deadline_seconds {
        tb = tb.with_active_deadline(seconds);
    }
    debug!(template = %doc.name, "replaying template document");
    match doc.body()? {
        BodyDoc::Container(container) => {
            tb.add_container(|b| container_body(container, &doc.outputs, b))
        }
        BodyDoc::Steps(groups) => {
            tb.add_steps(|b| steps_body(groups, &doc.outputs, b, loaded))
        }
        BodyDoc::Dag(tasks) => tb.add_dag(|b| dag_body(tasks, &doc.outputs, b, loaded)),
        BodyDoc::Resource(resource) => {
            tb.add_resource_task(|b| resource_body(resource, &doc.outputs, b))
        }
    }
}

fn container_body(
    doc: &ContainerDoc,
    outputs: &[OutputDoc],
    mut b: ContainerBuilder,
) -> BuildResult<ContainerBuilder> {
    let image = parse_expr(&doc.image, &Bindings::for_template(&b))?;
    b = b.image(image)?.command(doc.command.iter().cloned());
    if let Some(policy) = doc.image_pull_policy {
        b = b.image_pull_policy(policy);
    }
    if let Some(dir) = &doc.working_dir {
        b = b.working_dir(dir);
    }
    if let Some(resources) = &doc.resources {
        b = b.resources(resources.clone());
    }
    for arg in &doc.args {
        let arg = parse_expr(arg, &Bindings::for_template(&b))?;
        b = b.arg(arg)?;
    }
    if doc.inputs_as_env {
        b = b.add_inputs_as_env_vars()?;
    }
    for (name, value) in &doc.env {
        let value = parse_expr(value, &Bindings::for_template(&b))?;
        b = b.add_env_var(name, value)?;
    }
    for output in outputs {
        let def = output_def(output, Bindings::for_template(&b)).map_err(|e| e.for_output(&output.name))?;
        b = b.add_output(&output.name, def)?;
    }
    Ok(b)
}

fn resource_body(
    doc: &ResourceDoc,
    outputs: &[OutputDoc],
    mut b: ResourceBuilder,
) -> BuildResult<ResourceBuilder> {
    let manifest = manifest_value(&doc.manifest, Bindings::for_template(&b))?;
    b = b
        .action(doc.action)
        .manifest(manifest)?
        .set_owner_reference(doc.set_owner_reference);
    if let Some(condition) = &doc.success_condition {
        b = b.success_condition(condition);
    }
    if let Some(condition) = &doc.failure_condition {
        b = b.failure_condition(condition);
    }
    if let Some(strategy) = doc.merge_strategy {
        b = b.merge_strategy(strategy);
    }
    for output in outputs {
        let def = output_def(output, Bindings::for_template(&b)).map_err(|e| e.for_output(&output.name))?;
        b = b.add_output(&output.name, def)?;
    }
    Ok(b)
}

fn manifest_value(value: &Value, env: Bindings) -> BuildResult<ManifestValue> {
    if operator(value).is_some() {
        return Ok(ManifestValue::Expr(parse_expr(value, &env)?));
    }
    Ok(match value {
        Value::Array(items) => ManifestValue::List(
            items
                .iter()
                .map(|item| manifest_value(item, env))
                .collect::<BuildResult<_>>()?,
        ),
        Value::Object(fields) => ManifestValue::Object(
            fields
                .iter()
                .map(|(key, field)| Ok((key.clone(), manifest_value(field, env)?)))
                .collect::<BuildResult<_>>()?,
        ),
        other => ManifestValue::Literal(other.clone()),
    })
}

fn resolve_target(
    doc: &InvocationDoc,
    scope: &dyn TemplateScope,
    loaded: &[Workflow],
) -> BuildResult<TemplateTarget> {
    match (&doc.template, &doc.template_ref) {
        (Some(template), None) => Ok(TemplateTarget::Internal(scope.template(template)?.clone())),
        (None, Some(reference)) => {
            let workflow = loaded
                .iter()
                .find(|w| w.name() == reference.name)
                .ok_or_else(|| {
                    BuildError::document(format!(
                        "templateRef names workflow '{}', which has not been loaded",
                        reference.name
                    ))
                    .with_code("WFB-DOC-006")
                })?;
            workflow.template_ref(&reference.template)
        }
        _ => Err(BuildError::document(format!(
            "'{}' must set exactly one of template or templateRef",
            doc.name
        ))
        .with_code("WFB-DOC-007")),
    }
}

/// Build the invocation up front so the body builder can take it by value.
fn invocation(doc: &InvocationDoc, env: Bindings) -> BuildResult<Invocation> {
    let mut invocation = Invocation::new();
    if let Some(items) = &doc.with_items {
        invocation = invocation.with_items(items.clone())?;
    }
    if let Some(param) = &doc.with_param {
        invocation = invocation.with_param(parse_expr(param, &env)?)?;
    }
    if let Some(sequence) = &doc.with_sequence {
        let count = parse_expr(&sequence.count, &env)?;
        let start = sequence
            .start
            .as_ref()
            .map(|start| parse_expr(start, &env))
            .transpose()?;
        invocation = invocation.with_loop(LoopSource::Sequence { count, start })?;
    }

    let (args, when) = {
        let env = env.with_invocation(&invocation);
        let mut args = IndexMap::new();
        for (name, value) in &doc.arguments {
            let expr = parse_expr(value, &env).map_err(|e| e.for_parameter(name))?;
            args.insert(name.clone(), expr);
        }
        let when = doc
            .when
            .as_ref()
            .map(|condition| parse_expr(condition, &env))
            .transpose()?;
        (args, when)
    };
    invocation = invocation
        .args(args)
        .depends_on(doc.dependencies.iter().cloned());
    if let Some(when) = when {
        invocation = invocation.when(when);
    }
    Ok(invocation)
}

fn add_group_step(
    group: StepGroupBuilder,
    doc: &InvocationDoc,
    loaded: &[Workflow],
) -> BuildResult<StepGroupBuilder> {
    let (target, invocation) = {
        let env = Bindings::for_template(&group).with_outputs(OutputBindings::StepGroup(&group));
        (
            resolve_target(doc, &group, loaded),
            invocation(doc, env),
        )
    };
    let target = target.map_err(|e| e.for_step(&doc.name))?;
    let invocation = invocation.map_err(|e| e.for_step(&doc.name))?;
    group.add_step(&doc.name, target, move |_| Ok(invocation))
}

fn steps_body(
    groups: &[Vec<InvocationDoc>],
    outputs: &[OutputDoc],
    mut b: StepsBuilder,
    loaded: &[Workflow],
) -> BuildResult<StepsBuilder> {
    for group in groups {
        b = b.add_step_group(|mut builder| {
            for step in group {
                builder = add_group_step(builder, step, loaded)?;
            }
            Ok(builder)
        })?;
    }
    for output in outputs {
        let env = Bindings::for_template(&b).with_outputs(OutputBindings::Steps(&b));
        let def = output_def(output, env).map_err(|e| e.for_output(&output.name))?;
        b = b.add_output(&output.name, def)?;
    }
    Ok(b)
}

fn dag_body(
    tasks: &[InvocationDoc],
    outputs: &[OutputDoc],
    mut b: DagBuilder,
    loaded: &[Workflow],
) -> BuildResult<DagBuilder> {
    for task in tasks {
        let (target, invocation) = {
            let env = Bindings::for_template(&b).with_outputs(OutputBindings::Dag(&b));
            (resolve_target(task, &b, loaded), invocation(task, env))
        };
        let target = target.map_err(|e| e.for_task(&task.name))?;
        let invocation = invocation.map_err(|e| e.for_task(&task.name))?;
        b = b.add_task(&task.name, target, move |_| Ok(invocation))?;
    }
    for output in outputs {
        let env = Bindings::for_template(&b).with_outputs(OutputBindings::Dag(&b));
        let def = output_def(output, env).map_err(|e| e.for_output(&output.name))?;
        b = b.add_output(&output.name, def)?;
    }
    Ok(b)
}
