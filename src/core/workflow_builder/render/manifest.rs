use super::{checked_condition, RenderOptions, SUPPORTED_KINDS};
use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::container::{PullPolicy, ResourceRequirements};
use crate::core::workflow_builder::expression::render::{expression_body, template_string};
use crate::core::workflow_builder::params::{InputParamDef, OutputParamDef, OutputSource};
use crate::core::workflow_builder::resource::{MergeStrategy, ResourceAction};
use crate::core::workflow_builder::scope::Scope;
use crate::core::workflow_builder::task::{LoopSource, TaskSpec, TemplateTarget};
use crate::core::workflow_builder::template::{RetryStrategy, Template, TemplateBody};
use crate::core::workflow_builder::workflow::Workflow;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ManifestMetadata,
    pub spec: WorkflowSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub annotations: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    pub templates: Vec<ManifestTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Arguments {
    pub parameters: Vec<ParameterEntry>,
}

/// One entry of an `inputs.parameters` or `arguments.parameters` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputEntry {
    pub name: String,
    #[serde(rename = "valueFrom")]
    pub value_from: ValueFrom,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueFrom {
    Path(String),
    Expression(String),
    Parameter(String),
    JsonPath(String),
    JqFilter(String),
    Event(String),
    ConfigMapKeyRef { name: String, key: String },
    Supplied {},
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ParameterList {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterEntry>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OutputList {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<OutputEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestTemplate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<ParameterList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<OutputList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerManifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<Vec<InvocationManifest>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dag: Option<DagManifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceManifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_strategy: Option<RetryStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerManifest {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<PullPolicy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DagManifest {
    pub tasks: Vec<InvocationManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateRefManifest {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceManifest {
    pub count: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
}

/// A step (inside `steps`) or a task (inside `dag.tasks`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationManifest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<TemplateRefManifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_items: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_sequence: Option<SequenceManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceManifest {
    pub action: ResourceAction,
    pub manifest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_condition: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub set_owner_reference: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_strategy: Option<MergeStrategy>,
}

/// Lower a finished workflow to the engine's manifest shape.
pub fn manifest(workflow: &Workflow, options: &RenderOptions) -> BuildResult<WorkflowManifest> {
    if !SUPPORTED_KINDS.contains(&options.kind.as_str()) {
        return Err(BuildError::render(
            "WFB-REND-001",
            format!(
                "unsupported manifest kind '{}'; expected one of {}",
                options.kind,
                SUPPORTED_KINDS.join(", ")
            ),
        ));
    }
    if options.kind == "Workflow" && workflow.entrypoint().is_none() {
        return Err(BuildError::render(
            "WFB-REND-002",
            "a Workflow manifest requires an entrypoint",
        ));
    }

    let metadata = workflow.metadata();
    let arguments = if workflow.parameters().is_empty() {
        None
    } else {
        Some(Arguments {
            parameters: workflow
                .parameters()
                .iter()
                .map(|(name, def)| ParameterEntry {
                    name: name.to_string(),
                    value: def.default.as_ref().map(template_string),
                    default: None,
                    description: def.description.clone(),
                })
                .collect(),
        })
    };

    let mut templates = Vec::new();
    for template in workflow.templates() {
        templates.push(lower_template(template).map_err(|e| e.in_template(template.name()))?);
    }
    debug!(
        workflow = %workflow.name(),
        kind = %options.kind,
        templates = templates.len(),
        "lowered workflow manifest"
    );

    Ok(WorkflowManifest {
        api_version: options.api_version.clone(),
        kind: options.kind.clone(),
        metadata: ManifestMetadata {
            name: metadata.name.clone(),
            namespace: metadata.namespace.clone(),
            labels: metadata.labels.clone(),
            annotations: metadata.annotations.clone(),
        },
        spec: WorkflowSpec {
            entrypoint: workflow.entrypoint().map(str::to_string),
            service_account_name: metadata.service_account_name.clone(),
            parallelism: metadata.parallelism,
            arguments,
            templates,
        },
    })
}

fn lower_inputs(inputs: &Scope<InputParamDef>) -> Option<ParameterList> {
    if inputs.is_empty() {
        return None;
    }
    Some(ParameterList {
        parameters: inputs
            .iter()
            .map(|(name, def)| ParameterEntry {
                name: name.to_string(),
                value: None,
                default: def.default.as_ref().map(template_string),
                description: def.description.clone(),
            })
            .collect(),
    })
}

fn lower_value_from(source: &OutputSource) -> ValueFrom {
    match source {
        OutputSource::Path(path) => ValueFrom::Path(path.clone()),
        OutputSource::Expression(expr) => ValueFrom::Expression(expression_body(expr)),
        OutputSource::Parameter(expr) => ValueFrom::Parameter(template_string(expr)),
        OutputSource::JsonPath(path) => ValueFrom::JsonPath(path.clone()),
        OutputSource::JqFilter(filter) => ValueFrom::JqFilter(filter.clone()),
        OutputSource::Event(event) => ValueFrom::Event(event.clone()),
        OutputSource::ConfigMapKey { name, key } => ValueFrom::ConfigMapKeyRef {
            name: name.clone(),
            key: key.clone(),
        },
        OutputSource::Supplied => ValueFrom::Supplied {},
    }
}

fn lower_outputs(outputs: &Scope<OutputParamDef>) -> Option<OutputList> {
    if outputs.is_empty() {
        return None;
    }
    Some(OutputList {
        parameters: outputs
            .iter()
            .map(|(name, def)| OutputEntry {
                name: name.to_string(),
                value_from: lower_value_from(&def.source),
                description: def.description.clone(),
            })
            .collect(),
    })
}

fn lower_template(template: &Template) -> BuildResult<ManifestTemplate> {
    let mut out = ManifestTemplate {
        name: template.name().to_string(),
        inputs: lower_inputs(template.inputs()),
        outputs: lower_outputs(template.outputs()),
        container: None,
        steps: None,
        dag: None,
        resource: None,
        retry_strategy: template.settings().retry_strategy.clone(),
        active_deadline_seconds: template.settings().active_deadline_seconds,
    };
    match template.body() {
        TemplateBody::Container(spec) => {
            out.container = Some(ContainerManifest {
                image: template_string(&spec.image),
                image_pull_policy: spec.image_pull_policy,
                command: spec.command.clone(),
                args: spec.args.iter().map(template_string).collect(),
                working_dir: spec.working_dir.clone(),
                env: spec
                    .env
                    .iter()
                    .map(|(name, value)| EnvVar {
                        name: name.to_string(),
                        value: template_string(value),
                    })
                    .collect(),
                resources: spec.resources.clone(),
            });
        }
        TemplateBody::Steps(groups) => {
            let mut lowered = Vec::with_capacity(groups.len());
            for group in groups {
                lowered.push(
                    group
                        .iter()
                        .map(|step| lower_invocation(step, false).map_err(|e| e.for_step(&step.name)))
                        .collect::<BuildResult<Vec<_>>>()?,
                );
            }
            out.steps = Some(lowered);
        }
        TemplateBody::Dag(tasks) => {
            out.dag = Some(DagManifest {
                tasks: tasks
                    .iter()
                    .map(|task| lower_invocation(task, true).map_err(|e| e.for_task(&task.name)))
                    .collect::<BuildResult<Vec<_>>>()?,
            });
        }
        TemplateBody::Resource(spec) => {
            out.resource = Some(ResourceManifest {
                action: spec.action,
                manifest: spec.manifest.to_yaml()?,
                success_condition: spec.success_condition.clone(),
                failure_condition: spec.failure_condition.clone(),
                set_owner_reference: spec.set_owner_reference,
                merge_strategy: spec.merge_strategy,
            });
        }
    }
    Ok(out)
}

fn lower_invocation(task: &TaskSpec, in_dag: bool) -> BuildResult<InvocationManifest> {
    let (template, template_ref) = match &task.target {
        TemplateTarget::Internal(signature) => (Some(signature.name.clone()), None),
        TemplateTarget::External {
            workflow,
            signature,
        } => (
            None,
            Some(TemplateRefManifest {
                name: workflow.clone(),
                template: signature.name.clone(),
            }),
        ),
    };
    let arguments = if task.args.is_empty() {
        None
    } else {
        Some(Arguments {
            parameters: task
                .args
                .iter()
                .map(|(name, expr)| ParameterEntry {
                    name: name.clone(),
                    value: Some(template_string(expr)),
                    default: None,
                    description: None,
                })
                .collect(),
        })
    };
    let when = task.when.as_ref().map(checked_condition).transpose()?;
    let mut out = InvocationManifest {
        name: task.name.clone(),
        template,
        template_ref,
        dependencies: (in_dag && !task.dependencies.is_empty()).then(|| task.dependencies.clone()),
        arguments,
        when,
        with_items: None,
        with_param: None,
        with_sequence: None,
    };
    match &task.loop_source {
        Some(LoopSource::Items(items)) => out.with_items = Some(items.clone()),
        Some(LoopSource::Param(expr)) => out.with_param = Some(template_string(expr)),
        Some(LoopSource::Sequence { count, start }) => {
            out.with_sequence = Some(SequenceManifest {
                count: template_string(count),
                start: start.as_ref().map(template_string),
            })
        }
        None => {}
    }
    Ok(out)
}
