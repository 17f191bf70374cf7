use super::checked_condition;
use crate::core::error::BuildResult;
use crate::core::workflow_builder::container::ContainerSpec;
use crate::core::workflow_builder::expression::render::{expression_body, template_string};
use crate::core::workflow_builder::params::{InputParamDef, OutputParamDef, OutputSource};
use crate::core::workflow_builder::resource::ResourceSpec;
use crate::core::workflow_builder::scope::Scope;
use crate::core::workflow_builder::task::{LoopSource, TaskSpec, TemplateTarget};
use crate::core::workflow_builder::template::{Template, TemplateBody};
use crate::core::workflow_builder::workflow::Workflow;
use serde_json::{json, Map, Value};

/// Render the full scope of a finished workflow.
pub fn full_scope(workflow: &Workflow) -> BuildResult<Value> {
    let mut root = Map::new();
    root.insert(
        "metadata".into(),
        serde_json::to_value(workflow.metadata())?,
    );
    root.insert(
        "workflowParameters".into(),
        inputs_object(workflow.parameters()),
    );
    let mut templates = Map::new();
    for template in workflow.templates() {
        let rendered = template_object(template).map_err(|e| e.in_template(template.name()))?;
        templates.insert(template.name().to_string(), rendered);
    }
    root.insert("templates".into(), Value::Object(templates));
    if let Some(entrypoint) = workflow.entrypoint() {
        root.insert("entrypoint".into(), json!(entrypoint));
    }
    Ok(Value::Object(root))
}

fn inputs_object(inputs: &Scope<InputParamDef>) -> Value {
    let mut out = Map::new();
    for (name, def) in inputs.iter() {
        let mut entry = Map::new();
        entry.insert("type".into(), json!(def.value_type.to_string()));
        entry.insert("required".into(), json!(def.is_required()));
        if let Some(default) = &def.default {
            entry.insert("default".into(), json!(template_string(default)));
        }
        if let Some(description) = &def.description {
            entry.insert("description".into(), json!(description));
        }
        out.insert(name.to_string(), Value::Object(entry));
    }
    Value::Object(out)
}

pub(super) fn output_source(source: &OutputSource) -> Value {
    match source {
        OutputSource::Path(path) => json!({ "path": path }),
        OutputSource::Expression(expr) => json!({ "expression": expression_body(expr) }),
        OutputSource::Parameter(expr) => json!({ "parameter": template_string(expr) }),
        OutputSource::JsonPath(path) => json!({ "jsonPath": path }),
        OutputSource::JqFilter(filter) => json!({ "jqFilter": filter }),
        OutputSource::Event(event) => json!({ "event": event }),
        OutputSource::ConfigMapKey { name, key } => {
            json!({ "configMapKeyRef": { "name": name, "key": key } })
        }
        OutputSource::Supplied => json!({ "supplied": {} }),
    }
}

fn outputs_object(outputs: &Scope<OutputParamDef>) -> Value {
    let mut out = Map::new();
    for (name, def) in outputs.iter() {
        let mut entry = Map::new();
        entry.insert("type".into(), json!(def.value_type.to_string()));
        entry.insert("from".into(), output_source(&def.source));
        if let Some(description) = &def.description {
            entry.insert("description".into(), json!(description));
        }
        out.insert(name.to_string(), Value::Object(entry));
    }
    Value::Object(out)
}

fn template_object(template: &Template) -> BuildResult<Value> {
    let mut out = Map::new();
    out.insert("inputs".into(), inputs_object(template.inputs()));
    out.insert("outputs".into(), outputs_object(template.outputs()));
    out.insert("body".into(), body_object(template.body())?);
    let settings = template.settings();
    if let Some(retry) = &settings.retry_strategy {
        out.insert("retryStrategy".into(), serde_json::to_value(retry)?);
    }
    if let Some(seconds) = settings.active_deadline_seconds {
        out.insert("activeDeadlineSeconds".into(), json!(seconds));
    }
    Ok(Value::Object(out))
}

fn body_object(body: &TemplateBody) -> BuildResult<Value> {
    Ok(match body {
        TemplateBody::Container(spec) => json!({ "container": container_object(spec)? }),
        TemplateBody::Steps(groups) => {
            let mut rendered = Vec::with_capacity(groups.len());
            for group in groups {
                let steps = group
                    .iter()
                    .map(|step| task_record(step, false))
                    .collect::<BuildResult<Vec<_>>>()?;
                rendered.push(Value::Array(steps));
            }
            json!({ "steps": rendered })
        }
        TemplateBody::Dag(tasks) => {
            let tasks = tasks
                .iter()
                .map(|task| task_record(task, true))
                .collect::<BuildResult<Vec<_>>>()?;
            json!({ "dag": tasks })
        }
        TemplateBody::Resource(spec) => json!({ "resource": resource_object(spec)? }),
    })
}

fn container_object(spec: &ContainerSpec) -> BuildResult<Value> {
    let mut out = Map::new();
    out.insert("image".into(), json!(template_string(&spec.image)));
    if let Some(policy) = &spec.image_pull_policy {
        out.insert("imagePullPolicy".into(), serde_json::to_value(policy)?);
    }
    if !spec.command.is_empty() {
        out.insert("command".into(), json!(spec.command));
    }
    if !spec.args.is_empty() {
        let args: Vec<String> = spec.args.iter().map(template_string).collect();
        out.insert("args".into(), json!(args));
    }
    if let Some(dir) = &spec.working_dir {
        out.insert("workingDir".into(), json!(dir));
    }
    if !spec.env.is_empty() {
        let env: Map<String, Value> = spec
            .env
            .iter()
            .map(|(name, value)| (name.to_string(), json!(template_string(value))))
            .collect();
        out.insert("env".into(), Value::Object(env));
    }
    if let Some(resources) = &spec.resources {
        out.insert("resources".into(), serde_json::to_value(resources)?);
    }
    Ok(Value::Object(out))
}

fn resource_object(spec: &ResourceSpec) -> BuildResult<Value> {
    let mut out = Map::new();
    out.insert("action".into(), serde_json::to_value(spec.action)?);
    out.insert("manifest".into(), json!(spec.manifest.to_yaml()?));
    if let Some(condition) = &spec.success_condition {
        out.insert("successCondition".into(), json!(condition));
    }
    if let Some(condition) = &spec.failure_condition {
        out.insert("failureCondition".into(), json!(condition));
    }
    if spec.set_owner_reference {
        out.insert("setOwnerReference".into(), json!(true));
    }
    if let Some(strategy) = &spec.merge_strategy {
        out.insert("mergeStrategy".into(), serde_json::to_value(strategy)?);
    }
    Ok(Value::Object(out))
}

fn task_record(task: &TaskSpec, with_dependencies: bool) -> BuildResult<Value> {
    let mut out = Map::new();
    out.insert("name".into(), json!(task.name));
    match &task.target {
        TemplateTarget::Internal(signature) => {
            out.insert("template".into(), json!(signature.name));
        }
        TemplateTarget::External {
            workflow,
            signature,
        } => {
            out.insert(
                "templateRef".into(),
                json!({ "name": workflow, "template": signature.name }),
            );
        }
    }
    if with_dependencies {
        out.insert("dependencies".into(), json!(task.dependencies));
    }
    let args: Map<String, Value> = task
        .args
        .iter()
        .map(|(name, expr)| (name.clone(), json!(template_string(expr))))
        .collect();
    out.insert("args".into(), Value::Object(args));
    if let Some(condition) = &task.when {
        out.insert("when".into(), json!(checked_condition(condition)?));
    }
    match &task.loop_source {
        Some(LoopSource::Items(items)) => {
            out.insert("withItems".into(), json!(items));
        }
        Some(LoopSource::Param(expr)) => {
            out.insert("withParam".into(), json!(template_string(expr)));
        }
        Some(LoopSource::Sequence { count, start }) => {
            let mut sequence = Map::new();
            sequence.insert("count".into(), json!(template_string(count)));
            if let Some(start) = start {
                sequence.insert("start".into(), json!(template_string(start)));
            }
            out.insert("withSequence".into(), Value::Object(sequence));
        }
        None => {}
    }
    Ok(Value::Object(out))
}
