use super::{LintResult, LintSeverity, WorkflowLintRule};
use crate::core::workflow_builder::dot::call_graph;
use crate::core::workflow_builder::expression::render::needs_expression_block;
use crate::core::workflow_builder::expression::ParamSource;
use crate::core::workflow_builder::template::{Template, TemplateBody};
use crate::core::workflow_builder::workflow::Workflow;
use std::collections::HashSet;

pub fn built_in_rules() -> Vec<Box<dyn WorkflowLintRule>> {
    vec![
        Box::new(UnusedInputsRule),
        Box::new(UnusedWorkflowParametersRule),
        Box::new(UnreachableTemplatesRule),
        Box::new(MissingEntrypointRule),
        Box::new(TemplateLevelConditionRule),
        Box::new(ContainerWithoutCommandRule),
    ]
}

fn referenced(template: &Template, source: &ParamSource) -> HashSet<String> {
    template
        .expressions()
        .into_iter()
        .flat_map(|expr| expr.references())
        .filter(|param| &param.source == source)
        .map(|param| param.name.to_lowercase())
        .collect()
}

struct UnusedInputsRule;

impl WorkflowLintRule for UnusedInputsRule {
    fn validate(&self, workflow: &Workflow) -> Vec<LintResult> {
        let mut out = Vec::new();
        for template in workflow.templates() {
            let used = referenced(template, &ParamSource::Input);
            for name in template.inputs().names() {
                if !used.contains(&name.to_lowercase()) {
                    out.push(LintResult::new(
                        "WFB-LINT-001",
                        LintSeverity::Warning,
                        format!(
                            "input '{}' of template '{}' is never used",
                            name,
                            template.name()
                        ),
                        Some(format!("{}.inputs.{}", template.name(), name)),
                        Some("reference the input in the body or remove it".to_string()),
                    ));
                }
            }
        }
        out
    }
}

struct UnusedWorkflowParametersRule;

impl WorkflowLintRule for UnusedWorkflowParametersRule {
    fn validate(&self, workflow: &Workflow) -> Vec<LintResult> {
        let mut used: HashSet<String> = workflow
            .templates()
            .flat_map(|template| referenced(template, &ParamSource::Workflow))
            .collect();
        for (_, def) in workflow.parameters().iter() {
            if let Some(default) = &def.default {
                used.extend(default.references().into_iter().map(|p| p.name.to_lowercase()));
            }
        }
        workflow
            .parameters()
            .names()
            .filter(|name| !used.contains(&name.to_lowercase()))
            .map(|name| {
                LintResult::new(
                    "WFB-LINT-002",
                    LintSeverity::Warning,
                    format!("workflow parameter '{}' is never used", name),
                    Some(format!("parameters.{}", name)),
                    Some("reference the parameter from a template or remove it".to_string()),
                )
            })
            .collect()
    }
}

struct UnreachableTemplatesRule;

impl WorkflowLintRule for UnreachableTemplatesRule {
    fn validate(&self, workflow: &Workflow) -> Vec<LintResult> {
        let Some(entrypoint) = workflow.entrypoint() else {
            return Vec::new();
        };
        let reachable = call_graph(workflow).reachable_from(entrypoint);
        workflow
            .templates()
            .filter(|template| !reachable.contains(template.name()))
            .map(|template| {
                LintResult::new(
                    "WFB-LINT-003",
                    LintSeverity::Warning,
                    format!(
                        "template '{}' is unreachable from entrypoint '{}'",
                        template.name(),
                        entrypoint
                    ),
                    Some(template.name().to_string()),
                    Some(
                        "invoke it from a reachable template, or keep it only if other workflows reference it"
                            .to_string(),
                    ),
                )
            })
            .collect()
    }
}

struct MissingEntrypointRule;

impl WorkflowLintRule for MissingEntrypointRule {
    fn validate(&self, workflow: &Workflow) -> Vec<LintResult> {
        if workflow.entrypoint().is_some() {
            return Vec::new();
        }
        vec![LintResult::new(
            "WFB-LINT-004",
            LintSeverity::Info,
            format!(
                "workflow '{}' has no entrypoint; it can only be used through templateRef",
                workflow.name()
            ),
            None,
            Some("set an entrypoint to submit the workflow directly".to_string()),
        )]
    }
}

struct TemplateLevelConditionRule;

impl WorkflowLintRule for TemplateLevelConditionRule {
    fn validate(&self, workflow: &Workflow) -> Vec<LintResult> {
        let mut out = Vec::new();
        for template in workflow.templates() {
            for task in template.body().invocations() {
                let Some(condition) = &task.when else {
                    continue;
                };
                if needs_expression_block(condition) {
                    out.push(LintResult::new(
                        "WFB-LINT-005",
                        LintSeverity::Info,
                        format!(
                            "condition of '{}' needs expression-language evaluation and is rendered as a {{{{=...}}}} block",
                            task.name
                        ),
                        Some(format!("{}.{}", template.name(), task.name)),
                        None,
                    ));
                }
            }
        }
        out
    }
}

struct ContainerWithoutCommandRule;

impl WorkflowLintRule for ContainerWithoutCommandRule {
    fn validate(&self, workflow: &Workflow) -> Vec<LintResult> {
        workflow
            .templates()
            .filter_map(|template| match template.body() {
                TemplateBody::Container(spec) if spec.command.is_empty() => Some(LintResult::new(
                    "WFB-LINT-006",
                    LintSeverity::Warning,
                    format!(
                        "container template '{}' has no command and relies on the image entrypoint",
                        template.name()
                    ),
                    Some(template.name().to_string()),
                    Some("set an explicit command".to_string()),
                )),
                _ => None,
            })
            .collect()
    }
}
