//! DAG template bodies.
//!
//! Tasks may only depend on tasks declared before them, so the dependency graph
//! is acyclic by construction. A task may read the outputs of another task only
//! when that task is one of its transitive dependencies.

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::expression::{Expr, ParamSource};
use crate::core::workflow_builder::outputs::{BodyKind, OutputDeclarations};
use crate::core::workflow_builder::params::{
    output_parameters_as_expressions, OutputParamDef, OutputSource,
};
use crate::core::workflow_builder::scope::Scope;
use crate::core::workflow_builder::task::{
    resolve_invocation, Invocation, TaskSpec, TemplateTarget,
};
use crate::core::workflow_builder::template::{BodyScope, TemplateScope};
use crate::core::workflow_builder::workflow::Workflow;
use indexmap::IndexMap;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

pub struct DagBuilder {
    scope: BodyScope,
    tasks: Scope<TaskSpec>,
    graph: DiGraph<String, ()>,
    nodes: IndexMap<String, NodeIndex>,
    outputs: OutputDeclarations,
}

impl TemplateScope for DagBuilder {
    fn body_scope(&self) -> &BodyScope {
        &self.scope
    }
}

impl DagBuilder {
    pub(crate) fn new(scope: BodyScope) -> Self {
        DagBuilder {
            scope,
            tasks: Scope::new("task"),
            graph: DiGraph::new(),
            nodes: IndexMap::new(),
            outputs: OutputDeclarations::new(BodyKind::Dag),
        }
    }

    /// True when `ancestor` is one of `dependencies` or reaches one of them.
    fn is_upstream(&self, ancestor: &str, dependencies: &[String]) -> bool {
        let Some(&from) = self.nodes.get(ancestor) else {
            return false;
        };
        dependencies.iter().any(|dep| {
            self.nodes
                .get(dep.as_str())
                .is_some_and(|&to| from == to || has_path_connecting(&self.graph, from, to, None))
        })
    }

    fn output_exists(&self, task: &str, output: &str) -> BuildResult<()> {
        let spec = self.tasks.get(task).ok_or_else(|| {
            BuildError::reference("WFB-REF-001", format!("unknown task '{}'", task))
        })?;
        if spec.target.signature().outputs.contains(output) {
            Ok(())
        } else {
            Err(BuildError::reference(
                "WFB-REF-001",
                format!(
                    "task '{}' (template '{}') has no output '{}'",
                    task,
                    spec.target.template_name(),
                    output
                ),
            ))
        }
    }

    pub fn add_task<F>(mut self, name: &str, target: TemplateTarget, configure: F) -> BuildResult<Self>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        let spec = self
            .resolve(name, target, configure)
            .map_err(|e| e.for_task(name))?;
        debug!(
            template = %self.scope.template_name,
            task = name,
            target = spec.target.template_name(),
            dependencies = ?spec.dependencies,
            "registered dag task"
        );
        let dependencies = spec.dependencies.clone();
        self.tasks.insert(name, spec).map_err(|e| e.for_task(name))?;
        let node = self.graph.add_node(name.to_string());
        for dep in &dependencies {
            if let Some(&from) = self.nodes.get(dep.as_str()) {
                self.graph.add_edge(from, node, ());
            }
        }
        self.nodes.insert(name.to_string(), node);
        Ok(self)
    }

    fn resolve<F>(&self, name: &str, target: TemplateTarget, configure: F) -> BuildResult<TaskSpec>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        self.tasks.check_available(name)?;
        let invocation = configure(Invocation::new())?;
        for dep in invocation.dependencies() {
            if dep == name {
                return Err(BuildError::declaration(
                    "WFB-DECL-002",
                    format!("task '{}' cannot depend on itself", name),
                ));
            }
            if !self.tasks.contains(dep) {
                return Err(BuildError::declaration(
                    "WFB-DECL-002",
                    format!(
                        "unknown dependency '{}'; dependencies must be declared before the task that uses them",
                        dep
                    ),
                ));
            }
        }
        let dependencies = invocation.dependencies().to_vec();
        resolve_invocation(name, target, invocation, &self.scope, |source, output| {
            match source {
                ParamSource::TaskOutput(task) => {
                    self.output_exists(task, output)?;
                    if self.is_upstream(task, &dependencies) {
                        Ok(())
                    } else {
                        Err(BuildError::reference(
                            "WFB-REF-002",
                            format!(
                                "task '{}' reads tasks.{}.outputs.parameters.{} but does not depend on '{}'",
                                name, task, output, task
                            ),
                        ))
                    }
                }
                other => Err(BuildError::reference(
                    "WFB-REF-001",
                    format!("{}.{} is not visible in a dag template", other, output),
                )),
            }
        })
    }

    pub fn add_internal_task<F>(self, name: &str, template: &str, configure: F) -> BuildResult<Self>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        let target = TemplateTarget::Internal(
            self.template(template).map_err(|e| e.for_task(name))?.clone(),
        );
        self.add_task(name, target, configure)
    }

    pub fn add_external_task<F>(
        self,
        name: &str,
        workflow: &Workflow,
        template: &str,
        configure: F,
    ) -> BuildResult<Self>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        let target = workflow.template_ref(template).map_err(|e| e.for_task(name))?;
        self.add_task(name, target, configure)
    }

    /// `tasks.<task>.outputs.parameters.<output>`. Visibility is checked where it is used.
    pub fn task_output(&self, task: &str, output: &str) -> BuildResult<Expr> {
        let spec = self.tasks.require(task)?;
        let def = spec.target.signature().outputs.require(output)?;
        Ok(Expr::parameter(
            ParamSource::TaskOutput(task.to_string()),
            output,
            def.value_type.clone(),
        ))
    }

    pub fn task_outputs(&self, task: &str) -> BuildResult<IndexMap<String, Expr>> {
        let spec = self.tasks.require(task)?;
        Ok(output_parameters_as_expressions(
            ParamSource::TaskOutput(task.to_string()),
            &spec.target.signature().outputs,
        ))
    }

    /// Template outputs may read any declared task.
    pub fn add_output(mut self, name: &str, def: OutputParamDef) -> BuildResult<Self> {
        let scope = &self.scope;
        let tasks = &self.tasks;
        self.outputs.declare(&scope.template_name, name, def, |expr| {
            scope.check_references(expr, false, |source, output| match source {
                ParamSource::TaskOutput(task) => {
                    let spec = tasks.get(task).ok_or_else(|| {
                        BuildError::reference("WFB-REF-001", format!("unknown task '{}'", task))
                    })?;
                    spec.target.signature().outputs.require(output).map(|_| ())
                }
                other => Err(BuildError::reference(
                    "WFB-REF-001",
                    format!("{}.{} is not visible in a dag template", other, output),
                )),
            })
        })?;
        Ok(self)
    }

    pub fn add_expression_output(self, name: &str, expr: Expr) -> BuildResult<Self> {
        self.add_output(name, OutputParamDef::from_expression(expr))
    }

    /// Forward a value with `valueFrom.parameter`, typically a task output.
    pub fn add_parameter_output(self, name: &str, expr: Expr) -> BuildResult<Self> {
        let value_type = expr.value_type().clone();
        self.add_output(
            name,
            OutputParamDef::new(value_type, OutputSource::Parameter(expr)),
        )
    }

    pub(crate) fn finish(self) -> (Vec<TaskSpec>, Scope<OutputParamDef>) {
        debug!(
            template = %self.scope.template_name,
            tasks = self.tasks.len(),
            edges = self.graph.edge_count(),
            "built dag body"
        );
        let tasks = self.tasks.iter().map(|(_, spec)| spec.clone()).collect();
        (tasks, self.outputs.into_scope())
    }
}
