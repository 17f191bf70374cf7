//! Steps template bodies: ordered groups of parallel steps.

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::expression::{Expr, ParamSource};
use crate::core::workflow_builder::outputs::{BodyKind, OutputDeclarations};
use crate::core::workflow_builder::params::{
    output_parameters_as_expressions, OutputParamDef, OutputSource,
};
use crate::core::workflow_builder::scope::{extend_scope, Scope};
use crate::core::workflow_builder::task::{
    resolve_invocation, Invocation, TaskSpec, TemplateTarget,
};
use crate::core::workflow_builder::template::{BodyScope, TemplateScope};
use crate::core::workflow_builder::workflow::Workflow;
use indexmap::IndexMap;
use tracing::debug;

fn step_output(declared: &Scope<TaskSpec>, step: &str, output: &str) -> BuildResult<Expr> {
    let spec = declared.require(step)?;
    let def = spec.target.signature().outputs.require(output)?;
    Ok(Expr::parameter(
        ParamSource::StepOutput(step.to_string()),
        output,
        def.value_type.clone(),
    ))
}

/// Outputs of `earlier` steps are visible; anything else is an error.
fn resolve_step_output<'a>(
    earlier: &'a Scope<TaskSpec>,
    current: &'a Scope<TaskSpec>,
) -> impl Fn(&ParamSource, &str) -> BuildResult<()> + 'a {
    move |source, output| match source {
        ParamSource::StepOutput(step) => {
            if current.contains(step) {
                return Err(BuildError::reference(
                    "WFB-REF-002",
                    format!(
                        "outputs of step '{}' are not available to steps of the same group",
                        step
                    ),
                ));
            }
            let spec = earlier.get(step).ok_or_else(|| {
                BuildError::reference("WFB-REF-001", format!("unknown step '{}'", step))
            })?;
            if spec.target.signature().outputs.contains(output) {
                Ok(())
            } else {
                Err(BuildError::reference(
                    "WFB-REF-001",
                    format!(
                        "step '{}' (template '{}') has no output '{}'",
                        step,
                        spec.target.template_name(),
                        output
                    ),
                ))
            }
        }
        other => Err(BuildError::reference(
            "WFB-REF-001",
            format!("{}.{} is not visible in a steps template", other, output),
        )),
    }
}

/// One group of steps that run in parallel.
pub struct StepGroupBuilder {
    scope: BodyScope,
    earlier: Scope<TaskSpec>,
    current: Scope<TaskSpec>,
}

impl TemplateScope for StepGroupBuilder {
    fn body_scope(&self) -> &BodyScope {
        &self.scope
    }
}

impl StepGroupBuilder {
    pub fn add_step<F>(mut self, name: &str, target: TemplateTarget, configure: F) -> BuildResult<Self>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        let spec = self.resolve(name, target, configure)
            .map_err(|e| e.for_step(name))?;
        self.current.insert(name, spec).map_err(|e| e.for_step(name))?;
        debug!(template = %self.scope.template_name, step = name, "registered step");
        Ok(self)
    }

    fn resolve<F>(&self, name: &str, target: TemplateTarget, configure: F) -> BuildResult<TaskSpec>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        self.earlier.check_available(name)?;
        self.current.check_available(name)?;
        let invocation = configure(Invocation::new())?;
        if !invocation.dependencies().is_empty() {
            return Err(BuildError::declaration(
                "WFB-DECL-008",
                "steps are ordered by group; 'depends_on' is only valid for DAG tasks",
            ));
        }
        resolve_invocation(
            name,
            target,
            invocation,
            &self.scope,
            resolve_step_output(&self.earlier, &self.current),
        )
    }

    pub fn add_internal_step<F>(self, name: &str, template: &str, configure: F) -> BuildResult<Self>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        let target = TemplateTarget::Internal(
            self.template(template).map_err(|e| e.for_step(name))?.clone(),
        );
        self.add_step(name, target, configure)
    }

    pub fn add_external_step<F>(
        self,
        name: &str,
        workflow: &Workflow,
        template: &str,
        configure: F,
    ) -> BuildResult<Self>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        let target = workflow.template_ref(template).map_err(|e| e.for_step(name))?;
        self.add_step(name, target, configure)
    }

    /// `steps.<step>.outputs.parameters.<output>` for a step of an earlier group.
    pub fn step_output(&self, step: &str, output: &str) -> BuildResult<Expr> {
        step_output(&self.earlier, step, output)
    }
}

pub struct StepsBuilder {
    scope: BodyScope,
    declared: Scope<TaskSpec>,
    groups: Vec<Vec<String>>,
    outputs: OutputDeclarations,
}

impl TemplateScope for StepsBuilder {
    fn body_scope(&self) -> &BodyScope {
        &self.scope
    }
}

impl StepsBuilder {
    pub(crate) fn new(scope: BodyScope) -> Self {
        StepsBuilder {
            scope,
            declared: Scope::new("step"),
            groups: Vec::new(),
            outputs: OutputDeclarations::new(BodyKind::Steps),
        }
    }

    /// Append a group of parallel steps; they see the outputs of all earlier groups.
    pub fn add_step_group<F>(mut self, build: F) -> BuildResult<Self>
    where
        F: FnOnce(StepGroupBuilder) -> BuildResult<StepGroupBuilder>,
    {
        let group = build(StepGroupBuilder {
            scope: self.scope.clone(),
            earlier: self.declared.clone(),
            current: Scope::new("step"),
        })?;
        if group.current.is_empty() {
            return Err(BuildError::declaration(
                "WFB-DECL-008",
                format!("step group {} is empty", self.groups.len()),
            ));
        }
        self.declared = extend_scope(&self.declared, &group.current)?;
        self.groups
            .push(group.current.names().map(str::to_string).collect());
        Ok(self)
    }

    /// A group holding a single step.
    pub fn add_step<F>(self, name: &str, target: TemplateTarget, configure: F) -> BuildResult<Self>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        self.add_step_group(|group| group.add_step(name, target, configure))
    }

    pub fn add_internal_step<F>(self, name: &str, template: &str, configure: F) -> BuildResult<Self>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        self.add_step_group(|group| group.add_internal_step(name, template, configure))
    }

    pub fn add_external_step<F>(
        self,
        name: &str,
        workflow: &Workflow,
        template: &str,
        configure: F,
    ) -> BuildResult<Self>
    where
        F: FnOnce(Invocation) -> BuildResult<Invocation>,
    {
        self.add_step_group(|group| group.add_external_step(name, workflow, template, configure))
    }

    pub fn step_output(&self, step: &str, output: &str) -> BuildResult<Expr> {
        step_output(&self.declared, step, output)
    }

    pub fn step_outputs(&self, step: &str) -> BuildResult<IndexMap<String, Expr>> {
        let spec = self.declared.require(step)?;
        Ok(output_parameters_as_expressions(
            ParamSource::StepOutput(step.to_string()),
            &spec.target.signature().outputs,
        ))
    }

    /// Template outputs may read any declared step.
    pub fn add_output(mut self, name: &str, def: OutputParamDef) -> BuildResult<Self> {
        let empty = Scope::new("step");
        let resolver = resolve_step_output(&self.declared, &empty);
        let scope = &self.scope;
        self.outputs.declare(&scope.template_name, name, def, |expr| {
            scope.check_references(expr, false, resolver)
        })?;
        Ok(self)
    }

    pub fn add_expression_output(self, name: &str, expr: Expr) -> BuildResult<Self> {
        self.add_output(name, OutputParamDef::from_expression(expr))
    }

    /// Forward a value with `valueFrom.parameter`, typically a step output.
    pub fn add_parameter_output(self, name: &str, expr: Expr) -> BuildResult<Self> {
        let value_type = expr.value_type().clone();
        self.add_output(
            name,
            OutputParamDef::new(value_type, OutputSource::Parameter(expr)),
        )
    }

    pub(crate) fn finish(self) -> (Vec<Vec<TaskSpec>>, Scope<OutputParamDef>) {
        let StepsBuilder {
            scope,
            declared,
            groups,
            outputs,
        } = self;
        let groups: Vec<Vec<TaskSpec>> = groups
            .into_iter()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| declared.get(name).cloned())
                    .collect()
            })
            .collect();
        debug!(
            template = %scope.template_name,
            groups = groups.len(),
            steps = declared.len(),
            "built steps body"
        );
        (groups, outputs.into_scope())
    }
}
