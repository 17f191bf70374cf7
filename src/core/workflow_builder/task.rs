//! Step and task invocations shared by the steps and dag builders.

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::expression::{Expr, ParamSource};
use crate::core::workflow_builder::params::resolve_arguments;
use crate::core::workflow_builder::template::{BodyScope, TemplateSignature};
use crate::core::workflow_builder::value_type::ValueType;
use indexmap::IndexMap;
use serde_json::Value;

/// The template a step or task runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateTarget {
    /// A template of the same workflow, emitted as `template: <name>`.
    Internal(TemplateSignature),
    /// A template exported by another workflow, emitted as `templateRef`.
    External {
        workflow: String,
        signature: TemplateSignature,
    },
}

impl TemplateTarget {
    pub fn signature(&self) -> &TemplateSignature {
        match self {
            TemplateTarget::Internal(signature) => signature,
            TemplateTarget::External { signature, .. } => signature,
        }
    }

    pub fn template_name(&self) -> &str {
        &self.signature().name
    }
}

/// Fan-out source for a looped step or task.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopSource {
    /// `withItems`: a literal list.
    Items(Vec<Value>),
    /// `withParam`: an array-valued expression.
    Param(Expr),
    /// `withSequence`: numbers `start..start+count`.
    Sequence { count: Expr, start: Option<Expr> },
}

impl LoopSource {
    pub fn item_type(&self) -> BuildResult<ValueType> {
        match self {
            LoopSource::Items(items) => Ok(ValueType::infer(&Value::Array(items.clone()))
                .element_type()
                .cloned()
                .unwrap_or(ValueType::Any)),
            LoopSource::Param(expr) => match expr.value_type() {
                ValueType::Array(element) => Ok((**element).clone()),
                ValueType::Serialized(inner) => match inner.as_ref() {
                    ValueType::Array(element) => Ok((**element).clone()),
                    other => Err(loop_type_error(other)),
                },
                ValueType::Any => Ok(ValueType::Any),
                other => Err(loop_type_error(other)),
            },
            LoopSource::Sequence { .. } => Ok(ValueType::Number),
        }
    }

    /// The per-iteration `item`, typed by the loop's element type.
    pub fn item(&self) -> BuildResult<Expr> {
        Ok(Expr::loop_item(self.item_type()?))
    }

    pub(crate) fn expressions(&self) -> Vec<&Expr> {
        match self {
            LoopSource::Items(_) => Vec::new(),
            LoopSource::Param(expr) => vec![expr],
            LoopSource::Sequence { count, start } => {
                let mut out = vec![count];
                out.extend(start.iter());
                out
            }
        }
    }
}

fn loop_type_error(found: &ValueType) -> BuildError {
    BuildError::type_error(
        "WFB-TYPE-001",
        format!("withParam requires an array expression, got {}", found),
    )
}

/// Caller-supplied configuration of one step or task.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    args: IndexMap<String, Expr>,
    when: Option<Expr>,
    loop_source: Option<LoopSource>,
    dependencies: Vec<String>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn args(mut self, args: IndexMap<String, Expr>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn when(mut self, condition: Expr) -> Self {
        self.when = Some(condition);
        self
    }

    pub fn with_items(self, items: Vec<Value>) -> BuildResult<Self> {
        self.with_loop(LoopSource::Items(items))
    }

    pub fn with_param(self, items: Expr) -> BuildResult<Self> {
        self.with_loop(LoopSource::Param(items))
    }

    pub fn with_sequence(self, count: impl Into<Expr>) -> BuildResult<Self> {
        self.with_loop(LoopSource::Sequence {
            count: count.into(),
            start: None,
        })
    }

    pub fn with_loop(mut self, source: LoopSource) -> BuildResult<Self> {
        if self.loop_source.is_some() {
            return Err(BuildError::declaration(
                "WFB-DECL-007",
                "a step or task may declare only one loop",
            ));
        }
        source.item_type()?;
        if let LoopSource::Sequence { count, start } = &source {
            for expr in std::iter::once(count).chain(start.iter()) {
                if expr.value_type() != &ValueType::Number {
                    return Err(BuildError::type_error(
                        "WFB-TYPE-001",
                        format!("withSequence bounds must be numbers, got {}", expr.value_type()),
                    ));
                }
            }
        }
        self.loop_source = Some(source);
        Ok(self)
    }

    /// The loop variable; fails unless a loop was declared first.
    pub fn item(&self) -> BuildResult<Expr> {
        match &self.loop_source {
            Some(source) => source.item(),
            None => Err(BuildError::reference(
                "WFB-REF-003",
                "'item' requires withItems, withParam or withSequence",
            )),
        }
    }

    /// DAG only: names of tasks this one waits for.
    pub fn depends_on<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for task in tasks {
            let task = task.into();
            if !self.dependencies.contains(&task) {
                self.dependencies.push(task);
            }
        }
        self
    }

    pub(crate) fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

/// A fully checked step or task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub name: String,
    pub target: TemplateTarget,
    /// Arguments in the target's input order, defaults already substituted.
    pub args: IndexMap<String, Expr>,
    pub when: Option<Expr>,
    pub loop_source: Option<LoopSource>,
    pub dependencies: Vec<String>,
}

impl TaskSpec {
    /// Arguments, condition and loop source, in that order.
    pub fn expressions(&self) -> Vec<&Expr> {
        self.args
            .values()
            .chain(self.when.iter())
            .chain(self.loop_source.iter().flat_map(LoopSource::expressions))
            .collect()
    }

    /// Step/task names whose outputs this invocation reads.
    pub fn referenced_outputs(&self) -> Vec<String> {
        let mut names = Vec::new();
        for expr in self.expressions() {
            for param in expr.references() {
                if let ParamSource::StepOutput(name) | ParamSource::TaskOutput(name) = param.source {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }
}

/// Check an invocation against its target and the body's visibility rules.
pub(crate) fn resolve_invocation<F>(
    name: &str,
    target: TemplateTarget,
    invocation: Invocation,
    scope: &BodyScope,
    resolve_output: F,
) -> BuildResult<TaskSpec>
where
    F: Fn(&ParamSource, &str) -> BuildResult<()>,
{
    let Invocation {
        args,
        when,
        loop_source,
        dependencies,
    } = invocation;
    let looped = loop_source.is_some();

    if let Some(source) = &loop_source {
        for expr in source.expressions() {
            scope.check_references(expr, false, &resolve_output)?;
        }
    }

    let args = resolve_arguments(target.signature(), args)?;
    for (arg, expr) in &args {
        scope
            .check_references(expr, looped, &resolve_output)
            .map_err(|e| e.for_parameter(arg))?;
    }

    if let Some(condition) = &when {
        if condition.value_type() != &ValueType::Boolean {
            return Err(BuildError::type_error(
                "WFB-TYPE-004",
                format!("'when' must be boolean, got {}", condition.value_type()),
            ));
        }
        scope.check_references(condition, looped, &resolve_output)?;
    }

    Ok(TaskSpec {
        name: name.to_string(),
        target,
        args,
        when,
        loop_source,
        dependencies,
    })
}
