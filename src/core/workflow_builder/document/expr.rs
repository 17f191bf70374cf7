//! `$`-operator maps inside workflow documents.
//!
//! Any YAML value is an expression. Mappings with a single `$`-prefixed key are
//! operators (`{$input: name}`, `{$eq: [a, b]}`); every other value is a literal.

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::dag::DagBuilder;
use crate::core::workflow_builder::expression::{
    ArithmeticOp, ComparisonOp, Expr, LogicalOp, WorkflowVariable,
};
use crate::core::workflow_builder::steps::{StepGroupBuilder, StepsBuilder};
use crate::core::workflow_builder::task::Invocation;
use crate::core::workflow_builder::template::TemplateScope;
use crate::core::workflow_builder::value_type::ValueType;
use crate::core::workflow_builder::workflow::WorkflowBuilder;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// A declared parameter type: `string`, `{array: number}`, `{record: {a: string}}`,
/// `{serialized: {array: string}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TypeDescriptor {
    Name(String),
    Array { array: Box<TypeDescriptor> },
    Record { record: IndexMap<String, TypeDescriptor> },
    Serialized { serialized: Box<TypeDescriptor> },
}

impl TypeDescriptor {
    pub fn to_value_type(&self) -> BuildResult<ValueType> {
        Ok(match self {
            TypeDescriptor::Name(name) => match name.as_str() {
                "string" => ValueType::String,
                "number" => ValueType::Number,
                "boolean" | "bool" => ValueType::Boolean,
                "null" => ValueType::Null,
                "any" => ValueType::Any,
                other => {
                    return Err(BuildError::document(format!(
                        "unknown type '{}'; expected string, number, boolean, null, any, or an array/record/serialized mapping",
                        other
                    ))
                    .with_code("WFB-DOC-004"))
                }
            },
            TypeDescriptor::Array { array } => ValueType::array(array.to_value_type()?),
            TypeDescriptor::Record { record } => {
                let mut fields = Vec::with_capacity(record.len());
                for (name, ty) in record {
                    fields.push((name.clone(), ty.to_value_type()?));
                }
                ValueType::record(fields)
            }
            TypeDescriptor::Serialized { serialized } => {
                ValueType::serialized(serialized.to_value_type()?)
            }
        })
    }
}

/// The step or task outputs an expression may name.
#[derive(Clone, Copy)]
pub(crate) enum OutputBindings<'a> {
    None,
    Steps(&'a StepsBuilder),
    StepGroup(&'a StepGroupBuilder),
    Dag(&'a DagBuilder),
}

/// Everything a document expression can refer to at one point in the build.
#[derive(Clone, Copy)]
pub(crate) struct Bindings<'a> {
    workflow: Option<&'a WorkflowBuilder>,
    scope: Option<&'a dyn TemplateScope>,
    outputs: OutputBindings<'a>,
    invocation: Option<&'a Invocation>,
}

impl<'a> Bindings<'a> {
    pub(crate) fn for_workflow(workflow: &'a WorkflowBuilder) -> Self {
        Bindings {
            workflow: Some(workflow),
            scope: None,
            outputs: OutputBindings::None,
            invocation: None,
        }
    }

    pub(crate) fn for_template(scope: &'a dyn TemplateScope) -> Self {
        Bindings {
            workflow: None,
            scope: Some(scope),
            outputs: OutputBindings::None,
            invocation: None,
        }
    }

    pub(crate) fn with_outputs(mut self, outputs: OutputBindings<'a>) -> Self {
        self.outputs = outputs;
        self
    }

    pub(crate) fn with_invocation(mut self, invocation: &'a Invocation) -> Self {
        self.invocation = Some(invocation);
        self
    }

    fn input(&self, name: &str) -> BuildResult<Expr> {
        match self.scope {
            Some(scope) => scope.input(name),
            None => Err(not_visible("$input", "workflow parameter defaults")),
        }
    }

    fn workflow_parameter(&self, name: &str) -> BuildResult<Expr> {
        match (self.scope, self.workflow) {
            (Some(scope), _) => scope.workflow_parameter(name),
            (None, Some(workflow)) => workflow.workflow_parameter(name),
            (None, None) => Err(BuildError::internal(
                "document bindings carry neither a workflow nor a template",
            )),
        }
    }

    fn step_output(&self, step: &str, output: &str) -> BuildResult<Expr> {
        match self.outputs {
            OutputBindings::Steps(steps) => steps.step_output(step, output),
            OutputBindings::StepGroup(group) => group.step_output(step, output),
            _ => Err(not_visible("$step", "this position")),
        }
    }

    fn task_output(&self, task: &str, output: &str) -> BuildResult<Expr> {
        match self.outputs {
            OutputBindings::Dag(dag) => dag.task_output(task, output),
            _ => Err(not_visible("$task", "this position")),
        }
    }

    fn item(&self) -> BuildResult<Expr> {
        match self.invocation {
            Some(invocation) => invocation.item(),
            None => Err(BuildError::reference(
                "WFB-REF-003",
                "'$item' is only available in the arguments and condition of a looped step or task",
            )),
        }
    }
}

fn not_visible(operator: &str, place: &str) -> BuildError {
    BuildError::reference(
        "WFB-REF-001",
        format!("{} is not available in {}", operator, place),
    )
}

fn malformed(operator: &str, expected: &str) -> BuildError {
    BuildError::document(format!("{} expects {}", operator, expected)).with_code("WFB-DOC-005")
}

/// The operator name and argument when `value` is a `$` map.
pub(crate) fn operator(value: &Value) -> Option<(&str, &Value)> {
    match value {
        Value::Object(map) if map.len() == 1 => map
            .iter()
            .next()
            .filter(|(key, _)| key.starts_with('$'))
            .map(|(key, arg)| (key.as_str(), arg)),
        _ => None,
    }
}

fn name_arg<'v>(op: &str, arg: &'v Value) -> BuildResult<&'v str> {
    arg.as_str().ok_or_else(|| malformed(op, "a name"))
}

/// `[owner, output]` or `{name: owner, output: output}`.
fn output_arg(op: &str, arg: &Value) -> BuildResult<(String, String)> {
    let pair = match arg {
        Value::Array(items) if items.len() == 2 => (items[0].as_str(), items[1].as_str()),
        Value::Object(map) => (
            map.get("name").and_then(Value::as_str),
            map.get("output").and_then(Value::as_str),
        ),
        _ => (None, None),
    };
    match pair {
        (Some(owner), Some(output)) => Ok((owner.to_string(), output.to_string())),
        _ => Err(malformed(op, "[name, output] or {name, output}")),
    }
}

fn list_arg<'v>(op: &str, arg: &'v Value, min: usize) -> BuildResult<&'v [Value]> {
    match arg {
        Value::Array(items) if items.len() >= min => Ok(items),
        _ => Err(malformed(op, &format!("a list of at least {} operands", min))),
    }
}

fn exact_args<const N: usize>(op: &str, arg: &Value, env: &Bindings) -> BuildResult<[Expr; N]> {
    let items = match arg {
        Value::Array(items) if items.len() == N => items,
        _ => return Err(malformed(op, &format!("a list of exactly {} operands", N))),
    };
    let parsed = items
        .iter()
        .map(|item| parse_expr(item, env))
        .collect::<BuildResult<Vec<_>>>()?;
    parsed
        .try_into()
        .map_err(|_| BuildError::internal("operand count changed while parsing"))
}

fn workflow_variable(name: &str) -> BuildResult<WorkflowVariable> {
    Ok(match name {
        "name" => WorkflowVariable::Name,
        "namespace" => WorkflowVariable::Namespace,
        "uid" => WorkflowVariable::Uid,
        "serviceAccountName" => WorkflowVariable::ServiceAccountName,
        "creationTimestamp" => WorkflowVariable::CreationTimestamp,
        other => {
            return Err(BuildError::document(format!("unknown workflow variable '{}'", other))
                .with_code("WFB-DOC-005"))
        }
    })
}

/// A literal with an explicit type, falling back to inference when none is given.
pub(crate) fn typed_value(value: &Value, ty: Option<&ValueType>) -> BuildResult<Expr> {
    match ty {
        Some(ty) => Expr::typed_literal(value.clone(), ty.clone()),
        None => Ok(Expr::literal(value.clone())),
    }
}

pub(crate) fn parse_expr(value: &Value, env: &Bindings) -> BuildResult<Expr> {
    let Some((op, arg)) = operator(value) else {
        return Ok(Expr::literal(value.clone()));
    };
    match op {
        "$input" => env.input(name_arg(op, arg)?),
        "$workflow" => env.workflow_parameter(name_arg(op, arg)?),
        "$var" => Ok(Expr::workflow_variable(workflow_variable(name_arg(op, arg)?)?)),
        "$step" => {
            let (step, output) = output_arg(op, arg)?;
            env.step_output(&step, &output)
        }
        "$task" => {
            let (task, output) = output_arg(op, arg)?;
            env.task_output(&task, &output)
        }
        "$item" => env.item(),
        "$literal" => {
            let value = arg.get("value").ok_or_else(|| malformed(op, "{value, type}"))?;
            let ty = match arg.get("type") {
                Some(ty) => Some(TypeDescriptor::deserialize(ty)?.to_value_type()?),
                None => None,
            };
            typed_value(value, ty.as_ref())
        }
        "$eq" | "$ne" | "$lt" | "$le" | "$gt" | "$ge" => {
            let [left, right] = exact_args::<2>(op, arg, env)?;
            let cmp = match op {
                "$eq" => ComparisonOp::Eq,
                "$ne" => ComparisonOp::Ne,
                "$lt" => ComparisonOp::Lt,
                "$le" => ComparisonOp::Le,
                "$gt" => ComparisonOp::Gt,
                _ => ComparisonOp::Ge,
            };
            Expr::compare(cmp, left, right)
        }
        "$add" | "$sub" | "$mul" | "$div" | "$mod" => {
            let [left, right] = exact_args::<2>(op, arg, env)?;
            let arith = match op {
                "$add" => ArithmeticOp::Add,
                "$sub" => ArithmeticOp::Sub,
                "$mul" => ArithmeticOp::Mul,
                "$div" => ArithmeticOp::Div,
                _ => ArithmeticOp::Mod,
            };
            Expr::arithmetic(arith, left, right)
        }
        "$and" | "$or" => {
            let logic = if op == "$and" { LogicalOp::And } else { LogicalOp::Or };
            let mut operands = list_arg(op, arg, 2)?.iter();
            let mut acc = match operands.next() {
                Some(first) => parse_expr(first, env)?,
                None => return Err(malformed(op, "at least 2 operands")),
            };
            for operand in operands {
                acc = Expr::logical(logic, acc, parse_expr(operand, env)?)?;
            }
            Ok(acc)
        }
        "$not" => Expr::negate(parse_expr(arg, env)?),
        "$if" => {
            let [condition, when_true, when_false] = exact_args::<3>(op, arg, env)?;
            Expr::ternary(condition, when_true, when_false)
        }
        "$concat" => {
            let parts = list_arg(op, arg, 1)?
                .iter()
                .map(|part| parse_expr(part, env))
                .collect::<BuildResult<Vec<_>>>()?;
            Expr::concat(parts)
        }
        "$join" => {
            let separator = arg
                .get("separator")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(op, "{separator, parts}"))?;
            let parts = arg
                .get("parts")
                .map(|parts| list_arg(op, parts, 1))
                .transpose()?
                .ok_or_else(|| malformed(op, "{separator, parts}"))?
                .iter()
                .map(|part| parse_expr(part, env))
                .collect::<BuildResult<Vec<_>>>()?;
            Expr::concat_with(separator, parts)
        }
        "$path" => {
            let source = arg.get("from").ok_or_else(|| malformed(op, "{from, path}"))?;
            let path = arg
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(op, "{from, path}"))?;
            Expr::select_path(parse_expr(source, env)?, path)
        }
        "$index" => {
            let [array, index] = exact_args::<2>(op, arg, env)?;
            Expr::index(array, index)
        }
        "$len" => Expr::length(parse_expr(arg, env)?),
        "$toJson" => Ok(Expr::serialize(parse_expr(arg, env)?)),
        "$fromJson" => Expr::deserialize(parse_expr(arg, env)?),
        "$b64enc" => Expr::base64_encode(parse_expr(arg, env)?),
        "$b64dec" => Expr::base64_decode(parse_expr(arg, env)?),
        "$string" => Expr::as_string(parse_expr(arg, env)?),
        "$number" => Expr::as_number(parse_expr(arg, env)?),
        other => Err(
            BuildError::document(format!("unknown expression operator '{}'", other))
                .with_code("WFB-DOC-005"),
        ),
    }
}
