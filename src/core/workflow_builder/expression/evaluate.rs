//! A reference evaluator for expression trees.
//!
//! The engine is the real interpreter. This evaluator exists so that rendered
//! semantics can be checked locally (`argoflow explain --set`) and in tests.

use super::{ArithmeticOp, ComparisonOp, Expr, ExprKind, LogicalOp, ParamRef, ParamSource};
use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::value_type::ValueType;
use base64::Engine as _;
use indexmap::IndexMap;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Concrete values bound to every name an expression may read.
///
/// Parameter values may be given either already decoded or as the raw string the
/// engine would hold; they are decoded according to the referencing expression's type.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub workflow: IndexMap<String, Value>,
    pub inputs: IndexMap<String, Value>,
    pub steps: IndexMap<String, IndexMap<String, Value>>,
    pub tasks: IndexMap<String, IndexMap<String, Value>>,
    pub item: Option<Value>,
    pub variables: IndexMap<String, Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn with_workflow_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.workflow.insert(name.into(), value.into());
        self
    }

    pub fn with_step_output(
        mut self,
        step: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.steps
            .entry(step.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    pub fn with_task_output(
        mut self,
        task: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.tasks
            .entry(task.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    pub fn with_item(mut self, value: impl Into<Value>) -> Self {
        self.item = Some(value.into());
        self
    }

    pub fn with_variable(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(path.into(), value.into());
        self
    }

    fn lookup(&self, param: &ParamRef) -> Option<&Value> {
        match &param.source {
            ParamSource::Workflow => self.workflow.get(&param.name),
            ParamSource::Input => self.inputs.get(&param.name),
            ParamSource::StepOutput(step) => self.steps.get(step)?.get(&param.name),
            ParamSource::TaskOutput(task) => self.tasks.get(task)?.get(&param.name),
        }
    }
}

/// Evaluate `expr` against `ctx`.
pub fn evaluate(expr: &Expr, ctx: &EvaluationContext) -> BuildResult<Value> {
    match expr.kind() {
        ExprKind::Literal(value) => Ok(value.clone()),
        ExprKind::Parameter(param) => {
            let raw = ctx
                .lookup(param)
                .ok_or_else(|| BuildError::evaluation(format!("unbound parameter {}", param)))?;
            decode(raw, expr.value_type())
        }
        ExprKind::LoopItem => ctx
            .item
            .clone()
            .ok_or_else(|| BuildError::evaluation("no loop item is bound")),
        ExprKind::WorkflowVariable(variable) => ctx
            .variables
            .get(variable.path())
            .cloned()
            .ok_or_else(|| BuildError::evaluation(format!("unbound variable {}", variable.path()))),
        ExprKind::Comparison { op, left, right } => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
        ExprKind::Arithmetic { op, left, right } => {
            let left = as_f64(&evaluate(left, ctx)?)?;
            let right = as_f64(&evaluate(right, ctx)?)?;
            let result = match op {
                ArithmeticOp::Add => left + right,
                ArithmeticOp::Sub => left - right,
                ArithmeticOp::Mul => left * right,
                ArithmeticOp::Div | ArithmeticOp::Mod if right == 0.0 => {
                    return Err(BuildError::evaluation("division by zero"))
                }
                ArithmeticOp::Div => left / right,
                ArithmeticOp::Mod => left % right,
            };
            number(result)
        }
        ExprKind::Logical { op, left, right } => {
            let left = as_bool(&evaluate(left, ctx)?)?;
            let short_circuit = match op {
                LogicalOp::And => !left,
                LogicalOp::Or => left,
            };
            if short_circuit {
                return Ok(Value::Bool(left));
            }
            Ok(Value::Bool(as_bool(&evaluate(right, ctx)?)?))
        }
        ExprKind::Not(inner) => Ok(Value::Bool(!as_bool(&evaluate(inner, ctx)?)?)),
        ExprKind::Ternary {
            condition,
            when_true,
            when_false,
        } => {
            if as_bool(&evaluate(condition, ctx)?)? {
                evaluate(when_true, ctx)
            } else {
                evaluate(when_false, ctx)
            }
        }
        ExprKind::Concat { separator, parts } => {
            let mut rendered = Vec::with_capacity(parts.len());
            for part in parts {
                rendered.push(as_str(&evaluate(part, ctx)?)?.to_string());
            }
            Ok(Value::String(
                rendered.join(separator.as_deref().unwrap_or("")),
            ))
        }
        ExprKind::FieldSelect { source, path } => {
            let value = evaluate(source, ctx)?;
            path.select(&value)
                .cloned()
                .ok_or_else(|| BuildError::evaluation(format!("path {} did not match", path)))
        }
        ExprKind::ArrayIndex { array, index } => {
            let array = evaluate(array, ctx)?;
            let index = as_f64(&evaluate(index, ctx)?)?;
            let items = array
                .as_array()
                .ok_or_else(|| BuildError::evaluation("indexing a value that is not an array"))?;
            if index < 0.0 || index.fract() != 0.0 {
                return Err(BuildError::evaluation(format!("invalid array index {}", index)));
            }
            items.get(index as usize).cloned().ok_or_else(|| {
                BuildError::evaluation(format!(
                    "index {} out of bounds for array of length {}",
                    index,
                    items.len()
                ))
            })
        }
        ExprKind::ArrayLength(array) => {
            let array = evaluate(array, ctx)?;
            let items = array
                .as_array()
                .ok_or_else(|| BuildError::evaluation("length of a value that is not an array"))?;
            Ok(Value::from(items.len() as u64))
        }
        ExprKind::SerializeJson(inner) => {
            let value = evaluate(inner, ctx)?;
            Ok(Value::String(serde_json::to_string(&value)?))
        }
        ExprKind::DeserializeJson(inner) => {
            let value = evaluate(inner, ctx)?;
            parse_json(as_str(&value)?)
        }
        ExprKind::Base64Encode(inner) => {
            let value = evaluate(inner, ctx)?;
            Ok(Value::String(
                base64::engine::general_purpose::STANDARD.encode(as_str(&value)?),
            ))
        }
        ExprKind::Base64Decode(inner) => {
            let value = evaluate(inner, ctx)?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(as_str(&value)?)
                .map_err(|e| BuildError::evaluation(format!("invalid base64: {}", e)))?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|e| BuildError::evaluation(format!("decoded base64 is not utf-8: {}", e)))
        }
        ExprKind::AsString(inner) => {
            let value = evaluate(inner, ctx)?;
            Ok(Value::String(match value {
                Value::String(s) => s,
                other => other.to_string(),
            }))
        }
        ExprKind::AsNumber(inner) => {
            let value = evaluate(inner, ctx)?;
            parse_number(as_str(&value)?)
        }
    }
}

/// Interpret a bound value (possibly the engine's raw string) as `value_type`.
fn decode(raw: &Value, value_type: &ValueType) -> BuildResult<Value> {
    match (value_type, raw) {
        (ValueType::Number, Value::String(text)) => parse_number(text),
        (ValueType::Boolean, Value::String(text)) => match text.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(BuildError::evaluation(format!(
                "'{}' is not a boolean",
                other
            ))),
        },
        (ValueType::Array(_) | ValueType::Record(_) | ValueType::Any, Value::String(text))
            if !matches!(value_type, ValueType::Any) || looks_like_json(text) =>
        {
            parse_json(text)
        }
        (ValueType::Serialized(_), value) if !value.is_string() => {
            Ok(Value::String(serde_json::to_string(value)?))
        }
        _ => Ok(raw.clone()),
    }
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn parse_json(text: &str) -> BuildResult<Value> {
    serde_json::from_str(text)
        .map_err(|e| BuildError::evaluation(format!("invalid JSON '{}': {}", text, e)))
}

fn parse_number(text: &str) -> BuildResult<Value> {
    let parsed: f64 = text
        .trim()
        .parse()
        .map_err(|_| BuildError::evaluation(format!("'{}' is not a number", text)))?;
    number(parsed)
}

/// Integral results are kept as JSON integers so `3` does not become `3.0`.
fn number(value: f64) -> BuildResult<Value> {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(value as i64));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| BuildError::evaluation(format!("{} is not a finite number", value)))
}

fn as_f64(value: &Value) -> BuildResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| BuildError::evaluation(format!("expected a number, got {}", value)))
}

fn as_bool(value: &Value) -> BuildResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| BuildError::evaluation(format!("expected a boolean, got {}", value)))
}

fn as_str(value: &Value) -> BuildResult<&str> {
    value
        .as_str()
        .ok_or_else(|| BuildError::evaluation(format!("expected a string, got {}", value)))
}

fn compare(op: ComparisonOp, left: &Value, right: &Value) -> BuildResult<bool> {
    let ordering = match (left, right) {
        (Value::Number(_), Value::Number(_)) => as_f64(left)?
            .partial_cmp(&as_f64(right)?)
            .ok_or_else(|| BuildError::evaluation("cannot compare NaN"))?,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => {
            return match op {
                ComparisonOp::Eq => Ok(left == right),
                ComparisonOp::Ne => Ok(left != right),
                _ => Err(BuildError::evaluation(format!(
                    "cannot order {} and {}",
                    left, right
                ))),
            }
        }
    };
    Ok(match op {
        ComparisonOp::Eq => ordering == Ordering::Equal,
        ComparisonOp::Ne => ordering != Ordering::Equal,
        ComparisonOp::Lt => ordering == Ordering::Less,
        ComparisonOp::Le => ordering != Ordering::Greater,
        ComparisonOp::Gt => ordering == Ordering::Greater,
        ComparisonOp::Ge => ordering != Ordering::Less,
    })
}
