//! Lowering of expression trees to the engine's three textual forms.
//!
//! * value context: plain text with `{{...}}` tokens, or a single `{{=...}}` block
//! * expression language: the body of a `{{=...}}` block
//! * conditions: govaluate text for `when` clauses

use super::path::{escape_quoted, is_plain_identifier};
use super::{Expr, ExprKind, ParamRef, ParamSource};
use crate::core::workflow_builder::value_type::ValueType;
use serde_json::Value;

/// Dotted path used inside simple `{{...}}` tokens.
pub fn parameter_path(param: &ParamRef) -> String {
    format!("{}.{}", param.source, param.name)
}

pub fn parameter_token(param: &ParamRef) -> String {
    format!("{{{{{}}}}}", parameter_path(param))
}

fn member(base: &str, key: &str) -> String {
    if is_plain_identifier(key) {
        format!("{}.{}", base, key)
    } else {
        format!("{}['{}']", base, escape_quoted(key))
    }
}

/// Raw (string-valued) access to a parameter inside the expression language.
fn parameter_access(param: &ParamRef) -> String {
    let base = match &param.source {
        ParamSource::Workflow => "workflow.parameters".to_string(),
        ParamSource::Input => "inputs.parameters".to_string(),
        ParamSource::StepOutput(step) => {
            format!("{}.outputs.parameters", member("steps", step))
        }
        ParamSource::TaskOutput(task) => {
            format!("{}.outputs.parameters", member("tasks", task))
        }
    };
    member(&base, &param.name)
}

/// Parameters are strings at runtime; decode them to the declared type.
fn decode(access: String, value_type: &ValueType) -> String {
    match value_type {
        ValueType::Number => format!("asFloat({})", access),
        ValueType::Boolean => format!("({} == 'true')", access),
        ValueType::Array(_) | ValueType::Record(_) | ValueType::Any => {
            format!("fromJSON({})", access)
        }
        ValueType::String | ValueType::Serialized(_) | ValueType::Null => access,
    }
}

fn wrap_block(body: String) -> String {
    format!("{{{{={}}}}}", body)
}

/// Render an expression where the engine expects a parameter value.
pub fn template_string(expr: &Expr) -> String {
    match interpolate(expr) {
        Some(text) => text,
        None => wrap_block(expression_body(expr)),
    }
}

fn interpolate(expr: &Expr) -> Option<String> {
    match expr.kind() {
        ExprKind::Literal(Value::String(text)) => Some(text.clone()),
        ExprKind::Literal(other) => Some(other.to_string()),
        ExprKind::Parameter(param) => Some(parameter_token(param)),
        ExprKind::LoopItem => Some("{{item}}".to_string()),
        ExprKind::WorkflowVariable(variable) => Some(format!("{{{{{}}}}}", variable.path())),
        ExprKind::SerializeJson(inner) | ExprKind::DeserializeJson(inner)
            if inner.as_parameter().is_some() =>
        {
            interpolate(inner)
        }
        ExprKind::Concat { separator, parts } => {
            let rendered: Option<Vec<String>> = parts.iter().map(interpolate).collect();
            rendered.map(|parts| parts.join(separator.as_deref().unwrap_or("")))
        }
        _ => None,
    }
}

/// Render an expression in the engine's expression language (the inside of `{{=...}}`).
pub fn expression_body(expr: &Expr) -> String {
    match expr.kind() {
        ExprKind::Literal(value) => literal(value),
        ExprKind::Parameter(param) => decode(parameter_access(param), expr.value_type()),
        ExprKind::LoopItem => "item".to_string(),
        ExprKind::WorkflowVariable(variable) => variable.path().to_string(),
        ExprKind::Comparison { op, left, right } => format!(
            "({} {} {})",
            expression_body(left),
            op.symbol(),
            expression_body(right)
        ),
        ExprKind::Arithmetic { op, left, right } => format!(
            "({} {} {})",
            expression_body(left),
            op.symbol(),
            expression_body(right)
        ),
        ExprKind::Logical { op, left, right } => format!(
            "({} {} {})",
            expression_body(left),
            op.symbol(),
            expression_body(right)
        ),
        ExprKind::Not(inner) => format!("!{}", expression_body(inner)),
        ExprKind::Ternary {
            condition,
            when_true,
            when_false,
        } => format!(
            "({} ? {} : {})",
            expression_body(condition),
            expression_body(when_true),
            expression_body(when_false)
        ),
        ExprKind::Concat { separator, parts } => {
            if parts.is_empty() {
                return "''".to_string();
            }
            let glue = match separator {
                Some(sep) => format!(" + '{}' + ", escape_quoted(sep)),
                None => " + ".to_string(),
            };
            let rendered: Vec<String> = parts.iter().map(expression_body).collect();
            if rendered.len() == 1 {
                rendered.join("")
            } else {
                format!("({})", rendered.join(&glue))
            }
        }
        ExprKind::FieldSelect { source, path } => format!(
            "jsonpath({}, '{}')",
            json_text(source),
            escape_quoted(&path.to_jsonpath())
        ),
        ExprKind::ArrayIndex { array, index } => {
            format!("{}[{}]", expression_body(array), index_body(index))
        }
        ExprKind::ArrayLength(array) => format!("len({})", expression_body(array)),
        ExprKind::SerializeJson(inner) => match inner.as_parameter() {
            Some(param) => parameter_access(param),
            None => format!("toJSON({})", expression_body(inner)),
        },
        ExprKind::DeserializeJson(inner) => format!("fromJSON({})", expression_body(inner)),
        ExprKind::Base64Encode(inner) => format!("sprig.b64enc({})", expression_body(inner)),
        ExprKind::Base64Decode(inner) => format!("sprig.b64dec({})", expression_body(inner)),
        ExprKind::AsString(inner) => format!("string({})", expression_body(inner)),
        ExprKind::AsNumber(inner) => format!("asFloat({})", expression_body(inner)),
    }
}

/// `jsonpath()` takes JSON text, so avoid a decode/encode round trip where possible.
fn json_text(source: &Expr) -> String {
    match source.kind() {
        ExprKind::Parameter(param) => parameter_access(param),
        ExprKind::DeserializeJson(inner) => expression_body(inner),
        _ => format!("toJSON({})", expression_body(source)),
    }
}

fn index_body(index: &Expr) -> String {
    match index.kind() {
        ExprKind::Literal(Value::Number(n)) if n.is_u64() => n.to_string(),
        _ => format!("int({})", expression_body(index)),
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", escape_quoted(s)),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let fields: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("'{}': {}", escape_quoted(key), literal(value)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
    }
}

/// Render a boolean expression for a `when` clause.
///
/// Simple trees become govaluate text; anything else falls back to a `{{=...}}` block,
/// which the engine substitutes before evaluating the condition.
pub fn condition(expr: &Expr) -> String {
    if expr.is_simple() {
        if let Some(text) = govaluate(expr, false) {
            return text;
        }
    }
    wrap_block(expression_body(expr))
}

/// True when a condition cannot be written as govaluate text.
pub fn needs_expression_block(expr: &Expr) -> bool {
    !expr.is_simple() || govaluate(expr, false).is_none()
}

fn quoted_token(path: &str, value_type: &ValueType) -> Option<String> {
    match value_type {
        ValueType::String | ValueType::Serialized(_) => Some(format!("'{{{{{}}}}}'", path)),
        ValueType::Number | ValueType::Boolean => Some(format!("{{{{{}}}}}", path)),
        _ => None,
    }
}

fn govaluate(expr: &Expr, nested: bool) -> Option<String> {
    let group = |text: String| if nested { format!("({})", text) } else { text };
    match expr.kind() {
        ExprKind::Literal(Value::String(s)) => Some(format!("'{}'", escape_quoted(s))),
        ExprKind::Literal(Value::Number(n)) => Some(n.to_string()),
        ExprKind::Literal(Value::Bool(b)) => Some(b.to_string()),
        ExprKind::Literal(_) => None,
        ExprKind::Parameter(param) => quoted_token(&parameter_path(param), expr.value_type()),
        ExprKind::LoopItem => quoted_token("item", expr.value_type()),
        ExprKind::WorkflowVariable(variable) => Some(format!("'{{{{{}}}}}'", variable.path())),
        ExprKind::Comparison { op, left, right } => Some(group(format!(
            "{} {} {}",
            govaluate(left, true)?,
            op.symbol(),
            govaluate(right, true)?
        ))),
        ExprKind::Arithmetic { op, left, right } => Some(group(format!(
            "{} {} {}",
            govaluate(left, true)?,
            op.symbol(),
            govaluate(right, true)?
        ))),
        ExprKind::Logical { op, left, right } => Some(group(format!(
            "{} {} {}",
            govaluate(left, true)?,
            op.symbol(),
            govaluate(right, true)?
        ))),
        ExprKind::Not(inner) => Some(format!("!{}", govaluate(inner, true)?)),
        ExprKind::Ternary {
            condition,
            when_true,
            when_false,
        } => Some(group(format!(
            "{} ? {} : {}",
            govaluate(condition, true)?,
            govaluate(when_true, true)?,
            govaluate(when_false, true)?
        ))),
        ExprKind::Concat { .. } => quoted_interpolation(expr).map(|text| format!("'{}'", text)),
        _ => None,
    }
}

/// Like `interpolate`, but literal text is escaped for a single-quoted govaluate string.
fn quoted_interpolation(expr: &Expr) -> Option<String> {
    match expr.kind() {
        ExprKind::Literal(Value::String(text)) => Some(escape_quoted(text)),
        ExprKind::SerializeJson(inner) | ExprKind::DeserializeJson(inner)
            if inner.as_parameter().is_some() =>
        {
            quoted_interpolation(inner)
        }
        ExprKind::Concat { separator, parts } => {
            let rendered: Option<Vec<String>> = parts.iter().map(quoted_interpolation).collect();
            rendered.map(|parts| parts.join(&escape_quoted(separator.as_deref().unwrap_or(""))))
        }
        _ => interpolate(expr),
    }
}
