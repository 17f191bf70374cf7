//! Typed expression trees that describe computations over workflow data.
//!
//! Expressions are never executed by the builder. They are checked when they are
//! constructed (operand types, path segments, assignability) and later lowered to
//! Argo's textual forms by [`render`]. Every node carries its result [`ValueType`]
//! and a [`Complexity`] describing which evaluator the engine needs.

pub mod evaluate;
pub mod path;
pub mod render;

pub use path::{JsonPath, PathParseError, PathSegment};

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::value_type::ValueType;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Which evaluation mechanism an expression needs.
///
/// `Simple` trees can be written as govaluate text with `{{...}}` tokens spliced in.
/// `Template` trees need the engine's `{{=...}}` expression evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Template,
}

impl Complexity {
    pub fn widen(self, other: Complexity) -> Complexity {
        self.max(other)
    }

    pub fn widen_all<I: IntoIterator<Item = Complexity>>(items: I) -> Complexity {
        items
            .into_iter()
            .fold(Complexity::Simple, Complexity::widen)
    }
}

/// Where a parameter reference reads its value from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamSource {
    Workflow,
    Input,
    StepOutput(String),
    TaskOutput(String),
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSource::Workflow => write!(f, "workflow.parameters"),
            ParamSource::Input => write!(f, "inputs.parameters"),
            ParamSource::StepOutput(step) => write!(f, "steps.{}.outputs.parameters", step),
            ParamSource::TaskOutput(task) => write!(f, "tasks.{}.outputs.parameters", task),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamRef {
    pub source: ParamSource,
    pub name: String,
}

impl fmt::Display for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source, self.name)
    }
}

/// Global variables the engine exposes for every workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowVariable {
    Name,
    Namespace,
    Uid,
    ServiceAccountName,
    CreationTimestamp,
}

impl WorkflowVariable {
    pub fn path(&self) -> &'static str {
        match self {
            WorkflowVariable::Name => "workflow.name",
            WorkflowVariable::Namespace => "workflow.namespace",
            WorkflowVariable::Uid => "workflow.uid",
            WorkflowVariable::ServiceAccountName => "workflow.serviceAccountName",
            WorkflowVariable::CreationTimestamp => "workflow.creationTimestamp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    fn is_ordering(&self) -> bool {
        !matches!(self, ComparisonOp::Eq | ComparisonOp::Ne)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

/// The closed set of expression node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    Parameter(ParamRef),
    LoopItem,
    WorkflowVariable(WorkflowVariable),
    Comparison {
        op: ComparisonOp,
        left: Expr,
        right: Expr,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Expr,
        right: Expr,
    },
    Logical {
        op: LogicalOp,
        left: Expr,
        right: Expr,
    },
    Not(Expr),
    Ternary {
        condition: Expr,
        when_true: Expr,
        when_false: Expr,
    },
    Concat {
        separator: Option<String>,
        parts: Vec<Expr>,
    },
    FieldSelect {
        source: Expr,
        path: JsonPath,
    },
    ArrayIndex {
        array: Expr,
        index: Expr,
    },
    ArrayLength(Expr),
    SerializeJson(Expr),
    DeserializeJson(Expr),
    Base64Encode(Expr),
    Base64Decode(Expr),
    AsString(Expr),
    AsNumber(Expr),
}

#[derive(Debug, PartialEq)]
struct ExprNode {
    kind: ExprKind,
    value_type: ValueType,
    complexity: Complexity,
}

/// An immutable, cheaply clonable expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    node: Arc<ExprNode>,
}

fn operand_mismatch(op: &str, left: &Expr, right: &Expr) -> BuildError {
    BuildError::type_error(
        "WFB-TYPE-001",
        format!(
            "operator '{}' requires operands of the same scalar type, got {} and {}",
            op,
            left.value_type(),
            right.value_type()
        ),
    )
}

fn expect_type(what: &str, expr: &Expr, expected: &ValueType) -> BuildResult<()> {
    if expr.value_type() == expected {
        Ok(())
    } else {
        Err(BuildError::type_error(
            "WFB-TYPE-001",
            format!("{} requires {}, got {}", what, expected, expr.value_type()),
        ))
    }
}

impl Expr {
    fn build(kind: ExprKind, value_type: ValueType, complexity: Complexity) -> Expr {
        Expr {
            node: Arc::new(ExprNode {
                kind,
                value_type,
                complexity,
            }),
        }
    }

    pub fn kind(&self) -> &ExprKind {
        &self.node.kind
    }

    pub fn value_type(&self) -> &ValueType {
        &self.node.value_type
    }

    pub fn complexity(&self) -> Complexity {
        self.node.complexity
    }

    pub fn is_simple(&self) -> bool {
        self.complexity() == Complexity::Simple
    }

    /// Wrap a plain JSON value; its type is inferred.
    pub fn literal(value: impl Into<Value>) -> Expr {
        let value = value.into();
        let value_type = ValueType::infer(&value);
        Expr::build(ExprKind::Literal(value), value_type, Complexity::Simple)
    }

    /// Wrap a JSON value under an explicitly declared type.
    pub fn typed_literal(value: Value, value_type: ValueType) -> BuildResult<Expr> {
        if !value_type.accepts(&value) {
            return Err(BuildError::type_error(
                "WFB-TYPE-003",
                format!("literal {} is not a valid {}", value, value_type),
            ));
        }
        Ok(Expr::build(
            ExprKind::Literal(value),
            value_type,
            Complexity::Simple,
        ))
    }

    pub fn parameter(source: ParamSource, name: impl Into<String>, value_type: ValueType) -> Expr {
        Expr::build(
            ExprKind::Parameter(ParamRef {
                source,
                name: name.into(),
            }),
            value_type,
            Complexity::Simple,
        )
    }

    pub fn workflow_variable(variable: WorkflowVariable) -> Expr {
        Expr::build(
            ExprKind::WorkflowVariable(variable),
            ValueType::String,
            Complexity::Simple,
        )
    }

    pub(crate) fn loop_item(value_type: ValueType) -> Expr {
        Expr::build(ExprKind::LoopItem, value_type, Complexity::Simple)
    }

    pub fn compare(op: ComparisonOp, left: Expr, right: Expr) -> BuildResult<Expr> {
        let same_scalar = left.value_type() == right.value_type() && left.value_type().is_scalar();
        let ordered = matches!(left.value_type(), ValueType::Number | ValueType::String);
        if !same_scalar || (op.is_ordering() && !ordered) {
            return Err(operand_mismatch(op.symbol(), &left, &right));
        }
        let complexity = left.complexity().widen(right.complexity());
        Ok(Expr::build(
            ExprKind::Comparison { op, left, right },
            ValueType::Boolean,
            complexity,
        ))
    }

    pub fn equals(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::compare(ComparisonOp::Eq, left, right)
    }

    pub fn not_equals(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::compare(ComparisonOp::Ne, left, right)
    }

    pub fn less_than(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::compare(ComparisonOp::Lt, left, right)
    }

    pub fn less_or_equal(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::compare(ComparisonOp::Le, left, right)
    }

    pub fn greater_than(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::compare(ComparisonOp::Gt, left, right)
    }

    pub fn greater_or_equal(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::compare(ComparisonOp::Ge, left, right)
    }

    pub fn arithmetic(op: ArithmeticOp, left: Expr, right: Expr) -> BuildResult<Expr> {
        if left.value_type() != &ValueType::Number || right.value_type() != &ValueType::Number {
            return Err(operand_mismatch(op.symbol(), &left, &right));
        }
        let complexity = left.complexity().widen(right.complexity());
        Ok(Expr::build(
            ExprKind::Arithmetic { op, left, right },
            ValueType::Number,
            complexity,
        ))
    }

    pub fn plus(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::arithmetic(ArithmeticOp::Add, left, right)
    }

    pub fn minus(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::arithmetic(ArithmeticOp::Sub, left, right)
    }

    pub fn times(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::arithmetic(ArithmeticOp::Mul, left, right)
    }

    pub fn divide(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::arithmetic(ArithmeticOp::Div, left, right)
    }

    pub fn modulo(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::arithmetic(ArithmeticOp::Mod, left, right)
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> BuildResult<Expr> {
        if left.value_type() != &ValueType::Boolean || right.value_type() != &ValueType::Boolean {
            return Err(operand_mismatch(op.symbol(), &left, &right));
        }
        let complexity = left.complexity().widen(right.complexity());
        Ok(Expr::build(
            ExprKind::Logical { op, left, right },
            ValueType::Boolean,
            complexity,
        ))
    }

    pub fn and(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::logical(LogicalOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> BuildResult<Expr> {
        Expr::logical(LogicalOp::Or, left, right)
    }

    pub fn negate(operand: Expr) -> BuildResult<Expr> {
        expect_type("'!'", &operand, &ValueType::Boolean)?;
        let complexity = operand.complexity();
        Ok(Expr::build(
            ExprKind::Not(operand),
            ValueType::Boolean,
            complexity,
        ))
    }

    /// `condition ? when_true : when_false`; both branches must share one type.
    pub fn ternary(condition: Expr, when_true: Expr, when_false: Expr) -> BuildResult<Expr> {
        expect_type("ternary condition", &condition, &ValueType::Boolean)?;
        if when_true.value_type() != when_false.value_type() {
            return Err(BuildError::type_error(
                "WFB-TYPE-001",
                format!(
                    "ternary branches must have the same type, got {} and {}",
                    when_true.value_type(),
                    when_false.value_type()
                ),
            ));
        }
        let value_type = when_true.value_type().clone();
        let complexity = Complexity::widen_all([
            condition.complexity(),
            when_true.complexity(),
            when_false.complexity(),
        ]);
        Ok(Expr::build(
            ExprKind::Ternary {
                condition,
                when_true,
                when_false,
            },
            value_type,
            complexity,
        ))
    }

    pub fn concat(parts: Vec<Expr>) -> BuildResult<Expr> {
        Expr::concat_parts(None, parts)
    }

    pub fn concat_with(separator: impl Into<String>, parts: Vec<Expr>) -> BuildResult<Expr> {
        Expr::concat_parts(Some(separator.into()), parts)
    }

    fn concat_parts(separator: Option<String>, parts: Vec<Expr>) -> BuildResult<Expr> {
        if let Some(bad) = parts.iter().find(|part| !part.value_type().is_string_like()) {
            return Err(BuildError::type_error(
                "WFB-TYPE-001",
                format!("concat only accepts strings, got {}", bad.value_type()),
            ));
        }
        let complexity = Complexity::widen_all(parts.iter().map(Expr::complexity));
        Ok(Expr::build(
            ExprKind::Concat { separator, parts },
            ValueType::String,
            complexity,
        ))
    }

    /// Select a field path out of a record- or array-typed expression.
    pub fn select(source: Expr, path: JsonPath) -> BuildResult<Expr> {
        if !source.value_type().is_structured() {
            return Err(BuildError::type_error(
                "WFB-TYPE-002",
                format!(
                    "path selection requires a record or array, got {}",
                    source.value_type()
                ),
            ));
        }
        if path.segments().is_empty() {
            return Err(PathParseError::Empty.into());
        }
        let value_type = path.resolve_type(source.value_type())?;
        Ok(Expr::build(
            ExprKind::FieldSelect { source, path },
            value_type,
            Complexity::Template,
        ))
    }

    pub fn select_path(source: Expr, path: &str) -> BuildResult<Expr> {
        let path: JsonPath = path.parse()?;
        Expr::select(source, path)
    }

    pub fn index(array: Expr, index: Expr) -> BuildResult<Expr> {
        let element = match array.value_type() {
            ValueType::Array(element) => (**element).clone(),
            ValueType::Any => ValueType::Any,
            other => {
                return Err(BuildError::type_error(
                    "WFB-TYPE-001",
                    format!("indexing requires an array, got {}", other),
                ))
            }
        };
        expect_type("array index", &index, &ValueType::Number)?;
        let complexity = array.complexity().widen(index.complexity());
        Ok(Expr::build(
            ExprKind::ArrayIndex { array, index },
            element,
            complexity,
        ))
    }

    pub fn index_at(array: Expr, index: usize) -> BuildResult<Expr> {
        Expr::index(array, Expr::literal(index as u64))
    }

    pub fn length(array: Expr) -> BuildResult<Expr> {
        if !matches!(array.value_type(), ValueType::Array(_) | ValueType::Any) {
            return Err(BuildError::type_error(
                "WFB-TYPE-001",
                format!("length requires an array, got {}", array.value_type()),
            ));
        }
        let complexity = array.complexity();
        Ok(Expr::build(
            ExprKind::ArrayLength(array),
            ValueType::Number,
            complexity,
        ))
    }

    /// Flatten a value to its JSON text, tracked as `serialized<T>`.
    pub fn serialize(value: Expr) -> Expr {
        let value_type = ValueType::serialized(value.value_type().clone());
        let complexity = value.passthrough_complexity();
        Expr::build(ExprKind::SerializeJson(value), value_type, complexity)
    }

    /// Recover `T` from a `serialized<T>` expression.
    pub fn deserialize(value: Expr) -> BuildResult<Expr> {
        let value_type = match value.value_type() {
            ValueType::Serialized(inner) => (**inner).clone(),
            other => {
                return Err(BuildError::type_error(
                    "WFB-TYPE-001",
                    format!("deserialize requires a serialized<T> value, got {}", other),
                ))
            }
        };
        let complexity = value.passthrough_complexity();
        Ok(Expr::build(
            ExprKind::DeserializeJson(value),
            value_type,
            complexity,
        ))
    }

    pub fn base64_encode(value: Expr) -> BuildResult<Expr> {
        expect_type("base64 encode", &value, &ValueType::String)?;
        Ok(Expr::build(
            ExprKind::Base64Encode(value),
            ValueType::String,
            Complexity::Template,
        ))
    }

    pub fn base64_decode(value: Expr) -> BuildResult<Expr> {
        expect_type("base64 decode", &value, &ValueType::String)?;
        Ok(Expr::build(
            ExprKind::Base64Decode(value),
            ValueType::String,
            Complexity::Template,
        ))
    }

    pub fn as_string(value: Expr) -> BuildResult<Expr> {
        if !value.value_type().is_scalar() {
            return Err(BuildError::type_error(
                "WFB-TYPE-001",
                format!("string conversion requires a scalar, got {}", value.value_type()),
            ));
        }
        Ok(Expr::build(
            ExprKind::AsString(value),
            ValueType::String,
            Complexity::Template,
        ))
    }

    pub fn as_number(value: Expr) -> BuildResult<Expr> {
        expect_type("number conversion", &value, &ValueType::String)?;
        Ok(Expr::build(
            ExprKind::AsNumber(value),
            ValueType::Number,
            Complexity::Template,
        ))
    }

    /// Re-typing a bare parameter reference costs nothing: the engine already stores JSON text.
    fn passthrough_complexity(&self) -> Complexity {
        match self.kind() {
            ExprKind::Parameter(_) => self.complexity(),
            _ => Complexity::Template,
        }
    }

    pub fn as_parameter(&self) -> Option<&ParamRef> {
        match self.kind() {
            ExprKind::Parameter(param) => Some(param),
            _ => None,
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self.kind() {
            ExprKind::Literal(_)
            | ExprKind::Parameter(_)
            | ExprKind::LoopItem
            | ExprKind::WorkflowVariable(_) => Vec::new(),
            ExprKind::Comparison { left, right, .. }
            | ExprKind::Arithmetic { left, right, .. }
            | ExprKind::Logical { left, right, .. } => vec![left, right],
            ExprKind::Ternary {
                condition,
                when_true,
                when_false,
            } => vec![condition, when_true, when_false],
            ExprKind::Concat { parts, .. } => parts.iter().collect(),
            ExprKind::FieldSelect { source, .. } => vec![source],
            ExprKind::ArrayIndex { array, index } => vec![array, index],
            ExprKind::Not(inner)
            | ExprKind::ArrayLength(inner)
            | ExprKind::SerializeJson(inner)
            | ExprKind::DeserializeJson(inner)
            | ExprKind::Base64Encode(inner)
            | ExprKind::Base64Decode(inner)
            | ExprKind::AsString(inner)
            | ExprKind::AsNumber(inner) => vec![inner],
        }
    }

    /// Every distinct parameter reference in the tree, in first-seen order.
    pub fn references(&self) -> Vec<ParamRef> {
        let mut out: Vec<ParamRef> = Vec::new();
        self.walk(&mut |expr| {
            if let Some(param) = expr.as_parameter() {
                if !out.contains(param) {
                    out.push(param.clone());
                }
            }
        });
        out
    }

    pub fn uses_loop_item(&self) -> bool {
        let mut found = false;
        self.walk(&mut |expr| {
            if matches!(expr.kind(), ExprKind::LoopItem) {
                found = true;
            }
        });
        found
    }

    fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::literal(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::literal(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::literal(value)
    }
}

macro_rules! literal_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::literal(value)
                }
            }
        )*
    };
}

literal_from!(i32, i64, u32, u64, f64);

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::literal(value)
    }
}

/// Displays the value-context rendering, e.g. `{{inputs.parameters.name}}`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render::template_string(self))
    }
}
