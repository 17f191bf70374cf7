//! Parameter descriptors and their conversion into expression leaves.

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::expression::{Expr, ParamSource};
use crate::core::workflow_builder::scope::Scope;
use crate::core::workflow_builder::template::TemplateSignature;
use crate::core::workflow_builder::value_type::ValueType;
use indexmap::IndexMap;

/// A declared input (or workflow-level) parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct InputParamDef {
    pub value_type: ValueType,
    pub default: Option<Expr>,
    pub description: Option<String>,
}

impl InputParamDef {
    pub fn required(value_type: ValueType) -> Self {
        InputParamDef {
            value_type,
            default: None,
            description: None,
        }
    }

    /// An optional parameter whose type is taken from its default.
    pub fn optional(default: impl Into<Expr>) -> Self {
        let default = default.into();
        InputParamDef {
            value_type: default.value_type().clone(),
            default: Some(default),
            description: None,
        }
    }

    /// An optional parameter with an explicitly declared type.
    pub fn optional_typed(value_type: ValueType, default: Expr) -> BuildResult<Self> {
        if !default.value_type().is_assignable_to(&value_type) {
            return Err(BuildError::type_error(
                "WFB-TYPE-003",
                format!(
                    "default of type {} is not assignable to declared type {}",
                    default.value_type(),
                    value_type
                ),
            ));
        }
        Ok(InputParamDef {
            value_type,
            default: Some(default),
            description: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Where an output parameter's value comes from. Exactly one source per output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSource {
    /// A file inside the container.
    Path(String),
    /// An expression evaluated with `valueFrom.expression`.
    Expression(Expr),
    /// A value forwarded from another parameter, e.g. a task output.
    Parameter(Expr),
    JsonPath(String),
    JqFilter(String),
    Event(String),
    ConfigMapKey { name: String, key: String },
    /// Set externally, e.g. by resuming a suspended node.
    Supplied,
}

impl OutputSource {
    pub fn kind(&self) -> &'static str {
        match self {
            OutputSource::Path(_) => "path",
            OutputSource::Expression(_) => "expression",
            OutputSource::Parameter(_) => "parameter",
            OutputSource::JsonPath(_) => "jsonPath",
            OutputSource::JqFilter(_) => "jqFilter",
            OutputSource::Event(_) => "event",
            OutputSource::ConfigMapKey { .. } => "configMapKeyRef",
            OutputSource::Supplied => "supplied",
        }
    }

    pub fn expression(&self) -> Option<&Expr> {
        match self {
            OutputSource::Expression(expr) | OutputSource::Parameter(expr) => Some(expr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputParamDef {
    pub value_type: ValueType,
    pub source: OutputSource,
    pub description: Option<String>,
}

impl OutputParamDef {
    pub fn new(value_type: ValueType, source: OutputSource) -> Self {
        OutputParamDef {
            value_type,
            source,
            description: None,
        }
    }

    /// An output whose type is that of the expression producing it.
    pub fn from_expression(expr: Expr) -> Self {
        OutputParamDef::new(expr.value_type().clone(), OutputSource::Expression(expr))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn as_expressions<T, F>(source: ParamSource, defs: &Scope<T>, type_of: F) -> IndexMap<String, Expr>
where
    F: Fn(&T) -> &ValueType,
{
    defs.iter()
        .map(|(name, def)| {
            (
                name.to_string(),
                Expr::parameter(source.clone(), name, type_of(def).clone()),
            )
        })
        .collect()
}

/// One `inputs.parameters.<name>` leaf per declared input.
pub fn template_input_parameters_as_expressions(
    defs: &Scope<InputParamDef>,
) -> IndexMap<String, Expr> {
    as_expressions(ParamSource::Input, defs, |def| &def.value_type)
}

/// One `workflow.parameters.<name>` leaf per declared workflow parameter.
pub fn workflow_parameters_as_expressions(defs: &Scope<InputParamDef>) -> IndexMap<String, Expr> {
    as_expressions(ParamSource::Workflow, defs, |def| &def.value_type)
}

/// Leaves for the outputs of a step or task, e.g. `tasks.<task>.outputs.parameters.<name>`.
pub fn output_parameters_as_expressions(
    source: ParamSource,
    defs: &Scope<OutputParamDef>,
) -> IndexMap<String, Expr> {
    as_expressions(source, defs, |def| &def.value_type)
}

/// Project the caller's visible values down to exactly the inputs `target` requires.
///
/// Names the target does not require are dropped. Required names the caller cannot
/// supply are left out as well, so argument resolution reports them as missing.
pub fn select_inputs_for_register(
    available: &IndexMap<String, Expr>,
    target: &TemplateSignature,
) -> IndexMap<String, Expr> {
    target
        .inputs
        .iter()
        .filter(|(_, def)| def.is_required())
        .filter_map(|(name, _)| {
            available
                .get(name)
                .map(|expr| (name.to_string(), expr.clone()))
        })
        .collect()
}

/// Check caller arguments against a target's inputs and fill in omitted defaults.
///
/// The result is ordered by the target's input declaration order. Defaults that
/// refer to the target's own inputs are left for the engine to apply.
pub fn resolve_arguments(
    target: &TemplateSignature,
    mut args: IndexMap<String, Expr>,
) -> BuildResult<IndexMap<String, Expr>> {
    if let Some(unknown) = args.keys().find(|name| !target.inputs.contains(name)) {
        let declared: Vec<&str> = target.inputs.names().collect();
        return Err(BuildError::declaration(
            "WFB-DECL-002",
            format!(
                "template '{}' has no input '{}'; inputs: [{}]",
                target.name,
                unknown,
                declared.join(", ")
            ),
        )
        .for_parameter(unknown));
    }

    let mut resolved = IndexMap::new();
    for (name, def) in target.inputs.iter() {
        match args.shift_remove(name) {
            Some(expr) => {
                if !expr.value_type().is_assignable_to(&def.value_type) {
                    return Err(BuildError::type_error(
                        "WFB-TYPE-003",
                        format!(
                            "argument '{}' has type {} but template '{}' declares {}",
                            name,
                            expr.value_type(),
                            target.name,
                            def.value_type
                        ),
                    )
                    .for_parameter(name));
                }
                resolved.insert(name.to_string(), expr);
            }
            None => match &def.default {
                None => {
                    return Err(BuildError::declaration(
                        "WFB-DECL-003",
                        format!(
                            "required input '{}' of template '{}' was not supplied",
                            name, target.name
                        ),
                    )
                    .for_parameter(name))
                }
                Some(default) if is_closed(default) => {
                    resolved.insert(name.to_string(), default.clone());
                }
                Some(_) => {}
            },
        }
    }
    Ok(resolved)
}

/// True when an expression can be evaluated outside the declaring template.
fn is_closed(expr: &Expr) -> bool {
    !expr.uses_loop_item()
        && expr
            .references()
            .iter()
            .all(|param| param.source == ParamSource::Workflow)
}
