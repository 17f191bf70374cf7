//! Resource template bodies: one Kubernetes action over an embedded manifest.

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::expression::render::template_string;
use crate::core::workflow_builder::expression::Expr;
use crate::core::workflow_builder::outputs::{BodyKind, OutputDeclarations};
use crate::core::workflow_builder::params::{OutputParamDef, OutputSource};
use crate::core::workflow_builder::scope::Scope;
use crate::core::workflow_builder::template::{no_outputs_in, BodyScope, TemplateScope};
use crate::core::workflow_builder::value_type::ValueType;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAction {
    Create,
    Apply,
    Delete,
    Patch,
    Replace,
    Get,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Strategic,
    Merge,
    Json,
}

/// A manifest tree whose leaves may be expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestValue {
    Literal(Value),
    Expr(Expr),
    List(Vec<ManifestValue>),
    Object(IndexMap<String, ManifestValue>),
}

impl ManifestValue {
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ManifestValue)>,
    {
        ManifestValue::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list(items: Vec<ManifestValue>) -> Self {
        ManifestValue::List(items)
    }

    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            ManifestValue::Literal(_) => Vec::new(),
            ManifestValue::Expr(expr) => vec![expr],
            ManifestValue::List(items) => items.iter().flat_map(ManifestValue::expressions).collect(),
            ManifestValue::Object(fields) => fields
                .values()
                .flat_map(ManifestValue::expressions)
                .collect(),
        }
    }

    /// Render to the YAML text the engine receives in `resource.manifest`.
    ///
    /// Expression leaves are rendered in value context. String-valued leaves are
    /// single-quoted; other leaves are left bare so that numbers and booleans
    /// keep their YAML type after substitution.
    pub fn to_yaml(&self) -> BuildResult<String> {
        let prefix = self.placeholder_prefix();
        let mut placeholders = Vec::new();
        let tree = self.to_placeholder_tree(&prefix, &mut placeholders)?;
        let text = serde_yaml::to_string(&tree)?;

        let pattern = Regex::new(&format!("{}([0-9]+)__", regex::escape(&prefix)))
            .map_err(|e| BuildError::internal(format!("manifest placeholder pattern: {}", e)))?;
        let mut seen = 0;
        let rendered = pattern.replace_all(&text, |caps: &regex::Captures<'_>| {
            let expr = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| placeholders.get(index));
            match expr {
                Some(expr) => {
                    seen += 1;
                    let value = template_string(expr);
                    if expr.value_type().is_string_like() {
                        format!("'{}'", value.replace('\'', "''"))
                    } else {
                        value
                    }
                }
                None => caps[0].to_string(),
            }
        });
        if seen != placeholders.len() {
            return Err(BuildError::internal(format!(
                "{} of {} manifest placeholders were lost during serialization",
                placeholders.len() - seen,
                placeholders.len()
            )));
        }
        Ok(rendered.into_owned())
    }

    /// A placeholder prefix that no literal key or value in this tree contains.
    fn placeholder_prefix(&self) -> String {
        let mut literals = Vec::new();
        self.collect_literal_text(&mut literals);
        (0u64..)
            .map(|nonce| format!("__argoflow_expr_{}_", nonce))
            .find(|prefix| !literals.iter().any(|text| text.contains(prefix.as_str())))
            .unwrap_or_default()
    }

    fn collect_literal_text(&self, out: &mut Vec<String>) {
        match self {
            ManifestValue::Literal(value) => out.push(value.to_string()),
            ManifestValue::Expr(_) => {}
            ManifestValue::List(items) => {
                for item in items {
                    item.collect_literal_text(out);
                }
            }
            ManifestValue::Object(fields) => {
                for (key, value) in fields {
                    out.push(key.clone());
                    value.collect_literal_text(out);
                }
            }
        }
    }

    fn to_placeholder_tree<'a>(
        &'a self,
        prefix: &str,
        placeholders: &mut Vec<&'a Expr>,
    ) -> BuildResult<serde_yaml::Value> {
        Ok(match self {
            ManifestValue::Literal(value) => serde_yaml::to_value(value)?,
            ManifestValue::Expr(expr) => {
                placeholders.push(expr);
                serde_yaml::Value::String(format!("{}{}__", prefix, placeholders.len() - 1))
            }
            ManifestValue::List(items) => serde_yaml::Value::Sequence(
                items
                    .iter()
                    .map(|item| item.to_placeholder_tree(prefix, placeholders))
                    .collect::<BuildResult<_>>()?,
            ),
            ManifestValue::Object(fields) => {
                let mut mapping = serde_yaml::Mapping::new();
                for (key, value) in fields {
                    mapping.insert(
                        serde_yaml::Value::String(key.clone()),
                        value.to_placeholder_tree(prefix, placeholders)?,
                    );
                }
                serde_yaml::Value::Mapping(mapping)
            }
        })
    }
}

impl From<Value> for ManifestValue {
    fn from(value: Value) -> Self {
        ManifestValue::Literal(value)
    }
}

impl From<Expr> for ManifestValue {
    fn from(expr: Expr) -> Self {
        ManifestValue::Expr(expr)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub action: ResourceAction,
    pub manifest: ManifestValue,
    pub success_condition: Option<String>,
    pub failure_condition: Option<String>,
    pub set_owner_reference: bool,
    pub merge_strategy: Option<MergeStrategy>,
}

pub struct ResourceBuilder {
    scope: BodyScope,
    action: Option<ResourceAction>,
    manifest: Option<ManifestValue>,
    success_condition: Option<String>,
    failure_condition: Option<String>,
    set_owner_reference: bool,
    merge_strategy: Option<MergeStrategy>,
    outputs: OutputDeclarations,
}

impl TemplateScope for ResourceBuilder {
    fn body_scope(&self) -> &BodyScope {
        &self.scope
    }
}

impl ResourceBuilder {
    pub(crate) fn new(scope: BodyScope) -> Self {
        ResourceBuilder {
            scope,
            action: None,
            manifest: None,
            success_condition: None,
            failure_condition: None,
            set_owner_reference: false,
            merge_strategy: None,
            outputs: OutputDeclarations::new(BodyKind::Resource),
        }
    }

    pub fn action(mut self, action: ResourceAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn manifest(mut self, manifest: impl Into<ManifestValue>) -> BuildResult<Self> {
        let manifest = manifest.into();
        for expr in manifest.expressions() {
            self.scope
                .check_references(expr, false, no_outputs_in("a resource manifest"))?;
        }
        self.manifest = Some(manifest);
        Ok(self)
    }

    pub fn success_condition(mut self, condition: impl Into<String>) -> Self {
        self.success_condition = Some(condition.into());
        self
    }

    pub fn failure_condition(mut self, condition: impl Into<String>) -> Self {
        self.failure_condition = Some(condition.into());
        self
    }

    pub fn set_owner_reference(mut self, enabled: bool) -> Self {
        self.set_owner_reference = enabled;
        self
    }

    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = Some(strategy);
        self
    }

    pub fn add_output(mut self, name: &str, def: OutputParamDef) -> BuildResult<Self> {
        let scope = &self.scope;
        self.outputs.declare(&scope.template_name, name, def, |expr| {
            scope.check_references(expr, false, no_outputs_in("a resource template"))
        })?;
        Ok(self)
    }

    /// Read a field of the resulting resource, e.g. `{.metadata.name}`.
    pub fn add_json_path_output(
        self,
        name: &str,
        json_path: impl Into<String>,
        value_type: ValueType,
    ) -> BuildResult<Self> {
        self.add_output(
            name,
            OutputParamDef::new(value_type, OutputSource::JsonPath(json_path.into())),
        )
    }

    pub fn add_jq_output(
        self,
        name: &str,
        filter: impl Into<String>,
        value_type: ValueType,
    ) -> BuildResult<Self> {
        self.add_output(
            name,
            OutputParamDef::new(value_type, OutputSource::JqFilter(filter.into())),
        )
    }

    pub fn add_expression_output(self, name: &str, expr: Expr) -> BuildResult<Self> {
        self.add_output(name, OutputParamDef::from_expression(expr))
    }

    pub(crate) fn finish(self) -> BuildResult<(ResourceSpec, Scope<OutputParamDef>)> {
        let template = &self.scope.template_name;
        let action = self.action.ok_or_else(|| {
            BuildError::declaration(
                "WFB-DECL-005",
                format!("resource template '{}' has no action", template),
            )
        })?;
        let manifest = self.manifest.ok_or_else(|| {
            BuildError::declaration(
                "WFB-DECL-005",
                format!("resource template '{}' has no manifest", template),
            )
        })?;
        if self.merge_strategy.is_some() && action != ResourceAction::Patch {
            return Err(BuildError::declaration(
                "WFB-DECL-005",
                "mergeStrategy is only valid for the patch action",
            ));
        }
        debug!(template = %template, action = ?action, "built resource body");
        Ok((
            ResourceSpec {
                action,
                manifest,
                success_condition: self.success_condition,
                failure_condition: self.failure_condition,
                set_owner_reference: self.set_owner_reference,
                merge_strategy: self.merge_strategy,
            },
            self.outputs.into_scope(),
        ))
    }
}
