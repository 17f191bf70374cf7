//! Container template bodies.

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::expression::Expr;
use crate::core::workflow_builder::outputs::{BodyKind, OutputDeclarations};
use crate::core::workflow_builder::params::{OutputParamDef, OutputSource};
use crate::core::workflow_builder::scope::Scope;
use crate::core::workflow_builder::template::{no_outputs_in, BodyScope, TemplateScope};
use crate::core::workflow_builder::value_type::ValueType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullPolicy {
    Always,
    IfNotPresent,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub requests: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub limits: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub image: Expr,
    pub image_pull_policy: Option<PullPolicy>,
    pub command: Vec<String>,
    pub args: Vec<Expr>,
    pub working_dir: Option<String>,
    pub env: Scope<Expr>,
    pub resources: Option<ResourceRequirements>,
}

/// `retryCount` -> `RETRY_COUNT`, `log-level` -> `LOG_LEVEL`.
pub fn env_var_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut previous: Option<char> = None;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            let boundary = c.is_ascii_uppercase()
                && previous.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit());
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_uppercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
        previous = Some(c);
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

pub struct ContainerBuilder {
    scope: BodyScope,
    image: Option<Expr>,
    image_pull_policy: Option<PullPolicy>,
    command: Vec<String>,
    args: Vec<Expr>,
    working_dir: Option<String>,
    env: Scope<Expr>,
    resources: Option<ResourceRequirements>,
    outputs: OutputDeclarations,
}

impl TemplateScope for ContainerBuilder {
    fn body_scope(&self) -> &BodyScope {
        &self.scope
    }
}

impl ContainerBuilder {
    pub(crate) fn new(scope: BodyScope) -> Self {
        ContainerBuilder {
            scope,
            image: None,
            image_pull_policy: None,
            command: Vec::new(),
            args: Vec::new(),
            working_dir: None,
            env: Scope::new("environment variable"),
            resources: None,
            outputs: OutputDeclarations::new(BodyKind::Container),
        }
    }

    fn check(&self, expr: &Expr) -> BuildResult<()> {
        self.scope
            .check_references(expr, false, no_outputs_in("a container template"))
    }

    pub fn image(mut self, image: impl Into<Expr>) -> BuildResult<Self> {
        let image = image.into();
        if !image.value_type().is_string_like() {
            return Err(BuildError::type_error(
                "WFB-TYPE-001",
                format!("container image must be a string, got {}", image.value_type()),
            ));
        }
        self.check(&image)?;
        self.image = Some(image);
        Ok(self)
    }

    pub fn image_pull_policy(mut self, policy: PullPolicy) -> Self {
        self.image_pull_policy = Some(policy);
        self
    }

    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn arg(mut self, arg: impl Into<Expr>) -> BuildResult<Self> {
        let arg = arg.into();
        self.check(&arg)?;
        self.args.push(arg);
        Ok(self)
    }

    pub fn args<I, E>(self, args: I) -> BuildResult<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        args.into_iter().try_fold(self, |builder, arg| builder.arg(arg))
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn resources(mut self, resources: ResourceRequirements) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn add_env_var(mut self, name: &str, value: impl Into<Expr>) -> BuildResult<Self> {
        let value = value.into();
        self.check(&value)
            .and_then(|_| self.env.insert(name, value))
            .map_err(|e| e.with_context("env", name))?;
        Ok(self)
    }

    /// Expose every current input as an environment variable named in UPPER_SNAKE_CASE.
    pub fn add_inputs_as_env_vars(self) -> BuildResult<Self> {
        self.add_inputs_as_env_vars_with(env_var_name)
    }

    /// Like [`add_inputs_as_env_vars`](Self::add_inputs_as_env_vars) with a custom name mapping.
    pub fn add_inputs_as_env_vars_with<F>(self, rename: F) -> BuildResult<Self>
    where
        F: Fn(&str) -> String,
    {
        let inputs = self.inputs();
        let mut builder = self;
        for (name, expr) in inputs {
            builder = builder
                .add_env_var(&rename(&name), expr)
                .map_err(|e| e.for_parameter(&name))?;
        }
        Ok(builder)
    }

    pub fn add_output(mut self, name: &str, def: OutputParamDef) -> BuildResult<Self> {
        let scope = &self.scope;
        self.outputs.declare(&scope.template_name, name, def, |expr| {
            scope.check_references(expr, false, no_outputs_in("a container template"))
        })?;
        Ok(self)
    }

    pub fn add_path_output(
        self,
        name: &str,
        path: impl Into<String>,
        value_type: ValueType,
    ) -> BuildResult<Self> {
        self.add_output(
            name,
            OutputParamDef::new(value_type, OutputSource::Path(path.into())),
        )
    }

    pub fn add_expression_output(self, name: &str, expr: Expr) -> BuildResult<Self> {
        self.add_output(name, OutputParamDef::from_expression(expr))
    }

    pub(crate) fn finish(self) -> BuildResult<(ContainerSpec, Scope<OutputParamDef>)> {
        let image = self.image.ok_or_else(|| {
            BuildError::declaration(
                "WFB-DECL-005",
                format!("container template '{}' has no image", self.scope.template_name),
            )
        })?;
        debug!(
            template = %self.scope.template_name,
            env = self.env.len(),
            args = self.args.len(),
            "built container body"
        );
        Ok((
            ContainerSpec {
                image,
                image_pull_policy: self.image_pull_policy,
                command: self.command,
                args: self.args,
                working_dir: self.working_dir,
                env: self.env,
                resources: self.resources,
            },
            self.outputs.into_scope(),
        ))
    }
}
