//! Output declarations shared by the four body builders.

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::expression::Expr;
use crate::core::workflow_builder::params::{OutputParamDef, OutputSource};
use crate::core::workflow_builder::scope::Scope;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyKind {
    Container,
    Steps,
    Dag,
    Resource,
}

impl BodyKind {
    fn label(&self) -> &'static str {
        match self {
            BodyKind::Container => "container",
            BodyKind::Steps => "steps",
            BodyKind::Dag => "dag",
            BodyKind::Resource => "resource",
        }
    }

    fn supports(&self, source: &OutputSource) -> bool {
        match source {
            OutputSource::Path(_) => *self == BodyKind::Container,
            OutputSource::JsonPath(_) | OutputSource::JqFilter(_) => *self == BodyKind::Resource,
            OutputSource::Expression(_)
            | OutputSource::Parameter(_)
            | OutputSource::Event(_)
            | OutputSource::ConfigMapKey { .. }
            | OutputSource::Supplied => true,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OutputDeclarations {
    kind: BodyKind,
    scope: Scope<OutputParamDef>,
}

impl OutputDeclarations {
    pub(crate) fn new(kind: BodyKind) -> Self {
        OutputDeclarations {
            kind,
            scope: Scope::new("output"),
        }
    }

    /// Register an output. `check` validates the names an expression source reads.
    pub(crate) fn declare<F>(
        &mut self,
        template: &str,
        name: &str,
        def: OutputParamDef,
        check: F,
    ) -> BuildResult<()>
    where
        F: FnOnce(&Expr) -> BuildResult<()>,
    {
        self.declare_inner(name, def, check)
            .map_err(|e| e.for_output(name))?;
        debug!(
            template = template,
            output = name,
            body = self.kind.label(),
            "registered template output"
        );
        Ok(())
    }

    fn declare_inner<F>(&mut self, name: &str, def: OutputParamDef, check: F) -> BuildResult<()>
    where
        F: FnOnce(&Expr) -> BuildResult<()>,
    {
        self.scope.check_available(name)?;
        if !self.kind.supports(&def.source) {
            return Err(BuildError::declaration(
                "WFB-DECL-005",
                format!(
                    "{} outputs are not supported in {} templates",
                    def.source.kind(),
                    self.kind.label()
                ),
            ));
        }
        if let Some(expr) = def.source.expression() {
            if !expr.value_type().is_assignable_to(&def.value_type) {
                return Err(BuildError::type_error(
                    "WFB-TYPE-003",
                    format!(
                        "output declared as {} but its source produces {}",
                        def.value_type,
                        expr.value_type()
                    ),
                ));
            }
            check(expr)?;
        }
        self.scope.insert(name, def)
    }

    pub(crate) fn into_scope(self) -> Scope<OutputParamDef> {
        self.scope
    }
}
