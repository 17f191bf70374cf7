//! Typed builder for Argo workflow templates.
//!
//! A [`WorkflowBuilder`] accumulates workflow parameters and templates. Every
//! template is built through a consuming [`TemplateBuilder`] that first declares
//! inputs and then exactly one body (container, steps, dag or resource). All
//! names are checked when they are declared, so a [`Workflow`] that builds
//! successfully always renders.

pub mod container;
pub mod dag;
pub mod document;
pub mod dot;
pub mod expression;
pub mod lint;
pub(crate) mod outputs;
pub mod params;
pub mod render;
pub mod resource;
pub mod scope;
pub mod steps;
pub mod task;
pub mod template;
pub mod value_type;
pub mod workflow;

pub use container::{ContainerBuilder, PullPolicy, ResourceRequirements};
pub use dag::DagBuilder;
pub use document::{load_documents, WorkflowDocument};
pub use expression::{Complexity, Expr, ExprKind, JsonPath, ParamSource, WorkflowVariable};
pub use lint::{LintRegistry, LintResult, LintSeverity};
pub use params::{InputParamDef, OutputParamDef, OutputSource};
pub use render::RenderOptions;
pub use resource::{ManifestValue, MergeStrategy, ResourceAction, ResourceBuilder};
pub use scope::Scope;
pub use steps::{StepGroupBuilder, StepsBuilder};
pub use task::{Invocation, LoopSource, TemplateTarget};
pub use template::{
    Backoff, RetryPolicy, RetryStrategy, Template, TemplateBody, TemplateBuilder, TemplateScope,
    TemplateSignature,
};
pub use value_type::ValueType;
pub use workflow::{Workflow, WorkflowBuilder, WorkflowMetadata};
