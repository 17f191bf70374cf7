use crate::core::types::OutputFormat;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Workflow documents, in load order (later documents may templateRef earlier ones)
    #[arg(value_name = "DOCUMENT", required = true)]
    pub documents: Vec<PathBuf>,

    /// Output encoding (default: render.format from argoflow.toml, else yaml)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Emit the structured scope object instead of the engine manifest
    #[arg(long)]
    pub full_scope: bool,

    /// Write one file per workflow into this directory instead of stdout
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Manifest kind (WorkflowTemplate, ClusterWorkflowTemplate or Workflow)
    #[arg(long, value_name = "KIND")]
    pub kind: Option<String>,
}

#[derive(Args, Debug)]
pub struct LintArgs {
    /// Workflow documents, in load order
    #[arg(value_name = "DOCUMENT", required = true)]
    pub documents: Vec<PathBuf>,

    /// Exit with an error when any warning is reported
    #[arg(long)]
    pub deny_warnings: bool,
}

#[derive(Args, Debug)]
pub struct DotArgs {
    /// Workflow documents; the graph is drawn for the last one
    #[arg(value_name = "DOCUMENT", required = true)]
    pub documents: Vec<PathBuf>,

    /// Draw the task graph of this dag template instead of the template call graph
    #[arg(long, value_name = "TEMPLATE")]
    pub template: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Workflow documents; the template is looked up in the last one
    #[arg(value_name = "DOCUMENT", required = true)]
    pub documents: Vec<PathBuf>,

    /// Template whose outputs are explained
    #[arg(long, value_name = "TEMPLATE")]
    pub template: String,

    /// Bind a value: NAME=V (input), workflow.NAME=V, steps.S.NAME=V, tasks.T.NAME=V, item=V
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub bindings: Vec<String>,
}
