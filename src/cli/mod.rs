pub mod args;
pub mod commands;

pub use args::{DotArgs, ExplainArgs, LintArgs, RenderArgs};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "argoflow")]
#[command(version = crate::VERSION)]
#[command(about = "Typed builder and renderer for Argo workflow templates")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: lint a set of workflow documents, render them to manifests, then explain outputs that look surprising."
)]
pub struct Args {
    /// Config file (default: ./argoflow.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Render workflow documents to Argo manifests",
        long_about = "Render replays each document through the typed builder and prints a WorkflowTemplate manifest, or the structured scope object with --full-scope.",
        after_help = "Example:\n    argoflow render shared.yaml pipeline.yaml --format json --out-dir build/"
    )]
    Render(RenderArgs),
    #[command(
        about = "Report suspicious but valid workflow constructs",
        long_about = "Lint builds each document and runs the built-in rules: unused inputs and parameters, unreachable templates, missing entrypoint, expression-block conditions, containers without a command.",
        after_help = "Example:\n    argoflow lint pipeline.yaml --deny-warnings"
    )]
    Lint(LintArgs),
    #[command(
        about = "Export a Graphviz graph of a workflow",
        long_about = "Dot prints the template call graph of the last document, or the task graph of one dag template.",
        after_help = "Example:\n    argoflow dot pipeline.yaml --template main | dot -Tsvg > main.svg"
    )]
    Dot(DotArgs),
    #[command(
        about = "Evaluate a template's outputs against sample values",
        long_about = "Explain lowers every output of a template and evaluates expression outputs with the bound values, using the same semantics as the rendered expressions.",
        after_help = "Example:\n    argoflow explain pipeline.yaml --template main --set workflow.attempts=3 --set tasks.a.body='{\"ok\":true}'"
    )]
    Explain(ExplainArgs),
}

pub fn run(args: Args, config: &crate::core::ArgoflowConfig) -> crate::Result<()> {
    match args.command {
        Command::Render(render_args) => commands::render(render_args, config),
        Command::Lint(lint_args) => commands::lint(lint_args),
        Command::Dot(dot_args) => commands::dot(dot_args),
        Command::Explain(explain_args) => commands::explain(explain_args),
    }
}
