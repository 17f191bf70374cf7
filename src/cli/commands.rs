use crate::cli::args::{DotArgs, ExplainArgs, LintArgs, RenderArgs};
use crate::core::config::ArgoflowConfig;
use crate::core::types::OutputFormat;
use crate::core::workflow_builder::dot::{dag_to_dot, workflow_to_dot};
use crate::core::workflow_builder::expression::evaluate::{evaluate, EvaluationContext};
use crate::core::workflow_builder::expression::render::template_string;
use crate::core::workflow_builder::{load_documents, LintRegistry, LintSeverity, Workflow};
use crate::Result;
use anyhow::{anyhow, bail, Context};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn load(documents: &[PathBuf]) -> Result<Vec<Workflow>> {
    Ok(load_documents(documents)?)
}

fn last(workflows: &[Workflow]) -> Result<&Workflow> {
    workflows
        .last()
        .ok_or_else(|| anyhow!("at least one workflow document is required"))
}

fn encode(value: &Value, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(value)?;
            text.push('\n');
            text
        }
    })
}

fn output_file(dir: &Path, workflow: &str, full_scope: bool, format: OutputFormat) -> PathBuf {
    let stem = if full_scope {
        format!("{}.scope", workflow)
    } else {
        workflow.to_string()
    };
    dir.join(format!("{}.{}", stem, format))
}

pub fn render(args: RenderArgs, config: &ArgoflowConfig) -> Result<()> {
    let mut options = config.render.options();
    if let Some(format) = args.format {
        options = options.with_format(format);
    }
    if let Some(kind) = args.kind {
        options = options.with_kind(kind);
    }
    let out_dir = args.out_dir.or_else(|| config.render.output_dir.clone());

    let workflows = load(&args.documents)?;
    let mut rendered = Vec::with_capacity(workflows.len());
    for workflow in &workflows {
        let text = if args.full_scope {
            encode(&workflow.get_full_scope()?, options.format)?
        } else {
            workflow.render(&options)?
        };
        rendered.push((workflow.name(), text));
    }

    match out_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create output directory {}", dir.display()))?;
            for (name, text) in rendered {
                let path = output_file(&dir, name, args.full_scope, options.format);
                fs::write(&path, text)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), "wrote manifest");
            }
        }
        None => {
            let separator = match options.format {
                OutputFormat::Yaml => "---\n",
                OutputFormat::Json => "",
            };
            let texts: Vec<String> = rendered.into_iter().map(|(_, text)| text).collect();
            print!("{}", texts.join(separator));
        }
    }
    Ok(())
}

pub fn lint(args: LintArgs) -> Result<()> {
    let workflows = load(&args.documents)?;
    let registry = LintRegistry::new();
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for workflow in &workflows {
        for result in registry.run(workflow) {
            match result.severity {
                LintSeverity::Error => errors += 1,
                LintSeverity::Warning => warnings += 1,
                LintSeverity::Info => {}
            }
            if result.severity != LintSeverity::Info {
                warn!(workflow = %workflow.name(), code = %result.code, "{}", result.message);
            }
            println!("{}: {}", workflow.name(), result);
            if let Some(suggestion) = &result.suggestion {
                println!("    help: {}", suggestion);
            }
        }
    }

    if errors > 0 || (args.deny_warnings && warnings > 0) {
        bail!("lint failed: {} error(s), {} warning(s)", errors, warnings);
    }
    Ok(())
}

pub fn dot(args: DotArgs) -> Result<()> {
    let workflows = load(&args.documents)?;
    let workflow = last(&workflows)?;
    let text = match &args.template {
        Some(template) => dag_to_dot(workflow, template)?,
        None => workflow_to_dot(workflow),
    };
    println!("{}", text);
    Ok(())
}

/// Values given on the command line arrive as the raw strings the engine would
/// hold; loop items are parsed as JSON when possible.
fn bind(ctx: EvaluationContext, binding: &str) -> Result<EvaluationContext> {
    let (key, value) = binding
        .split_once('=')
        .ok_or_else(|| anyhow!("binding '{}' must look like KEY=VALUE", binding))?;
    let raw = Value::String(value.to_string());
    let parts: Vec<&str> = key.split('.').collect();
    Ok(match parts.as_slice() {
        ["item"] => {
            ctx.with_item(serde_json::from_str::<Value>(value).unwrap_or(raw))
        }
        ["workflow", name] => ctx.with_workflow_parameter(*name, raw),
        ["steps", step, name] => ctx.with_step_output(*step, *name, raw),
        ["tasks", task, name] => ctx.with_task_output(*task, *name, raw),
        [name] => ctx.with_input(*name, raw),
        _ => bail!("unrecognised binding key '{}'", key),
    })
}

pub fn explain(args: ExplainArgs) -> Result<()> {
    let workflows = load(&args.documents)?;
    let workflow = last(&workflows)?;
    let template = workflow.template(&args.template).ok_or_else(|| {
        anyhow!(
            "workflow '{}' has no template '{}'",
            workflow.name(),
            args.template
        )
    })?;

    let mut ctx = EvaluationContext::new();
    for binding in &args.bindings {
        ctx = bind(ctx, binding)?;
    }
    // Unbound parameters fall back to their defaults, as the engine does.
    for (name, def) in workflow.parameters().iter() {
        if ctx.workflow.contains_key(name) {
            continue;
        }
        if let Some(Ok(value)) = def.default.as_ref().map(|d| evaluate(d, &ctx)) {
            ctx.workflow.insert(name.to_string(), value);
        }
    }
    for (name, def) in template.inputs().iter() {
        if ctx.inputs.contains_key(name) {
            continue;
        }
        if let Some(Ok(value)) = def.default.as_ref().map(|d| evaluate(d, &ctx)) {
            ctx.inputs.insert(name.to_string(), value);
        }
    }

    println!("{} ({})", template.name(), template.body().kind());
    if template.outputs().is_empty() {
        println!("  no outputs");
    }
    for (name, def) in template.outputs().iter() {
        let Some(expr) = def.source.expression() else {
            println!(
                "  {}: {} from {} (resolved at run time)",
                name,
                def.value_type,
                def.source.kind()
            );
            continue;
        };
        println!("  {}: {} = {}", name, def.value_type, template_string(expr));
        match evaluate(expr, &ctx) {
            Ok(value) => println!("    => {}", serde_json::to_string(&value)?),
            Err(err) => println!("    => unresolved: {}", err.message),
        }
    }
    Ok(())
}
