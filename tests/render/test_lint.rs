use argoflow::core::workflow_builder::{
    load_documents, Expr, LintRegistry, LintResult, LintSeverity, TemplateScope, ValueType, WorkflowBuilder,
};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn codes(results: &[LintResult]) -> Vec<&str> {
    results.iter().map(|r| r.code.as_str()).collect()
}

#[test]
fn fixture_pipeline_is_clean() {
    let workflows = load_documents(&[fixture("shared.yaml"), fixture("pipeline.yaml")]).unwrap();
    let registry = LintRegistry::new();

    let shared = registry.run(&workflows[0]);
    assert_eq!(codes(&shared), vec!["WFB-LINT-004"]);
    assert_eq!(shared[0].severity, LintSeverity::Info);

    assert!(registry.run(&workflows[1]).is_empty());
}

#[test]
fn smelly_document_reports_warnings() {
    let workflows = load_documents(&[fixture("smelly.yaml")]).unwrap();
    let results = LintRegistry::new().run(&workflows[0]);
    assert_eq!(
        codes(&results),
        vec!["WFB-LINT-001", "WFB-LINT-002", "WFB-LINT-006"]
    );
    assert!(results
        .iter()
        .all(|r| r.severity == LintSeverity::Warning));
    assert_eq!(results[0].location.as_deref(), Some("idle.inputs.ignored"));
    assert_eq!(
        results[0].to_string(),
        "warning [WFB-LINT-001] input 'ignored' of template 'idle' is never used (at idle.inputs.ignored)"
    );
}

#[test]
fn unreachable_templates_are_reported() {
    let wf = WorkflowBuilder::create("reach")
        .unwrap()
        .add_template("orphan", |t| t.add_container(|c| Ok(c.image("alpine")?.command(["true"]))))
        .unwrap()
        .add_template("main", |t| t.add_container(|c| Ok(c.image("alpine")?.command(["true"]))))
        .unwrap()
        .set_entrypoint("main")
        .unwrap()
        .build()
        .unwrap();
    let results = LintRegistry::new().run(&wf);
    assert_eq!(codes(&results), vec!["WFB-LINT-003"]);
    assert_eq!(results[0].location.as_deref(), Some("orphan"));
}

#[test]
fn expression_conditions_are_noted() {
    let wf = WorkflowBuilder::create("gated")
        .unwrap()
        .add_template("noop", |t| t.add_container(|c| Ok(c.image("alpine")?.command(["true"]))))
        .unwrap()
        .add_template("main", |t| {
            t.add_required_input("mode", ValueType::String)?
                .add_required_input("shards", ValueType::array(ValueType::String))?
                .add_dag(|d| {
                    let mode = d.input("mode")?;
                    let plain = Expr::equals(mode, Expr::literal("fast"))?;
                    let shards = d.input("shards")?;
                    let block = Expr::greater_than(Expr::length(shards)?, Expr::literal(1))?;
                    d.add_internal_task("fast", "noop", |i| Ok(i.when(plain)))?
                        .add_internal_task("sharded", "noop", |i| Ok(i.when(block)))
                })
        })
        .unwrap()
        .set_entrypoint("main")
        .unwrap()
        .build()
        .unwrap();
    let results = LintRegistry::new().run(&wf);
    assert_eq!(codes(&results), vec!["WFB-LINT-005"]);
    assert_eq!(results[0].location.as_deref(), Some("main.sharded"));
}
