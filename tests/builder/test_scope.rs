use argoflow::core::types::ErrorCategory;
use argoflow::core::workflow_builder::scope::{extend_scope, Scope};
use argoflow::core::workflow_builder::{
    Expr, InputParamDef, TemplateScope, ValueType, WorkflowBuilder,
};

#[test]
fn duplicate_inputs_are_rejected_case_insensitively() {
    for (first, second) in [("Region", "region"), ("region", "REGION")] {
        let err = WorkflowBuilder::create("wf")
            .unwrap()
            .add_template("t", |t| {
                t.add_required_input(first, ValueType::String)?
                    .add_required_input(second, ValueType::Number)?
                    .add_container(|c| c.image("alpine"))
            })
            .unwrap_err();
        assert_eq!(err.code, "WFB-DECL-001");
        assert_eq!(err.category, ErrorCategory::DeclarationError);
        assert_eq!(err.template(), Some("t"));
        assert_eq!(err.context.get("parameter").map(String::as_str), Some(second));
    }
}

#[test]
fn duplicate_template_and_parameter_names_are_rejected() {
    let builder = WorkflowBuilder::create("wf")
        .unwrap()
        .add_required_param("Env", ValueType::String)
        .unwrap();
    let err = builder
        .clone()
        .add_optional_param("env", "prod")
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-001");

    let builder = builder
        .add_template("echo", |t| t.add_container(|c| c.image("alpine")))
        .unwrap();
    let err = builder
        .add_template("Echo", |t| t.add_container(|c| c.image("alpine")))
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-001");
    assert_eq!(err.context.get("workflow").map(String::as_str), Some("wf"));
}

#[test]
fn duplicate_steps_tasks_and_outputs_are_rejected() {
    let base = WorkflowBuilder::create("wf")
        .unwrap()
        .add_template("noop", |t| t.add_container(|c| c.image("alpine")))
        .unwrap();

    let err = base
        .clone()
        .add_template("steps", |t| {
            t.add_steps(|s| {
                s.add_internal_step("Run", "noop", Ok)?
                    .add_internal_step("run", "noop", Ok)
            })
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-001");
    assert_eq!(err.context.get("step").map(String::as_str), Some("run"));

    let err = base
        .clone()
        .add_template("dag", |t| {
            t.add_dag(|d| {
                d.add_internal_task("fetch", "noop", Ok)?
                    .add_internal_task("FETCH", "noop", Ok)
            })
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-001");

    let err = base
        .add_template("out", |t| {
            t.add_container(|c| {
                c.image("alpine")?
                    .add_path_output("Result", "/tmp/a", ValueType::String)?
                    .add_path_output("result", "/tmp/b", ValueType::String)
            })
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-001");
    assert_eq!(err.context.get("output").map(String::as_str), Some("result"));
}

#[test]
fn names_must_be_addressable() {
    let err = WorkflowBuilder::create("wf")
        .unwrap()
        .add_required_param("has space", ValueType::String)
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-004");
    assert!(WorkflowBuilder::create("").is_err());
}

#[test]
fn extend_scope_keeps_declaration_order() {
    let base = Scope::new("input")
        .with("b", 1)
        .unwrap()
        .with("a", 2)
        .unwrap();
    let delta = Scope::new("input").with("c", 3).unwrap();
    let merged = extend_scope(&base, &delta).unwrap();
    assert_eq!(merged.names().collect::<Vec<_>>(), vec!["b", "a", "c"]);

    let clash = Scope::new("input").with("A", 9).unwrap();
    assert_eq!(extend_scope(&base, &clash).unwrap_err().code, "WFB-DECL-001");
}

#[test]
fn unknown_names_list_what_is_declared() {
    let err = WorkflowBuilder::create("wf")
        .unwrap()
        .add_template("t", |t| {
            let t = t
                .add_required_input("alpha", ValueType::String)?
                .add_required_input("beta", ValueType::String)?;
            t.input("gamma")?;
            t.add_container(|c| c.image("alpine"))
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-002");
    assert!(err.message.contains("[alpha, beta]"), "{}", err.message);
}

#[test]
fn optional_input_defaults_may_read_earlier_inputs() {
    let wf = WorkflowBuilder::create("wf")
        .unwrap()
        .add_template("t", |t| {
            t.add_required_input("host", ValueType::String)?
                .add_optional_input_with("url", |t| {
                    Expr::concat(vec![Expr::literal("https://"), t.input("host")?])
                })?
                .add_container(|c| c.image("alpine"))
        })
        .unwrap()
        .build()
        .unwrap();
    let url: &InputParamDef = wf.template("t").unwrap().inputs().get("url").unwrap();
    assert!(!url.is_required());
    assert_eq!(url.value_type, ValueType::String);
}
