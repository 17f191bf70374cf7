use argoflow::core::types::ErrorCategory;
use argoflow::core::workflow_builder::{
    Expr, TemplateScope, ValueType, Workflow, WorkflowBuilder,
};
use serde_json::json;

/// `produce` writes an output `out`; `consume` takes a string input `value`.
fn base() -> WorkflowBuilder {
    WorkflowBuilder::create("pipeline")
        .unwrap()
        .add_template("produce", |t| {
            t.add_container(|c| {
                c.image("alpine")?
                    .command(["sh", "-c", "echo hi > /tmp/out"])
                    .add_path_output("out", "/tmp/out", ValueType::String)
            })
        })
        .unwrap()
        .add_template("consume", |t| {
            t.add_required_input("value", ValueType::String)?
                .add_container(|c| {
                    let value = c.input("value")?;
                    c.image("alpine")?.command(["echo"]).arg(value)
                })
        })
        .unwrap()
}

fn shared() -> Workflow {
    WorkflowBuilder::create("shared")
        .unwrap()
        .add_template("notify", |t| {
            t.add_required_input("msg", ValueType::String)?
                .add_container(|c| {
                    let msg = c.input("msg")?;
                    c.image("curlimages/curl")?.command(["curl", "-d"]).arg(msg)
                })
        })
        .unwrap()
        .build()
        .unwrap()
}

#[test]
fn dependent_task_may_read_upstream_outputs() {
    let wf = base()
        .add_template("main", |t| {
            t.add_dag(|d| {
                let d = d
                    .add_internal_task("a", "produce", Ok)?
                    .add_internal_task("b", "produce", |i| Ok(i.depends_on(["a"])))?;
                let out = d.task_output("a", "out")?;
                d.add_internal_task("c", "consume", |i| {
                    Ok(i.arg("value", out).depends_on(["b"]))
                })
            })
        })
        .unwrap()
        .build()
        .unwrap();

    let scope = wf.get_full_scope().unwrap();
    assert_eq!(
        scope["templates"]["main"]["body"]["dag"][2]["args"]["value"],
        json!("{{tasks.a.outputs.parameters.out}}")
    );
}

#[test]
fn task_without_a_dependency_path_cannot_read_outputs() {
    let err = base()
        .add_template("main", |t| {
            t.add_dag(|d| {
                let d = d
                    .add_internal_task("a", "produce", Ok)?
                    .add_internal_task("b", "produce", Ok)?;
                let out = d.task_output("a", "out")?;
                d.add_internal_task("c", "consume", |i| {
                    Ok(i.arg("value", out).depends_on(["b"]))
                })
            })
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-REF-002");
    assert_eq!(err.category, ErrorCategory::ReferenceError);
    assert_eq!(err.template(), Some("main"));
    assert_eq!(err.context.get("task").map(String::as_str), Some("c"));
}

#[test]
fn dependencies_must_already_exist() {
    let err = base()
        .add_template("main", |t| {
            t.add_dag(|d| d.add_internal_task("a", "produce", |i| Ok(i.depends_on(["later"]))))
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-002");
    assert!(err.message.contains("later"));

    let err = base()
        .add_template("main", |t| {
            t.add_dag(|d| d.add_internal_task("a", "produce", |i| Ok(i.depends_on(["a"]))))
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-002");
    assert!(err.message.contains("itself"));
}

#[test]
fn omitted_optional_inputs_take_their_default() {
    let wf = WorkflowBuilder::create("defaults")
        .unwrap()
        .add_template("worker", |t| {
            t.add_optional_input("attempts", 42)?
                .add_required_input("target", ValueType::String)?
                .add_container(|c| c.image("alpine"))
        })
        .unwrap()
        .add_template("main", |t| {
            t.add_dag(|d| d.add_internal_task("run", "worker", |i| Ok(i.arg("target", "db"))))
        })
        .unwrap()
        .build()
        .unwrap();
    let scope = wf.get_full_scope().unwrap();
    assert_eq!(
        scope["templates"]["main"]["body"]["dag"][0]["args"],
        json!({"attempts": "42", "target": "db"})
    );
    assert_eq!(
        scope["templates"]["worker"]["inputs"]["attempts"],
        json!({"type": "number", "required": false, "default": "42"})
    );

    let err = WorkflowBuilder::create("defaults")
        .unwrap()
        .add_template("worker", |t| {
            t.add_optional_input("attempts", 42)?
                .add_required_input("target", ValueType::String)?
                .add_container(|c| c.image("alpine"))
        })
        .unwrap()
        .add_template("main", |t| {
            t.add_dag(|d| d.add_internal_task("run", "worker", |i| Ok(i.arg("attempts", 1))))
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-003");
    assert_eq!(err.context.get("parameter").map(String::as_str), Some("target"));
}

#[test]
fn arguments_are_type_checked() {
    let err = base()
        .add_template("main", |t| {
            t.add_dag(|d| d.add_internal_task("c", "consume", |i| Ok(i.arg("value", 7))))
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-TYPE-003");

    let err = base()
        .add_template("main", |t| {
            t.add_dag(|d| d.add_internal_task("c", "consume", |i| Ok(i.arg("nope", "x"))))
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-002");
}

#[test]
fn empty_dag_renders_empty_collections() {
    let wf = WorkflowBuilder::create("empty")
        .unwrap()
        .add_template("nothing", |t| t.add_dag(Ok))
        .unwrap()
        .build()
        .unwrap();
    let scope = wf.get_full_scope().unwrap();
    assert_eq!(
        scope["templates"]["nothing"],
        json!({"inputs": {}, "outputs": {}, "body": {"dag": []}})
    );
}

#[test]
fn three_task_dag_keeps_declaration_order_and_template_refs() {
    let shared = shared();
    let wf = base()
        .add_template("main", |t| {
            t.add_dag(|d| {
                let d = d.add_internal_task("first", "produce", Ok)?;
                let out = d.task_output("first", "out")?;
                d.add_internal_task("second", "consume", |i| {
                    Ok(i.arg("value", out).depends_on(["first"]))
                })?
                .add_external_task("third", &shared, "notify", |i| {
                    Ok(i.arg("msg", "done").depends_on(["first", "second"]))
                })
            })
        })
        .unwrap()
        .build()
        .unwrap();

    let scope = wf.get_full_scope().unwrap();
    assert_eq!(
        scope["templates"]["main"]["body"]["dag"],
        json!([
            {"name": "first", "template": "produce", "dependencies": [], "args": {}},
            {
                "name": "second",
                "template": "consume",
                "dependencies": ["first"],
                "args": {"value": "{{tasks.first.outputs.parameters.out}}"}
            },
            {
                "name": "third",
                "templateRef": {"name": "shared", "template": "notify"},
                "dependencies": ["first", "second"],
                "args": {"msg": "done"}
            }
        ])
    );
    let names: Vec<&str> = scope["templates"]["main"]["body"]["dag"]
        .as_array()
        .unwrap()
        .iter()
        .map(|task| task["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[test]
fn template_outputs_may_read_any_task() {
    let wf = base()
        .add_template("main", |t| {
            t.add_dag(|d| {
                let d = d
                    .add_internal_task("a", "produce", Ok)?
                    .add_internal_task("b", "produce", Ok)?;
                let a = d.task_output("a", "out")?;
                let b = d.task_output("b", "out")?;
                d.add_expression_output("both", Expr::concat_with(",", vec![a, b])?)
            })
        })
        .unwrap()
        .build()
        .unwrap();
    let scope = wf.get_full_scope().unwrap();
    assert_eq!(
        scope["templates"]["main"]["outputs"]["both"]["from"]["expression"],
        json!("(tasks.a.outputs.parameters.out + ',' + tasks.b.outputs.parameters.out)")
    );
}
