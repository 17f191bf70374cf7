use argoflow::core::workflow_builder::{load_documents, RenderOptions, WorkflowDocument};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn template_refs_resolve_against_earlier_documents() {
    let workflows = load_documents(&[fixture("shared.yaml"), fixture("pipeline.yaml")]).unwrap();
    assert_eq!(workflows.len(), 2);
    let pipeline = &workflows[1];

    let scope = pipeline.get_full_scope().unwrap();
    let tasks = &scope["templates"]["main"]["body"]["dag"];
    assert_eq!(
        tasks[1],
        json!({
            "name": "notify",
            "templateRef": {"name": "shared", "template": "notify"},
            "dependencies": ["fetch"],
            "args": {"message": "{{tasks.fetch.outputs.parameters.body}}"}
        })
    );
    assert_eq!(tasks[2]["args"]["letters"], json!("[\"x\",\"y\"]"));

    let manifest: Value =
        serde_yaml::from_str(&pipeline.render(&RenderOptions::default()).unwrap()).unwrap();
    assert_eq!(manifest["metadata"]["labels"], json!({"team": "data"}));
    assert_eq!(
        manifest["spec"]["templates"][1]["outputs"]["parameters"][0]["valueFrom"],
        json!({"expression": "len(fromJSON(inputs.parameters.letters))"})
    );
}

#[test]
fn document_order_matters() {
    let err = load_documents(&[fixture("pipeline.yaml"), fixture("shared.yaml")]).unwrap_err();
    assert_eq!(err.code, "WFB-DOC-006");
    assert_eq!(err.context.get("task").map(String::as_str), Some("notify"));
    assert!(err
        .context
        .get("document")
        .is_some_and(|path| path.ends_with("pipeline.yaml")));
}

#[test]
fn duplicate_workflow_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    let copy = dir.path().join("shared-again.yaml");
    fs::copy(fixture("shared.yaml"), &copy).unwrap();

    let err = load_documents(&[fixture("shared.yaml"), copy]).unwrap_err();
    assert_eq!(err.code, "WFB-DECL-001");
}

#[test]
fn missing_documents_are_io_errors() {
    let dir = TempDir::new().unwrap();
    let err = load_documents(&[dir.path().join("absent.yaml")]).unwrap_err();
    assert_eq!(err.code, "WFB-IO-001");
}

#[test]
fn documents_follow_builder_rules() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("late.yaml");
    fs::write(
        &path,
        r#"
name: late
templates:
  - name: main
    steps:
      - - name: run
          template: worker
  - name: worker
    container:
      image: alpine
"#,
    )
    .unwrap();
    let err = load_documents(&[path]).unwrap_err();
    assert_eq!(err.code, "WFB-DECL-002");
    assert_eq!(err.template(), Some("main"));
}

#[test]
fn typed_defaults_and_expression_defaults() {
    let document = WorkflowDocument::from_yaml_str(
        r#"
name: typed
parameters:
  - name: env
    type: string
  - name: bucket
    type: string
    default: {$concat: [{$workflow: env}, "-data"]}
  - name: retries
    type: number
    default: 3
templates:
  - name: noop
    container:
      image: alpine
"#,
    )
    .unwrap();
    let workflow = document.build(&[]).unwrap();
    let scope = workflow.get_full_scope().unwrap();
    assert_eq!(
        scope["workflowParameters"]["bucket"]["default"],
        json!("{{workflow.parameters.env}}-data")
    );
    assert_eq!(scope["workflowParameters"]["retries"]["type"], json!("number"));

    let err = WorkflowDocument::from_yaml_str("name: t\nparameters:\n  - name: p\n")
        .unwrap()
        .build(&[])
        .unwrap_err();
    assert_eq!(err.code, "WFB-DOC-008");

    let err = WorkflowDocument::from_yaml_str(
        "name: t\nparameters:\n  - name: p\n    type: {tuple: string}\n",
    )
    .unwrap_err();
    assert_eq!(err.code, "WFB-DOC-001");
}

#[test]
fn invocations_need_exactly_one_target() {
    let err = WorkflowDocument::from_yaml_str(
        r#"
name: t
templates:
  - name: noop
    container:
      image: alpine
  - name: main
    dag:
      - name: a
        template: noop
        templateRef: {name: other, template: noop}
"#,
    )
    .unwrap()
    .build(&[])
    .unwrap_err();
    assert_eq!(err.code, "WFB-DOC-007");
}
