use argoflow::core::workflow_builder::{
    Backoff, Expr, InputParamDef, ParamSource, RetryPolicy, RetryStrategy, TemplateScope, ValueType,
    WorkflowBuilder, WorkflowMetadata,
};
use serde_json::json;

fn etl() -> WorkflowBuilder {
    let builder = WorkflowBuilder::create(
        WorkflowMetadata::new("etl")
            .with_namespace("data")
            .with_label("team", "platform"),
    )
    .unwrap()
    .add_param(
        "env",
        InputParamDef::required(ValueType::String).with_description("target environment"),
    )
    .unwrap();
    let env = builder.workflow_parameter("env").unwrap();
    builder
        .add_optional_param("bucket", Expr::concat(vec![env, Expr::literal("-bucket")]).unwrap())
        .unwrap()
}

#[test]
fn workflow_level_sections() {
    let wf = etl()
        .add_template("extract", |t| {
            t.add_container(|c| {
                let bucket = c.workflow_parameter("bucket")?;
                c.image("ghcr.io/acme/extract:2")?.arg(bucket)
            })
        })
        .unwrap()
        .set_entrypoint("extract")
        .unwrap()
        .build()
        .unwrap();

    let scope = wf.get_full_scope().unwrap();
    assert_eq!(
        scope["metadata"],
        json!({"name": "etl", "namespace": "data", "labels": {"team": "platform"}})
    );
    assert_eq!(
        scope["workflowParameters"],
        json!({
            "env": {"type": "string", "required": true, "description": "target environment"},
            "bucket": {
                "type": "string",
                "required": false,
                "default": "{{workflow.parameters.env}}-bucket"
            }
        })
    );
    assert_eq!(scope["entrypoint"], json!("extract"));
    assert_eq!(
        scope["templates"]["extract"]["body"]["container"]["args"],
        json!(["{{workflow.parameters.bucket}}"])
    );
    let keys: Vec<&str> = scope.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["metadata", "workflowParameters", "templates", "entrypoint"]);
}

#[test]
fn entrypoint_is_omitted_when_unset() {
    let wf = etl()
        .add_template("noop", |t| t.add_container(|c| c.image("alpine")))
        .unwrap()
        .build()
        .unwrap();
    let scope = wf.get_full_scope().unwrap();
    assert!(scope.get("entrypoint").is_none());
}

#[test]
fn parameter_defaults_only_see_earlier_parameters() {
    let err = WorkflowBuilder::create("etl")
        .unwrap()
        .add_param(
            "bucket",
            InputParamDef::optional(Expr::parameter(
                ParamSource::Workflow,
                "env",
                ValueType::String,
            )),
        )
        .unwrap_err();
    assert_eq!(err.code, "WFB-REF-001");
    assert_eq!(err.context.get("parameter").map(String::as_str), Some("bucket"));
}

#[test]
fn template_settings_are_rendered() {
    let wf = etl()
        .add_template("flaky", |t| {
            t.with_retry_strategy(
                RetryStrategy::limit(3)
                    .with_policy(RetryPolicy::OnError)
                    .with_backoff(Backoff {
                        duration: "10s".to_string(),
                        factor: Some(2),
                        max_duration: None,
                    }),
            )?
            .with_active_deadline(600)
            .add_container(|c| c.image("alpine"))
        })
        .unwrap()
        .build()
        .unwrap();
    let scope = wf.get_full_scope().unwrap();
    let flaky = &scope["templates"]["flaky"];
    assert_eq!(
        flaky["retryStrategy"],
        json!({"limit": 3, "retryPolicy": "OnError", "backoff": {"duration": "10s", "factor": 2}})
    );
    assert_eq!(flaky["activeDeadlineSeconds"], json!(600));
}

#[test]
fn invalid_backoff_is_rejected() {
    let err = etl()
        .add_template("flaky", |t| {
            t.with_retry_strategy(RetryStrategy::limit(1).with_backoff(Backoff {
                duration: " ".to_string(),
                factor: None,
                max_duration: None,
            }))?
            .add_container(|c| c.image("alpine"))
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-006");
}

#[test]
fn typed_inputs_and_expression_outputs() {
    let wf = etl()
        .add_template("score", |t| {
            t.add_required_input("weights", ValueType::array(ValueType::Number))?
            .add_optional_input_typed("verbose", ValueType::Boolean, Expr::literal(false))?
            .add_container(|c| {
                let weights = c.input("weights")?;
                let count = Expr::length(weights)?;
                c.image("alpine")?.add_expression_output("count", count)
            })
        })
        .unwrap()
        .build()
        .unwrap();
    let scope = wf.get_full_scope().unwrap();
    assert_eq!(
        scope["templates"]["score"]["inputs"],
        json!({
            "weights": {"type": "array<number>", "required": true},
            "verbose": {"type": "boolean", "required": false, "default": "false"}
        })
    );
    assert_eq!(
        scope["templates"]["score"]["outputs"]["count"],
        json!({
            "type": "number",
            "from": {"expression": "len(fromJSON(inputs.parameters.weights))"}
        })
    );
}

#[test]
fn the_builder_can_render_before_build() {
    let builder = etl()
        .add_template("noop", |t| t.add_container(|c| c.image("alpine")))
        .unwrap();
    let before = builder.get_full_scope().unwrap();
    let after = builder.build().unwrap().get_full_scope().unwrap();
    assert_eq!(before, after);
}
