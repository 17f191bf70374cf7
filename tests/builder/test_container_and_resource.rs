use argoflow::core::workflow_builder::container::env_var_name;
use argoflow::core::workflow_builder::{
    Expr, ManifestValue, MergeStrategy, OutputParamDef, OutputSource, ParamSource, PullPolicy,
    ResourceAction, ResourceRequirements, Template, TemplateBuilder, TemplateScope, ValueType,
    WorkflowBuilder,
};
use argoflow::core::BuildResult;
use indexmap::IndexMap;
use serde_json::json;

#[test]
fn env_var_names_are_upper_snake_case() {
    assert_eq!(env_var_name("retryCount"), "RETRY_COUNT");
    assert_eq!(env_var_name("log-level"), "LOG_LEVEL");
    assert_eq!(env_var_name("s3Bucket2"), "S3_BUCKET2");
    assert_eq!(env_var_name("already_snake"), "ALREADY_SNAKE");
}

#[test]
fn inputs_become_environment_variables() {
    let wf = WorkflowBuilder::create("env")
        .unwrap()
        .add_template("job", |t| {
            t.add_required_input("retryCount", ValueType::Number)?
                .add_optional_input("logLevel", "info")?
                .add_container(|c| {
                    c.image("ghcr.io/acme/job:1.2")?
                        .image_pull_policy(PullPolicy::IfNotPresent)
                        .command(["/bin/job"])
                        .working_dir("/work")
                        .resources(ResourceRequirements {
                            requests: IndexMap::from([("cpu".to_string(), "250m".to_string())]),
                            limits: IndexMap::new(),
                        })
                        .add_inputs_as_env_vars()
                })
        })
        .unwrap()
        .build()
        .unwrap();

    let scope = wf.get_full_scope().unwrap();
    assert_eq!(
        scope["templates"]["job"]["body"]["container"],
        json!({
            "image": "ghcr.io/acme/job:1.2",
            "imagePullPolicy": "IfNotPresent",
            "command": ["/bin/job"],
            "workingDir": "/work",
            "env": {
                "RETRY_COUNT": "{{inputs.parameters.retryCount}}",
                "LOG_LEVEL": "{{inputs.parameters.logLevel}}"
            },
            "resources": {"requests": {"cpu": "250m"}}
        })
    );
}

#[test]
fn image_is_required() {
    let err = WorkflowBuilder::create("broken")
        .unwrap()
        .add_template("job", |t| t.add_container(|c| Ok(c.command(["true"]))))
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-005");
    assert!(err.message.contains("no image"));
}

#[test]
fn container_args_and_env_check_references() {
    let err = WorkflowBuilder::create("broken")
        .unwrap()
        .add_template("job", |t| {
            t.add_container(|c| {
                let ghost = Expr::parameter(ParamSource::Input, "ghost", ValueType::String);
                c.image("alpine")?.add_env_var("GHOST", ghost)
            })
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-REF-001");
    assert_eq!(err.context.get("env").map(String::as_str), Some("GHOST"));
}

#[test]
fn output_sources_depend_on_the_body() {
    let err = WorkflowBuilder::create("outputs")
        .unwrap()
        .add_template("job", |t| {
            t.add_container(|c| {
                c.image("alpine")?.add_output(
                    "name",
                    OutputParamDef::new(
                        ValueType::String,
                        OutputSource::JsonPath("{.metadata.name}".to_string()),
                    ),
                )
            })
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-005");
    assert_eq!(err.context.get("output").map(String::as_str), Some("name"));

    let err = WorkflowBuilder::create("outputs")
        .unwrap()
        .add_template("apply", |t| {
            t.add_resource_task(|r| {
                r.action(ResourceAction::Create)
                    .manifest(json!({"kind": "ConfigMap"}))?
                    .add_output(
                        "file",
                        OutputParamDef::new(ValueType::String, OutputSource::Path("/tmp/x".into())),
                    )
            })
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-005");
}

fn config_map(t: TemplateBuilder) -> BuildResult<Template> {
    t.add_required_input("name", ValueType::String)?
        .add_optional_input("replicas", 2)?
        .add_resource_task(|r| {
            let name = r.input("name")?;
            let replicas = r.input("replicas")?;
            let manifest = ManifestValue::object([
                ("apiVersion", ManifestValue::from(json!("v1"))),
                ("kind", json!("ConfigMap").into()),
                (
                    "metadata",
                    ManifestValue::object([("name", ManifestValue::from(name))]),
                ),
                (
                    "data",
                    ManifestValue::object([(
                        "replicas",
                        ManifestValue::from(Expr::as_string(replicas)?),
                    )]),
                ),
            ]);
            r.action(ResourceAction::Apply)
                .manifest(manifest)?
                .success_condition("status.phase == Active")
                .set_owner_reference(true)
                .add_json_path_output("created", "{.metadata.name}", ValueType::String)
        })
}

#[test]
fn resource_manifest_embeds_expressions() {
    let wf = WorkflowBuilder::create("resources")
        .unwrap()
        .add_template("apply", config_map)
        .unwrap()
        .build()
        .unwrap();
    let scope = wf.get_full_scope().unwrap();
    let resource = &scope["templates"]["apply"]["body"]["resource"];
    assert_eq!(resource["action"], json!("apply"));
    assert_eq!(resource["successCondition"], json!("status.phase == Active"));
    assert_eq!(resource["setOwnerReference"], json!(true));
    let manifest = resource["manifest"].as_str().unwrap();
    assert!(manifest.contains("name: '{{inputs.parameters.name}}'"));
    assert!(manifest.contains("replicas: '{{=string(asFloat(inputs.parameters.replicas))}}'"));
    assert_eq!(
        scope["templates"]["apply"]["outputs"]["created"]["from"],
        json!({"jsonPath": "{.metadata.name}"})
    );
}

#[test]
fn resource_requires_action_and_manifest() {
    let err = WorkflowBuilder::create("broken")
        .unwrap()
        .add_template("apply", |t| t.add_resource_task(|r| r.manifest(json!({}))))
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-005");
    assert!(err.message.contains("no action"));

    let err = WorkflowBuilder::create("broken")
        .unwrap()
        .add_template("apply", |t| t.add_resource_task(|r| Ok(r.action(ResourceAction::Get))))
        .unwrap_err();
    assert!(err.message.contains("no manifest"));
}

#[test]
fn merge_strategy_only_for_patch() {
    let err = WorkflowBuilder::create("broken")
        .unwrap()
        .add_template("apply", |t| {
            t.add_resource_task(|r| {
                Ok(r.action(ResourceAction::Apply)
                    .manifest(json!({"kind": "ConfigMap"}))?
                    .merge_strategy(MergeStrategy::Merge))
            })
        })
        .unwrap_err();
    assert_eq!(err.code, "WFB-DECL-005");

    let wf = WorkflowBuilder::create("patch")
        .unwrap()
        .add_template("apply", |t| {
            t.add_resource_task(|r| {
                Ok(r.action(ResourceAction::Patch)
                    .manifest(json!({"kind": "ConfigMap"}))?
                    .merge_strategy(MergeStrategy::Merge))
            })
        })
        .unwrap()
        .build()
        .unwrap();
    let scope = wf.get_full_scope().unwrap();
    assert_eq!(
        scope["templates"]["apply"]["body"]["resource"]["mergeStrategy"],
        json!("merge")
    );
}
