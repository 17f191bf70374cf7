use argoflow::core::types::OutputFormat;
use argoflow::core::workflow_builder::{
    Expr, RenderOptions, TemplateScope, ValueType, Workflow, WorkflowBuilder,
};
use insta::assert_snapshot;
use serde_json::{json, Value};

fn hello() -> Workflow {
    WorkflowBuilder::create("hello")
        .unwrap()
        .add_template("main", |t| {
            t.add_container(|c| c.image("alpine")?.command(["echo"]).arg("hello"))
        })
        .unwrap()
        .set_entrypoint("main")
        .unwrap()
        .build()
        .unwrap()
}

fn release() -> Workflow {
    WorkflowBuilder::create("release")
        .unwrap()
        .add_optional_param("channel", "stable")
        .unwrap()
        .add_template("deploy", |t| {
            t.add_required_input("region", ValueType::String)?
                .add_optional_input("replicas", 2)?
                .add_container(|c| {
                    c.image("ghcr.io/acme/deploy:1")?
                        .command(["deploy"])
                        .add_inputs_as_env_vars()?
                        .add_path_output("url", "/tmp/url", ValueType::String)
                })
        })
        .unwrap()
        .add_template("main", |t| {
            t.add_dag(|d| {
                let channel = d.workflow_parameter("channel")?;
                let stable = Expr::equals(channel, Expr::literal("stable"))?;
                let d = d.add_internal_task("eu", "deploy", |i| {
                    Ok(i.arg("region", "eu-west-1").when(stable))
                })?;
                let url = d.task_output("eu", "url")?;
                d.add_internal_task("fanout", "deploy", |i| {
                    let i = i
                        .with_items(vec![json!("us-east-1"), json!("ap-south-1")])?
                        .depends_on(["eu"]);
                    let region = i.item()?;
                    Ok(i.arg("region", region))
                })?
                .add_parameter_output("url", url)
            })
        })
        .unwrap()
        .set_entrypoint("main")
        .unwrap()
        .build()
        .unwrap()
}

#[test]
fn container_workflow_yaml() {
    let yaml = hello().render(&RenderOptions::default()).unwrap();
    assert_snapshot!(yaml, @r###"
    apiVersion: argoproj.io/v1alpha1
    kind: WorkflowTemplate
    metadata:
      name: hello
    spec:
      entrypoint: main
      templates:
      - name: main
        container:
          image: alpine
          command:
          - echo
          args:
          - hello
    "###);
}

#[test]
fn dag_workflow_manifest() {
    let yaml = release().render(&RenderOptions::default()).unwrap();
    let manifest: Value = serde_yaml::from_str(&yaml).unwrap();

    assert_eq!(
        manifest["spec"]["arguments"],
        json!({"parameters": [{"name": "channel", "value": "stable"}]})
    );

    let deploy = &manifest["spec"]["templates"][0];
    assert_eq!(
        deploy["inputs"],
        json!({"parameters": [{"name": "region"}, {"name": "replicas", "default": "2"}]})
    );
    assert_eq!(
        deploy["outputs"],
        json!({"parameters": [{"name": "url", "valueFrom": {"path": "/tmp/url"}}]})
    );
    assert_eq!(
        deploy["container"]["env"],
        json!([
            {"name": "REGION", "value": "{{inputs.parameters.region}}"},
            {"name": "REPLICAS", "value": "{{inputs.parameters.replicas}}"}
        ])
    );

    let main = &manifest["spec"]["templates"][1];
    assert!(main.get("inputs").is_none());
    assert_eq!(
        main["dag"]["tasks"],
        json!([
            {
                "name": "eu",
                "template": "deploy",
                "arguments": {"parameters": [
                    {"name": "region", "value": "eu-west-1"},
                    {"name": "replicas", "value": "2"}
                ]},
                "when": "'{{workflow.parameters.channel}}' == 'stable'"
            },
            {
                "name": "fanout",
                "template": "deploy",
                "dependencies": ["eu"],
                "arguments": {"parameters": [
                    {"name": "region", "value": "{{item}}"},
                    {"name": "replicas", "value": "2"}
                ]},
                "withItems": ["us-east-1", "ap-south-1"]
            }
        ])
    );
    assert_eq!(
        main["outputs"]["parameters"][0]["valueFrom"],
        json!({"parameter": "{{tasks.eu.outputs.parameters.url}}"})
    );
}

#[test]
fn json_output_matches_yaml() {
    let wf = release();
    let yaml: Value =
        serde_yaml::from_str(&wf.render(&RenderOptions::default()).unwrap()).unwrap();
    let text = wf
        .render(&RenderOptions::default().with_format(OutputFormat::Json))
        .unwrap();
    assert!(text.ends_with("}\n"));
    let json: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(yaml, json);
}

#[test]
fn kind_is_validated() {
    let err = hello()
        .render(&RenderOptions::default().with_kind("CronWorkflow"))
        .unwrap_err();
    assert_eq!(err.code, "WFB-REND-001");
    assert_eq!(err.context.get("workflow").map(String::as_str), Some("hello"));

    let cluster = hello()
        .to_manifest(&RenderOptions::default().with_kind("ClusterWorkflowTemplate"))
        .unwrap();
    assert_eq!(cluster.kind, "ClusterWorkflowTemplate");
}

#[test]
fn workflow_kind_requires_an_entrypoint() {
    let library = WorkflowBuilder::create("library")
        .unwrap()
        .add_template("noop", |t| t.add_container(|c| c.image("alpine")))
        .unwrap()
        .build()
        .unwrap();
    let options = RenderOptions::default().with_kind("Workflow");
    assert_eq!(library.render(&options).unwrap_err().code, "WFB-REND-002");
    assert!(library.render(&RenderOptions::default()).is_ok());
    assert!(hello().render(&options).is_ok());
}

#[test]
fn expression_conditions_use_expression_blocks() {
    let wf = WorkflowBuilder::create("gated")
        .unwrap()
        .add_template("noop", |t| t.add_container(|c| c.image("alpine")))
        .unwrap()
        .add_template("main", |t| {
            t.add_required_input("shards", ValueType::array(ValueType::String))?
                .add_steps(|s| {
                    let shards = s.input("shards")?;
                    let any = Expr::greater_than(Expr::length(shards)?, Expr::literal(0))?;
                    s.add_internal_step("run", "noop", |i| Ok(i.when(any)))
                })
        })
        .unwrap()
        .build()
        .unwrap();
    let manifest = wf.to_manifest(&RenderOptions::default()).unwrap();
    let steps = manifest.spec.templates[1].steps.as_ref().unwrap();
    assert_eq!(
        steps[0][0].when.as_deref(),
        Some("{{=(len(fromJSON(inputs.parameters.shards)) > 0)}}")
    );
    assert!(steps[0][0].dependencies.is_none());
}
