use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const BIN: &str = "argoflow";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Runs from an empty directory so no stray argoflow.toml is picked up.
fn argoflow(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.current_dir(workdir.path())
        .env_remove("RUST_LOG")
        .env_remove("ARGOFLOW_LOG_LEVEL")
        .env_remove("ARGOFLOW_RENDER_FORMAT")
        .env_remove("ARGOFLOW_OUTPUT_DIR");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("COMMANDS:"))
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("explain"));
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_render_prints_yaml_documents() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .arg("render")
        .arg(fixture("shared.yaml"))
        .arg(fixture("pipeline.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("kind: WorkflowTemplate"))
        .stdout(predicate::str::contains("---\n"))
        .stdout(predicate::str::contains("templateRef:"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_render_to_directory() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("build");
    argoflow(&dir)
        .arg("render")
        .arg(fixture("shared.yaml"))
        .arg(fixture("pipeline.yaml"))
        .args(["--format", "json", "--full-scope", "--out-dir"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let text = fs::read_to_string(out.join("pipeline.scope.json")).unwrap();
    let scope: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(scope["entrypoint"], "main");
    assert!(out.join("shared.scope.json").exists());
}

#[test]
fn test_render_format_from_config_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("argoflow.toml"),
        "[render]\nformat = \"json\"\nkind = \"ClusterWorkflowTemplate\"\n",
    )
    .unwrap();
    argoflow(&dir)
        .arg("render")
        .arg(fixture("shared.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{"))
        .stdout(predicate::str::contains("\"kind\": \"ClusterWorkflowTemplate\""));
}

#[test]
fn test_render_rejects_unknown_kind() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .arg("render")
        .arg(fixture("shared.yaml"))
        .args(["--kind", "CronWorkflow"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("WFB-REND-001"));
}

#[test]
fn test_render_reports_document_errors() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .arg("render")
        .arg(fixture("pipeline.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("WFB-DOC-006"))
        .stderr(predicate::str::contains("pipeline.yaml"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .args(["--config", "nope.toml", "lint"])
        .arg(fixture("shared.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("WFB-CFG-002"));
}

#[test]
fn test_lint_clean_documents() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .arg("lint")
        .arg(fixture("shared.yaml"))
        .arg(fixture("pipeline.yaml"))
        .arg("--deny-warnings")
        .assert()
        .success()
        .stdout(predicate::str::contains("shared: info [WFB-LINT-004]"))
        .stdout(predicate::str::contains("pipeline:").not());
}

#[test]
fn test_lint_deny_warnings() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .arg("lint")
        .arg(fixture("smelly.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("smelly: warning [WFB-LINT-001]"))
        .stdout(predicate::str::contains("    help: "));

    argoflow(&dir)
        .arg("lint")
        .arg(fixture("smelly.yaml"))
        .arg("--deny-warnings")
        .assert()
        .failure()
        .stderr(predicate::str::contains("0 error(s), 3 warning(s)"));
}

#[test]
fn test_dot_exports_dag() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .arg("dot")
        .arg(fixture("shared.yaml"))
        .arg(fixture("pipeline.yaml"))
        .args(["--template", "main"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph"))
        .stdout(predicate::str::contains("notify (notify)"))
        .stdout(predicate::str::contains("0 -> 1"));

    argoflow(&dir)
        .arg("dot")
        .arg(fixture("shared.yaml"))
        .arg(fixture("pipeline.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("shared/notify (templateRef)"));
}

#[test]
fn test_explain_evaluates_outputs() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .arg("explain")
        .arg(fixture("shared.yaml"))
        .arg(fixture("pipeline.yaml"))
        .args(["--template", "summarize", "--set", r#"letters=["a","b","c"]"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("summarize (container)"))
        .stdout(predicate::str::contains(
            "count: number = {{=len(fromJSON(inputs.parameters.letters))}}",
        ))
        .stdout(predicate::str::contains("=> \"a\""));

    argoflow(&dir)
        .arg("explain")
        .arg(fixture("shared.yaml"))
        .arg(fixture("pipeline.yaml"))
        .args(["--template", "fetch"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "body: string from path (resolved at run time)",
        ));
}

#[test]
fn test_explain_reports_unbound_values() {
    let dir = TempDir::new().unwrap();
    argoflow(&dir)
        .arg("explain")
        .arg(fixture("shared.yaml"))
        .arg(fixture("pipeline.yaml"))
        .args(["--template", "summarize"])
        .assert()
        .success()
        .stdout(predicate::str::contains("=> unresolved:"));

    argoflow(&dir)
        .arg("explain")
        .arg(fixture("pipeline.yaml"))
        .args(["--template", "summarize", "--set", "bogus"])
        .assert()
        .failure();
}
