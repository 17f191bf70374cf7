use argoflow::core::config::loader::CONFIG_FILE_NAME;
use argoflow::core::config::ConfigLoader;
use argoflow::core::types::OutputFormat;
use argoflow::logging::{ConsoleOutput, LogFormat};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_argoflow_env() {
    for v in &[
        "ARGOFLOW_LOG_LEVEL",
        "ARGOFLOW_RENDER_FORMAT",
        "ARGOFLOW_OUTPUT_DIR",
    ] {
        env::remove_var(v);
    }
}

#[test]
#[serial]
fn test_config_file_is_loaded_from_directory() {
    clear_argoflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        r#"
[logging]
default_level = "argoflow=debug,warn"
console_output = "stdout"
format = "json"

[render]
format = "json"
output_dir = "manifests"
kind = "Workflow"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_dir(temp_dir.path()).unwrap();
    assert_eq!(config.logging.default_level, "argoflow=debug,warn");
    assert_eq!(config.logging.console_output, ConsoleOutput::Stdout);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.render.format, OutputFormat::Json);
    assert_eq!(config.render.output_dir, Some(PathBuf::from("manifests")));

    let options = config.render.options();
    assert_eq!(options.kind, "Workflow");
    assert_eq!(options.api_version, "argoproj.io/v1alpha1");
}

#[test]
#[serial]
fn test_environment_overrides_file_values() {
    clear_argoflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "[logging]\ndefault_level = \"error\"\n",
    )
    .unwrap();
    env::set_var("ARGOFLOW_LOG_LEVEL", "info");
    env::set_var("ARGOFLOW_RENDER_FORMAT", "YML");

    let config = ConfigLoader::load_from_dir(temp_dir.path());
    clear_argoflow_env();
    let config = config.unwrap();

    assert_eq!(config.logging.default_level, "info");
    assert_eq!(config.render.format, OutputFormat::Yaml);
}

#[test]
#[serial]
fn test_blank_environment_values_are_ignored() {
    clear_argoflow_env();
    let temp_dir = TempDir::new().unwrap();
    env::set_var("ARGOFLOW_LOG_LEVEL", "  ");
    env::set_var("ARGOFLOW_OUTPUT_DIR", "");

    let config = ConfigLoader::load_from_dir(temp_dir.path());
    clear_argoflow_env();
    let config = config.unwrap();

    assert_eq!(config.logging.default_level, "warn");
    assert_eq!(config.render.output_dir, None);
}

#[test]
#[serial]
fn test_invalid_values_are_configuration_errors() {
    clear_argoflow_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(CONFIG_FILE_NAME);

    fs::write(&path, "[render]\nkind = \"CronWorkflow\"\n").unwrap();
    let err = ConfigLoader::load_from_dir(temp_dir.path()).unwrap_err();
    assert_eq!(err.code, "WFB-CFG-001");

    fs::write(&path, "[render]\nformat = \"xml\"\n").unwrap();
    let err = ConfigLoader::load_from_dir(temp_dir.path()).unwrap_err();
    assert_eq!(err.code, "WFB-CFG-001");
    assert!(err.message.contains("argoflow.toml"));

    fs::write(&path, "[executor]\ncoding_agent = \"x\"\n").unwrap();
    assert!(ConfigLoader::load_from_dir(temp_dir.path()).is_err());
}

#[test]
#[serial]
fn test_explicit_config_must_exist() {
    clear_argoflow_env();
    let temp_dir = TempDir::new().unwrap();
    let err = ConfigLoader::load_explicit(&temp_dir.path().join("custom.toml")).unwrap_err();
    assert_eq!(err.code, "WFB-CFG-002");

    let path = temp_dir.path().join("custom.toml");
    fs::write(&path, "[render]\nformat = \"json\"\n").unwrap();
    let config = ConfigLoader::load_explicit(&path).unwrap();
    assert_eq!(config.render.format, OutputFormat::Json);
}

#[test]
fn test_env_var_documentation_lists_every_override() {
    let docs = ConfigLoader::env_var_documentation();
    assert_eq!(docs.len(), 3);
    assert!(docs.iter().all(|line| line.starts_with("ARGOFLOW_")));
}
