use super::ArgoflowConfig;
use crate::core::error::{BuildError, BuildResult};
use crate::core::types::OutputFormat;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "argoflow.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `argoflow.toml` from `dir`, falling back to defaults when it is absent.
    /// Environment variables override file values.
    pub fn load_from_dir(dir: &Path) -> BuildResult<ArgoflowConfig> {
        let file = Self::load_from_file(&dir.join(CONFIG_FILE_NAME))?;
        Self::finish(file.unwrap_or_default())
    }

    /// Load an explicitly requested config file. A missing file is an error here.
    pub fn load_explicit(path: &Path) -> BuildResult<ArgoflowConfig> {
        match Self::load_from_file(path)? {
            Some(config) => Self::finish(config),
            None => Err(BuildError::configuration(format!(
                "config file {} does not exist",
                path.display()
            ))
            .with_code("WFB-CFG-002")),
        }
    }

    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> BuildResult<Option<ArgoflowConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            BuildError::from(e).with_context("config", path.display().to_string())
        })?;

        let config: ArgoflowConfig = toml::from_str(&content).map_err(|e| {
            BuildError::configuration(format!(
                "failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "loaded config file");
        Ok(Some(config))
    }

    fn finish(mut config: ArgoflowConfig) -> BuildResult<ArgoflowConfig> {
        Self::apply_env_overrides(&mut config)?;
        super::ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Environment variables take precedence over config file values.
    fn apply_env_overrides(config: &mut ArgoflowConfig) -> BuildResult<()> {
        if let Ok(level) = env::var("ARGOFLOW_LOG_LEVEL") {
            if !level.trim().is_empty() {
                config.logging.default_level = level;
            }
        }

        if let Ok(format) = env::var("ARGOFLOW_RENDER_FORMAT") {
            config.render.format = format.parse::<OutputFormat>().map_err(|e| {
                BuildError::configuration(format!("ARGOFLOW_RENDER_FORMAT: {}", e))
            })?;
        }

        if let Ok(dir) = env::var("ARGOFLOW_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                config.render.output_dir = Some(PathBuf::from(dir));
            }
        }

        Ok(())
    }

    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "ARGOFLOW_LOG_LEVEL - Override logging.default_level (RUST_LOG still wins)",
            "ARGOFLOW_RENDER_FORMAT - Override render.format (yaml/json)",
            "ARGOFLOW_OUTPUT_DIR - Override render.output_dir",
        ]
    }
}
