use crate::core::types::OutputFormat;
use crate::core::workflow_builder::render::{RenderOptions, DEFAULT_API_VERSION, DEFAULT_KIND};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;

/// Tool configuration loaded from argoflow.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ArgoflowConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub render: RenderConfig,
}

/// Render configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Directory manifests are written to; stdout when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            format: OutputFormat::default(),
            output_dir: None,
            api_version: default_api_version(),
            kind: default_kind(),
        }
    }
}

impl RenderConfig {
    pub fn options(&self) -> RenderOptions {
        RenderOptions {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            format: self.format,
        }
    }
}
