use super::ArgoflowConfig;
use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::render::SUPPORTED_KINDS;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &ArgoflowConfig) -> BuildResult<()> {
        config
            .logging
            .validate()
            .map_err(|e| BuildError::configuration(e.to_string()))?;

        if !SUPPORTED_KINDS.contains(&config.render.kind.as_str()) {
            return Err(BuildError::configuration(format!(
                "render.kind '{}' is not supported; expected one of {}",
                config.render.kind,
                SUPPORTED_KINDS.join(", ")
            )));
        }

        if config.render.api_version.trim().is_empty() {
            return Err(BuildError::configuration(
                "render.api_version cannot be empty",
            ));
        }

        Ok(())
    }
}
