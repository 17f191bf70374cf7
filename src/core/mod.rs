pub mod config;
pub mod error;
pub mod types;
pub mod workflow_builder;

pub use config::{ArgoflowConfig, ConfigLoader};
pub use error::{BuildError, BuildResult};
pub use types::*;
