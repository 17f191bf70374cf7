use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    DeclarationError,
    TypeError,
    ReferenceError,
    RenderError,
    InternalError,
    EvaluationError,
    DocumentError,
    ConfigurationError,
    IoError,
    SerializationError,
}

impl ErrorCategory {
    /// Short area tag used when building default error codes.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            ErrorCategory::DeclarationError => "WFB-DECL",
            ErrorCategory::TypeError => "WFB-TYPE",
            ErrorCategory::ReferenceError => "WFB-REF",
            ErrorCategory::RenderError => "WFB-REND",
            ErrorCategory::InternalError => "WFB-INT",
            ErrorCategory::EvaluationError => "WFB-EVAL",
            ErrorCategory::DocumentError => "WFB-DOC",
            ErrorCategory::ConfigurationError => "WFB-CFG",
            ErrorCategory::IoError => "WFB-IO",
            ErrorCategory::SerializationError => "WFB-SER",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Output encoding for rendered manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "invalid output format '{}'; supported values are yaml, json",
                other
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Yaml => write!(f, "yaml"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
