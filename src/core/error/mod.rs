use crate::core::types::ErrorCategory;
use indexmap::IndexMap;

/// Structured error raised while declaring, rendering or evaluating a workflow.
///
/// `context` records where in the builder chain the error happened (workflow,
/// template, task, parameter...). Keys are inserted innermost first and are never
/// overwritten as the error travels outward.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub context: IndexMap<String, String>,
}

pub type BuildResult<T> = Result<T, BuildError>;

impl BuildError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        BuildError {
            category,
            code: format!("{}-000", category.code_prefix()),
            message: message.into(),
            context: IndexMap::new(),
        }
    }

    pub fn declaration<T: Into<String>>(code: &str, message: T) -> Self {
        BuildError::new(ErrorCategory::DeclarationError, message).with_code(code)
    }

    pub fn type_error<T: Into<String>>(code: &str, message: T) -> Self {
        BuildError::new(ErrorCategory::TypeError, message).with_code(code)
    }

    pub fn reference<T: Into<String>>(code: &str, message: T) -> Self {
        BuildError::new(ErrorCategory::ReferenceError, message).with_code(code)
    }

    pub fn render<T: Into<String>>(code: &str, message: T) -> Self {
        BuildError::new(ErrorCategory::RenderError, message).with_code(code)
    }

    /// A renderer or builder invariant did not hold. Never caused by caller input.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        BuildError::new(ErrorCategory::InternalError, message).with_code("WFB-INT-001")
    }

    pub fn evaluation<T: Into<String>>(message: T) -> Self {
        BuildError::new(ErrorCategory::EvaluationError, message).with_code("WFB-EVAL-001")
    }

    pub fn document<T: Into<String>>(message: T) -> Self {
        BuildError::new(ErrorCategory::DocumentError, message).with_code("WFB-DOC-001")
    }

    pub fn configuration<T: Into<String>>(message: T) -> Self {
        BuildError::new(ErrorCategory::ConfigurationError, message).with_code("WFB-CFG-001")
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    /// Attach a context entry unless an inner frame already recorded one.
    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.context.entry(key.into()).or_insert_with(|| value.into());
        self
    }

    pub fn in_workflow(self, name: &str) -> Self {
        self.with_context("workflow", name)
    }

    pub fn in_template(self, name: &str) -> Self {
        self.with_context("template", name)
    }

    pub fn for_parameter(self, name: &str) -> Self {
        self.with_context("parameter", name)
    }

    pub fn for_task(self, name: &str) -> Self {
        self.with_context("task", name)
    }

    pub fn for_step(self, name: &str) -> Self {
        self.with_context("step", name)
    }

    pub fn for_output(self, name: &str) -> Self {
        self.with_context("output", name)
    }

    pub fn template(&self) -> Option<&str> {
        self.context.get("template").map(String::as_str)
    }

    pub fn is_internal(&self) -> bool {
        self.category == ErrorCategory::InternalError
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            let location: Vec<String> = self
                .context
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            write!(f, " (at {})", location.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildError {}

impl From<std::io::Error> for BuildError {
    fn from(e: std::io::Error) -> Self {
        BuildError::new(ErrorCategory::IoError, e.to_string()).with_code("WFB-IO-001")
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(e: serde_json::Error) -> Self {
        BuildError::new(ErrorCategory::SerializationError, e.to_string()).with_code("WFB-SER-001")
    }
}

impl From<serde_yaml::Error> for BuildError {
    fn from(e: serde_yaml::Error) -> Self {
        BuildError::new(ErrorCategory::SerializationError, e.to_string()).with_code("WFB-SER-002")
    }
}
