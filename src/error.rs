use thiserror::Error;

use crate::diagnostic::ValidationResult;

pub type WidgetResult<T> = Result<T, WidgetError>;

#[derive(Error, Debug, Clone)]
pub enum WidgetError {
    #[error("Catalog error: {0}")]
    CatalogError(String),

    #[error("Catalog has no fallback entry '{tag}'")]
    MissingFallback { tag: String },

    #[error("Template '{tag}' extends unknown template '{base}'")]
    UnknownBaseTemplate { tag: String, base: String },

    #[error("Circular template inheritance detected: {chain}")]
    CircularInheritance { chain: String },

    #[error("Duplicate control id '{id}' in the {list} list of template '{tag}'")]
    DuplicateControlId {
        tag: String,
        list: String,
        id: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("YAML error: {0}")]
    YamlError(String),

    #[error("Invalid widget name '{name}': must contain at least one letter or digit")]
    InvalidWidgetName { name: String },

    #[error("Metadata inference failed: {0}")]
    InferenceFailed(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Failed to write widget source: {0}")]
    WriteError(String),

    #[error("Generated widget failed validation with {} error(s)", .result.errors.len())]
    ValidationFailed {
        result: ValidationResult,
        /// The rejected module text, kept for debugging and regeneration loops.
        generated: String,
    },
}

impl From<serde_yaml::Error> for WidgetError {
    fn from(err: serde_yaml::Error) -> Self {
        WidgetError::YamlError(err.to_string())
    }
}

impl From<std::io::Error> for WidgetError {
    fn from(err: std::io::Error) -> Self {
        WidgetError::Io(err.to_string())
    }
}

impl From<std::fmt::Error> for WidgetError {
    fn from(err: std::fmt::Error) -> Self {
        WidgetError::WriteError(err.to_string())
    }
}
