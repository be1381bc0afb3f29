use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{WidgetError, WidgetResult};

/// Generator settings, loadable from YAML. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Translation domain passed to `esc_html__`
    pub text_domain: String,
    /// `@package` tag of the generated file docblock
    pub package: String,
    pub default_category: String,
    pub default_icon: String,
    /// Drop style rules that match nothing in the parsed markup
    pub prune_unused_css: bool,
    /// Prefix style selectors with `{{WRAPPER}}`
    pub scope_css: bool,
    pub max_keywords: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            text_domain: "hustle-tools".to_string(),
            package: "Hustle_Tools".to_string(),
            default_category: "general".to_string(),
            default_icon: "eicon-code".to_string(),
            prune_unused_css: true,
            scope_css: true,
            max_keywords: 10,
        }
    }
}

impl GeneratorConfig {
    pub fn from_yaml(yaml: &str) -> WidgetResult<Self> {
        let config: GeneratorConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> WidgetResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> WidgetResult<()> {
        static DOMAIN_REGEX: OnceLock<Regex> = OnceLock::new();
        static PACKAGE_REGEX: OnceLock<Regex> = OnceLock::new();
        let domain_re = DOMAIN_REGEX.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").unwrap());
        let package_re =
            PACKAGE_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

        if !domain_re.is_match(&self.text_domain) {
            return Err(WidgetError::ConfigError(format!(
                "text_domain '{}' must be a lowercase slug",
                self.text_domain
            )));
        }
        if !package_re.is_match(&self.package) {
            return Err(WidgetError::ConfigError(format!(
                "package '{}' must be a PHP identifier",
                self.package
            )));
        }
        if self.default_category.trim().is_empty() {
            return Err(WidgetError::ConfigError(
                "default_category must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config =
            GeneratorConfig::from_yaml("text_domain: my-plugin\nscope_css: false\n").unwrap();
        assert_eq!(config.text_domain, "my-plugin");
        assert!(!config.scope_css);
        assert_eq!(config.package, "Hustle_Tools");
        assert_eq!(config.max_keywords, 10);
    }

    #[test]
    fn test_rejects_bad_text_domain() {
        let err = GeneratorConfig::from_yaml("text_domain: \"My Plugin\"\n").unwrap_err();
        assert!(matches!(err, WidgetError::ConfigError(_)));
    }

    #[test]
    fn test_rejects_bad_package() {
        let err = GeneratorConfig::from_yaml("package: 9lives\n").unwrap_err();
        assert!(matches!(err, WidgetError::ConfigError(_)));
    }

    #[test]
    fn test_rejects_unknown_yaml_shape() {
        let err = GeneratorConfig::from_yaml("prune_unused_css: maybe\n").unwrap_err();
        assert!(matches!(err, WidgetError::YamlError(_)));
    }
}
