//! End-to-end conversion: metadata, sanitize, parse, generate, validate.

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::GeneratorConfig;
use crate::diagnostic::ValidationResult;
use crate::error::{WidgetError, WidgetResult};
use crate::generator::{GeneratedWidget, WidgetGenerator};
use crate::metadata::{resolve_metadata, MetadataInference, MetadataSources, PartialMetadata};
use crate::parser::parse_markup;
use crate::sanitize::sanitize_markup;
use crate::validator::validate_widget;

/// Source text for one widget.
#[derive(Debug, Clone, Default)]
pub struct WidgetRequest<'a> {
    pub markup: &'a str,
    pub style: &'a str,
    pub behavior: &'a str,
    pub metadata: Option<PartialMetadata>,
}

impl<'a> WidgetRequest<'a> {
    pub fn new(markup: &'a str) -> Self {
        Self {
            markup,
            ..Default::default()
        }
    }

    pub fn with_style(mut self, style: &'a str) -> Self {
        self.style = style;
        self
    }

    pub fn with_behavior(mut self, behavior: &'a str) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_metadata(mut self, metadata: PartialMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A widget that passed validation. `validation` may still carry warnings.
#[derive(Debug, Clone)]
pub struct ConvertedWidget {
    pub widget: GeneratedWidget,
    pub validation: ValidationResult,
}

impl ConvertedWidget {
    pub fn source(&self) -> &str {
        self.widget.source.as_str()
    }
}

pub struct Converter<'a> {
    catalog: &'a Catalog,
    config: &'a GeneratorConfig,
    inference: Option<&'a dyn MetadataInference>,
}

impl<'a> Converter<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a GeneratorConfig) -> Self {
        Self {
            catalog,
            config,
            inference: None,
        }
    }

    pub fn with_inference(mut self, inference: &'a dyn MetadataInference) -> Self {
        self.inference = Some(inference);
        self
    }

    /// Run the whole pipeline. Nothing is delivered unless validation
    /// reports no errors; the rejected text travels inside the error.
    pub fn convert(&self, request: &WidgetRequest<'_>) -> WidgetResult<ConvertedWidget> {
        self.config.validate()?;

        let metadata = resolve_metadata(
            MetadataSources {
                explicit: request.metadata.as_ref(),
                markup: request.markup,
                style: request.style,
                behavior: request.behavior,
                inference: self.inference,
            },
            self.config,
        )?;

        let sanitized = sanitize_markup(request.markup);
        let elements = parse_markup(&sanitized.markup);
        if elements.is_empty() {
            warn!(widget = %metadata.name, "markup contains no elements");
        }

        let widget = WidgetGenerator::new(self.catalog, self.config).generate(
            &metadata,
            &elements,
            request.markup,
            request.style,
            request.behavior,
        )?;
        let validation = validate_widget(widget.source.as_str());

        if !validation.valid {
            warn!(
                widget = %metadata.name,
                errors = validation.errors.len(),
                "generated widget failed validation"
            );
            return Err(WidgetError::ValidationFailed {
                result: validation,
                generated: widget.source.into_string(),
            });
        }
        for issue in &validation.warnings {
            warn!(widget = %metadata.name, kind = %issue.kind, "{}", issue.message);
        }
        info!(widget = %metadata.name, class = %widget.class_name, "converted widget");

        Ok(ConvertedWidget { widget, validation })
    }
}

/// Convert with the built-in catalog and default settings.
pub fn convert(markup: &str, style: &str, behavior: &str) -> WidgetResult<ConvertedWidget> {
    let config = GeneratorConfig::default();
    let request = WidgetRequest::new(markup)
        .with_style(style)
        .with_behavior(behavior);
    Converter::new(Catalog::builtin(), &config).convert(&request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedInference(WidgetResult<PartialMetadata>);

    impl MetadataInference for FixedInference {
        fn infer(
            &self,
            _markup: &str,
            _style: &str,
            _behavior: &str,
        ) -> WidgetResult<PartialMetadata> {
            self.0.clone()
        }
    }

    #[test]
    fn test_convert_heading() {
        let converted = convert(r#"<h1 class="title">Welcome</h1>"#, "", "").unwrap();
        assert!(converted.validation.valid);
        assert_eq!(converted.validation.errors.len(), 0);
        assert_eq!(converted.widget.preview(), r#"<h1 class="title">Welcome</h1>"#);
        assert_eq!(converted.widget.metadata.name, "custom_widget");
    }

    #[test]
    fn test_full_document_is_reduced_to_fragment() {
        let markup = "<!DOCTYPE html>\n<html>\n<head><title>x</title><style>.card { padding: 1rem; } body { margin: 0; }</style></head>\n<body>\n<div class=\"card\"><p>Hi</p></div>\n</body>\n</html>";
        let converted = convert(markup, "", "").unwrap();
        let source = converted.source();
        assert!(!source.contains("<!DOCTYPE"));
        assert!(!source.contains("<body"));
        assert_eq!(converted.widget.style, "{{WRAPPER}} .card { padding: 1rem; }");
        assert!(converted.validation.warnings.is_empty());
    }

    #[test]
    fn test_php_in_markup_never_reaches_render() {
        let markup = r#"<div class="x"><p>Price:<?php echo 1; ?> $5</p><span>ok</span></div>"#;
        let converted = convert(markup, "", "").unwrap();
        let source = converted.source();
        assert!(!source.contains("echo 1;"));
        assert!(source.contains("'default' => 'Price: $5',"));
        assert_eq!(
            converted.widget.preview(),
            r#"<div class="x"><p>Price: $5</p><span>ok</span></div>"#
        );

        let converted = convert("<p>x</p>\n<?php system('id');", "", "").unwrap();
        assert!(!converted.source().contains("<?php system"));
        assert!(converted.widget.preview().ends_with("&lt;?php system('id');"));
    }

    #[test]
    fn test_metadata_comment_and_inference() {
        let markup = "<!-- WIDGET_META\ntitle: Price Card\n-->\n<div class=\"price\">$9</div>";
        let inference = FixedInference(Ok(PartialMetadata {
            name: Some("ignored".into()),
            title: Some("Ignored".into()),
            category: Some("marketing".into()),
            ..Default::default()
        }));
        let config = GeneratorConfig::default();
        let converter = Converter::new(Catalog::builtin(), &config).with_inference(&inference);
        let converted = converter.convert(&WidgetRequest::new(markup)).unwrap();
        let meta = &converted.widget.metadata;
        assert_eq!(meta.title, "Price Card");
        assert_eq!(meta.name, "ignored");
        assert_eq!(meta.category, "marketing");
    }

    #[test]
    fn test_inference_failure_falls_back() {
        let inference = FixedInference(Err(WidgetError::InferenceFailed("timeout".into())));
        let config = GeneratorConfig::default();
        let converter = Converter::new(Catalog::builtin(), &config).with_inference(&inference);
        let converted = converter.convert(&WidgetRequest::new("<p>x</p>")).unwrap();
        assert_eq!(converted.widget.metadata.title, "Custom Widget");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GeneratorConfig {
            text_domain: "bad domain!".into(),
            ..Default::default()
        };
        let result =
            Converter::new(Catalog::builtin(), &config).convert(&WidgetRequest::new("<p>x</p>"));
        assert!(matches!(result, Err(WidgetError::ConfigError(_))));
    }
}
