//! # quickwidget
//!
//! Converts an HTML fragment, its stylesheet and its script into an
//! Elementor widget class, then checks the generated PHP before it is
//! ever loaded by WordPress.
//!
//! ## Features
//! - Tolerant markup parsing into an element tree with derived selectors
//! - Data-driven control catalog with single inheritance (`extends`)
//! - Per-element control registration and a render routine that substitutes
//!   control values into the original markup
//! - Style pruning, global selector stripping and `{{WRAPPER}}` scoping
//! - Line-based validation of the generated module
//!
//! ## Example
//! ```ignore
//! use quickwidget::convert;
//!
//! let converted = convert(r#"<h1 class="title">Welcome</h1>"#, "", "")
//!     .expect("widget failed validation");
//! println!("{}", converted.source());
//! ```
//!
//! ## Example: custom catalog and settings
//! ```ignore
//! use quickwidget::{Catalog, Converter, GeneratorConfig, WidgetRequest};
//!
//! let catalog = Catalog::from_file("controls.yaml")?;
//! let config = GeneratorConfig::from_file("quickwidget.yaml")?;
//! let request = WidgetRequest::new(markup).with_style(css).with_behavior(js);
//! let converted = Converter::new(&catalog, &config).convert(&request)?;
//! ```

pub mod catalog;
pub mod config;
pub mod diagnostic;
pub mod element;
pub mod error;
pub mod generator;
pub mod metadata;
pub mod parser;
pub mod php;
pub mod pipeline;
pub mod sanitize;
pub mod style;
pub mod validator;

// --- Core types ---
pub use catalog::{Catalog, ControlField, ControlList, ControlTemplate, ControlType};
pub use config::GeneratorConfig;
pub use diagnostic::{IssueKind, ValidationIssue, ValidationResult};
pub use element::ParsedElement;
pub use error::{WidgetError, WidgetResult};
pub use metadata::{MetadataInference, PartialMetadata, WidgetMetadata};

// --- Generation ---
pub use generator::{GeneratedSource, GeneratedWidget, WidgetGenerator};
pub use pipeline::{convert, ConvertedWidget, Converter, WidgetRequest};

/// Parse a markup fragment into its top-level elements.
///
/// Never fails: unparseable input yields an empty list.
pub fn parse(markup: &str) -> Vec<ParsedElement> {
    parser::parse_markup(markup)
}

/// Resolve the control template for a tag against the built-in catalog.
pub fn resolve(tag: &str) -> ControlTemplate {
    Catalog::builtin().resolve(tag)
}

/// Generate a widget module with the built-in catalog and default settings.
pub fn generate(
    metadata: &WidgetMetadata,
    elements: &[ParsedElement],
    markup: &str,
    style: &str,
    behavior: &str,
) -> WidgetResult<GeneratedWidget> {
    generator::generate_widget(metadata, elements, markup, style, behavior)
}

/// Validate a generated widget module.
pub fn validate(source: &str) -> ValidationResult {
    validator::validate_widget(source)
}
