//! Widget source generation: control registration, the render routine, and
//! the surrounding PHP class.

pub mod controls;
pub mod render;

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use tracing::{debug, info};

use crate::catalog::{Catalog, ControlTemplate};
use crate::config::GeneratorConfig;
use crate::element::{collect_selectors, flatten, ParsedElement};
use crate::error::WidgetResult;
use crate::metadata::WidgetMetadata;
use crate::php::{single_quoted, PhpWriter};
use crate::sanitize::sanitize_markup;
use crate::style::{prepare_widget_css, WRAPPER_PLACEHOLDER};

use controls::{
    control_id, custom_code_section, element_sections, write_sections, ControlSection,
    DefaultValue,
};
use render::{classify, plan_render, ElementKind, RenderPlan};

const MEMBER_INDENT: &str = "    ";
const BODY_INDENT: &str = "        ";
const BLOCK_INDENT: &str = "            ";

/// A parsed element paired with its resolved control template.
#[derive(Debug, Clone)]
pub struct BoundElement<'a> {
    /// Pre-order position within the fragment
    pub index: usize,
    pub element: &'a ParsedElement,
    pub template: ControlTemplate,
    pub kind: ElementKind,
}

impl BoundElement<'_> {
    pub fn control_id(&self, field_id: &str) -> String {
        control_id(&self.element.tag, self.index, field_id)
    }

    /// Control id for `field_id`, if the template registers that field.
    pub fn control(&self, field_id: &str) -> Option<String> {
        self.template
            .has_field(field_id)
            .then(|| self.control_id(field_id))
    }
}

/// Bind every element of the fragment, numbering them in pre-order.
pub fn bind_elements<'a>(
    catalog: &Catalog,
    elements: &'a [ParsedElement],
) -> Vec<BoundElement<'a>> {
    flatten(elements)
        .into_iter()
        .enumerate()
        .map(|(index, element)| {
            let template = catalog.resolve(&element.tag);
            let kind = classify(element, &template);
            BoundElement {
                index,
                element,
                template,
                kind,
            }
        })
        .collect()
}

/// Text of a generated PHP module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSource(String);

impl GeneratedSource {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for GeneratedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GeneratedSource {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedWidget {
    pub metadata: WidgetMetadata,
    pub class_name: String,
    pub keywords: Vec<String>,
    /// Element sections followed by the custom code section
    pub sections: Vec<ControlSection>,
    pub render: RenderPlan,
    /// Style text embedded as the custom CSS default
    pub style: String,
    /// Behavior text embedded as the custom JS default
    pub behavior: String,
    pub source: GeneratedSource,
}

impl GeneratedWidget {
    /// Default value of every control that declares one.
    pub fn defaults(&self) -> BTreeMap<String, DefaultValue> {
        self.sections
            .iter()
            .flat_map(|s| &s.controls)
            .filter_map(|c| c.default.clone().map(|d| (c.id.clone(), d)))
            .collect()
    }

    /// Markup the render routine produces with every control at its default.
    pub fn preview(&self) -> String {
        self.render.preview(&self.defaults())
    }

    pub fn control_ids(&self) -> Vec<&str> {
        self.sections
            .iter()
            .flat_map(|s| &s.controls)
            .map(|c| c.id.as_str())
            .collect()
    }
}

pub struct WidgetGenerator<'a> {
    catalog: &'a Catalog,
    config: &'a GeneratorConfig,
}

impl<'a> WidgetGenerator<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a GeneratorConfig) -> Self {
        Self { catalog, config }
    }

    /// Produce the widget class for `elements`, which must be the parse of
    /// `markup` after sanitization.
    pub fn generate(
        &self,
        metadata: &WidgetMetadata,
        elements: &[ParsedElement],
        markup: &str,
        style: &str,
        behavior: &str,
    ) -> WidgetResult<GeneratedWidget> {
        let sanitized = sanitize_markup(markup);
        let style = join_code(style, &sanitized.inline_styles);
        let behavior = join_code(behavior, &sanitized.inline_scripts);

        let bound = bind_elements(self.catalog, elements);
        let mut sections: Vec<ControlSection> = bound.iter().flat_map(element_sections).collect();

        let used = self.config.prune_unused_css.then(|| collect_selectors(elements));
        let wrapper = self.config.scope_css.then_some(WRAPPER_PLACEHOLDER);
        let css = prepare_widget_css(&style, used.as_ref(), wrapper);
        let js = behavior.trim().to_string();
        sections.push(custom_code_section(&css, &js));

        let render = plan_render(&sanitized.markup, &bound);
        let class_name = metadata.class_name();
        let keywords = metadata.keywords(elements, self.config.max_keywords);

        let mut source = String::new();
        self.write_class(&mut source, metadata, &class_name, &keywords, &sections, &render)?;

        info!(
            widget = %metadata.name,
            elements = bound.len(),
            controls = sections.iter().map(|s| s.controls.len()).sum::<usize>(),
            "generated widget"
        );
        debug!(bytes = source.len(), class = %class_name, "widget source written");

        Ok(GeneratedWidget {
            metadata: metadata.clone(),
            class_name,
            keywords,
            sections,
            render,
            style: css,
            behavior: js,
            source: GeneratedSource(source),
        })
    }

    fn write_class(
        &self,
        out: &mut String,
        metadata: &WidgetMetadata,
        class_name: &str,
        keywords: &[String],
        sections: &[ControlSection],
        render: &RenderPlan,
    ) -> fmt::Result {
        let m = MEMBER_INDENT;
        let b = BODY_INDENT;
        let domain = single_quoted(&self.config.text_domain);

        writeln!(out, "<?php")?;
        writeln!(out, "/**")?;
        writeln!(out, " * {}", doc_text(&metadata.title))?;
        writeln!(out, " *")?;
        writeln!(out, " * {}", doc_text(&metadata.description))?;
        writeln!(out, " *")?;
        writeln!(out, " * @package {}", doc_text(&self.config.package))?;
        writeln!(out, " */")?;
        writeln!(out)?;
        writeln!(out, "if (!defined('ABSPATH')) {{")?;
        writeln!(out, "    exit; // Exit if accessed directly")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        writeln!(out, "class {} extends \\Elementor\\Widget_Base {{", class_name)?;

        let keyword_list = keywords
            .iter()
            .map(|k| single_quoted(k))
            .collect::<Vec<_>>()
            .join(", ");
        let getters = [
            ("get_name", single_quoted(&metadata.name)),
            ("get_title", format!("esc_html__({}, {})", single_quoted(&metadata.title), domain)),
            ("get_icon", single_quoted(&metadata.icon)),
            ("get_categories", format!("[{}]", single_quoted(&metadata.category))),
            ("get_keywords", format!("[{}]", keyword_list)),
        ];
        for (name, value) in getters {
            writeln!(out)?;
            writeln!(out, "{m}public function {}() {{", name)?;
            writeln!(out, "{b}return {};", value)?;
            writeln!(out, "{m}}}")?;
        }

        writeln!(out)?;
        writeln!(out, "{m}protected function register_controls() {{")?;
        write_sections(out, sections, &self.config.text_domain)?;
        writeln!(out, "{m}}}")?;

        writeln!(out)?;
        writeln!(out, "{m}protected function render() {{")?;
        out.push_str(&render_body(render));
        writeln!(out, "{m}}}")?;
        writeln!(out, "}}")
    }
}

fn render_body(plan: &RenderPlan) -> String {
    let b = BODY_INDENT;
    let block = BLOCK_INDENT;
    let mut w = PhpWriter::new(b);
    w.line(&format!("{b}$settings = $this->get_settings_for_display();"));
    plan.write_php(&mut w, b);

    w.blank_line();
    w.line(&format!("{b}if (!empty($settings['custom_css'])) {{"));
    w.line(&format!(
        "{block}$custom_css = str_replace('selector', '{WRAPPER_PLACEHOLDER}', $settings['custom_css']);"
    ));
    w.line(&format!(
        "{block}$custom_css = str_replace('{WRAPPER_PLACEHOLDER}', '.elementor-element-' . $this->get_id(), $custom_css);"
    ));
    w.set_indent(block);
    w.exit_php();
    w.markup(&format!("{block}<style>\n{block}    "));
    w.inline("echo $custom_css;");
    w.markup(&format!("\n{block}</style>\n"));
    w.enter_php();
    w.set_indent(b);
    w.line(&format!("{b}}}"));

    w.blank_line();
    w.line(&format!("{b}if (!empty($settings['custom_js'])) {{"));
    w.set_indent(block);
    w.exit_php();
    w.markup(&format!(
        "{block}<script>\n{block}    (function($) {{\n{block}        $(document).ready(function() {{\n{block}            "
    ));
    w.inline("echo $settings['custom_js'];");
    w.markup(&format!(
        "\n{block}        }});\n{block}    }})(jQuery);\n{block}</script>\n"
    ));
    w.enter_php();
    w.set_indent(b);
    w.line(&format!("{b}}}"));
    w.finish()
}

fn join_code(primary: &str, harvested: &[String]) -> String {
    std::iter::once(primary)
        .chain(harvested.iter().map(String::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Docblock-safe single line.
fn doc_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("*/", "* /")
}

/// Generate with the built-in catalog and default settings.
pub fn generate_widget(
    metadata: &WidgetMetadata,
    elements: &[ParsedElement],
    markup: &str,
    style: &str,
    behavior: &str,
) -> WidgetResult<GeneratedWidget> {
    let config = GeneratorConfig::default();
    WidgetGenerator::new(Catalog::builtin(), &config)
        .generate(metadata, elements, markup, style, behavior)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PartialMetadata;
    use crate::parser::parse_markup;
    use pretty_assertions::assert_eq;

    fn metadata(title: &str) -> WidgetMetadata {
        PartialMetadata {
            title: Some(title.to_string()),
            ..Default::default()
        }
        .resolve(&GeneratorConfig::default())
        .unwrap()
    }

    fn generate(markup: &str, style: &str, behavior: &str) -> GeneratedWidget {
        let sanitized = sanitize_markup(markup);
        let elements = parse_markup(&sanitized.markup);
        generate_widget(&metadata("Hero Banner"), &elements, markup, style, behavior).unwrap()
    }

    #[test]
    fn test_class_skeleton() {
        let widget = generate(r#"<h1 class="title">Welcome</h1>"#, "", "");
        let src = widget.source.as_str();
        assert_eq!(widget.class_name, "HeroBanner_Widget");
        assert!(src.starts_with("<?php\n/**\n * Hero Banner\n"));
        assert!(src.contains(
            "if (!defined('ABSPATH')) {\n    exit; // Exit if accessed directly\n}\n"
        ));
        assert!(src.contains("class HeroBanner_Widget extends \\Elementor\\Widget_Base {"));
        assert!(src.contains(
            "    public function get_name() {\n        return 'hero_banner';\n    }\n"
        ));
        assert!(src.contains("return esc_html__('Hero Banner', 'hustle-tools');"));
        assert!(src.contains("return ['hero', 'banner', 'h1'];"));
        assert!(src.contains("    protected function register_controls() {\n"));
        assert!(src.contains(
            "    protected function render() {\n        $settings = $this->get_settings_for_display();\n"
        ));
        assert!(src.trim_end().ends_with("    }\n}"));
    }

    #[test]
    fn test_bound_elements_use_preorder_indices() {
        let elements = parse_markup("<div><p>a</p></div><p>b</p>");
        let bound = bind_elements(Catalog::builtin(), &elements);
        let ids: Vec<String> = bound.iter().map(|b| b.control_id("text")).collect();
        assert_eq!(ids, vec!["div_0_text", "p_1_text", "p_2_text"]);
        assert_eq!(bound[0].control("heading_text"), None);
    }

    #[test]
    fn test_custom_code_section_last() {
        let widget = generate(
            "<p class=\"lead\">Hi</p><style>.lead { color: red; }</style>",
            "body { margin: 0; }",
            "console.log(1);",
        );
        let last = widget.sections.last().unwrap();
        assert_eq!(last.id, "section_custom_code");
        assert_eq!(widget.style, "{{WRAPPER}} .lead { color: red; }");
        assert_eq!(widget.behavior, "console.log(1);");
        assert!(!widget.source.as_str().contains("<style>.lead"));
    }

    #[test]
    fn test_preview_and_defaults() {
        let widget = generate(r#"<h1 class="title">Welcome</h1>"#, "", "");
        assert_eq!(widget.preview(), r#"<h1 class="title">Welcome</h1>"#);
        let defaults = widget.defaults();
        assert_eq!(
            defaults.get("h1_0_heading_text"),
            Some(&DefaultValue::Text("Welcome".into()))
        );
        assert!(widget.control_ids().contains(&"custom_js"));
    }

    #[test]
    fn test_render_body_blocks() {
        let widget = generate("<p>Hello</p>", "", "");
        let src = widget.source.as_str();
        assert!(src.contains(
            "        // Widget markup\n        ?>\n<p><?php echo esc_html($settings['p_0_text']); ?></p>\n        <?php\n"
        ));
        assert!(src.contains(
            "            ?>\n            <style>\n                <?php echo $custom_css; ?>\n            </style>\n            <?php\n        }\n"
        ));
        assert!(src.contains("(function($) {"));
        assert!(src.contains(
            "$(document).ready(function() {\n                        <?php echo $settings['custom_js']; ?>\n"
        ));
        assert!(!src.contains("$custom_js"));
    }

    #[test]
    fn test_docblock_is_neutralized() {
        let meta = WidgetMetadata {
            description: "Ends */ early".into(),
            ..metadata("Card")
        };
        let widget = generate_widget(&meta, &[], "", "", "").unwrap();
        assert!(widget.source.as_str().contains(" * Ends * / early\n"));
    }
}
