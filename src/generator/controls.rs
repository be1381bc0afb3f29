use std::fmt::{self, Write};

use super::BoundElement;
use crate::catalog::{ControlField, ControlList, ControlType, SELECTOR_PLACEHOLDER};
use crate::element::ParsedElement;
use crate::php::{double_quoted, php_string, single_quoted};
use crate::style::WRAPPER_PLACEHOLDER;

const CONTROL_INDENT: &str = "        ";

/// Default value of a registered control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Text(String),
    /// URL and MEDIA controls: `['url' => ...]`
    Url(String),
    /// Code editor contents, always a double-quoted literal
    Code(String),
}

impl DefaultValue {
    pub fn as_text(&self) -> &str {
        match self {
            DefaultValue::Text(text) | DefaultValue::Url(text) | DefaultValue::Code(text) => text,
        }
    }

    pub fn to_php(&self) -> String {
        match self {
            DefaultValue::Text(text) => php_string(text),
            DefaultValue::Url(url) => format!("['url' => {}]", php_string(url)),
            DefaultValue::Code(code) => double_quoted(code),
        }
    }
}

/// One `add_control` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredControl {
    pub id: String,
    pub label: String,
    pub control_type: ControlType,
    pub default: Option<DefaultValue>,
    pub options: Vec<String>,
    /// `(selector, declaration)` pairs
    pub selectors: Vec<(String, String)>,
    pub dynamic: bool,
    /// Editor language of CODE controls
    pub language: Option<&'static str>,
    pub description: Option<String>,
}

/// One `start_controls_section` ... `end_controls_section` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSection {
    pub id: String,
    pub label: String,
    pub tab: ControlList,
    pub controls: Vec<RegisteredControl>,
}

/// `{tag}_{index}_{field}`; characters outside `[A-Za-z0-9_]` in the tag
/// (custom elements) become underscores.
pub fn control_id(tag: &str, index: usize, field_id: &str) -> String {
    format!("{}_{}_{}", identifier_part(tag), index, field_id)
}

fn identifier_part(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Element-derived default for fields with a known meaning, else the
/// field's declared default.
pub fn default_for(field: &ControlField, element: &ParsedElement) -> Option<DefaultValue> {
    let from_element = match field.id.as_str() {
        "heading_text" | "text" | "link_text" | "button_text" => element.text.clone(),
        "link_url" | "button_link" => element.attribute("href").map(String::from),
        "image" => element.attribute("src").map(String::from),
        "alt_text" => element.attribute("alt").map(String::from),
        "placeholder" => element.attribute("placeholder").map(String::from),
        "html_tag" => match &field.options {
            Some(options) if !options.contains(&element.tag) => None,
            _ => Some(element.tag.clone()),
        },
        _ => None,
    };

    let value = from_element.or_else(|| field.default.clone())?;
    Some(if field.control_type.is_url_like() {
        DefaultValue::Url(value)
    } else {
        DefaultValue::Text(value)
    })
}

/// Selector usable in a style rule: tag, `#id`, `.class`, with CSS
/// metacharacters in ids and classes escaped.
pub fn css_selector(element: &ParsedElement) -> String {
    let mut selector = element.tag.clone();
    if let Some(id) = &element.id {
        selector.push('#');
        selector.push_str(&escape_css_ident(id));
    }
    for class in &element.classes {
        selector.push('.');
        selector.push_str(&escape_css_ident(class));
    }
    selector
}

fn escape_css_ident(ident: &str) -> String {
    let mut escaped = String::with_capacity(ident.len());
    for c in ident.chars() {
        if !(c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn register(
    bound: &BoundElement<'_>,
    field: &ControlField,
    element_selector: &str,
) -> RegisteredControl {
    let selectors = field
        .style_binding()
        .map(|(template, property)| {
            let selector = format!(
                "{} {}",
                WRAPPER_PLACEHOLDER,
                template.replace(SELECTOR_PLACEHOLDER, element_selector)
            );
            vec![(selector, format!("{}: {};", property, field.control_type.css_value()))]
        })
        .unwrap_or_default();

    RegisteredControl {
        id: bound.control_id(&field.id),
        label: field.label.clone(),
        control_type: field.control_type,
        default: default_for(field, bound.element),
        options: field.options.clone().unwrap_or_default(),
        selectors,
        dynamic: field.dynamic,
        language: None,
        description: None,
    }
}

/// Sections for one element: one per non-empty field list.
pub fn element_sections(bound: &BoundElement<'_>) -> Vec<ControlSection> {
    let element_selector = css_selector(bound.element);
    let label = bound.template.display_label();

    ControlList::ALL
        .iter()
        .filter(|list| !bound.template.list(**list).is_empty())
        .map(|list| ControlSection {
            id: format!(
                "section_{}_{}_{}",
                identifier_part(&bound.element.tag),
                bound.index,
                list.as_str()
            ),
            label: match list {
                ControlList::Content => format!("{} ({})", label, bound.element.selector),
                ControlList::Style => format!("{} Style ({})", label, bound.element.selector),
                ControlList::Advanced => format!("{} Advanced ({})", label, bound.element.selector),
            },
            tab: *list,
            controls: bound
                .template
                .list(*list)
                .iter()
                .map(|field| register(bound, field, &element_selector))
                .collect(),
        })
        .collect()
}

fn code_control(
    id: &str,
    label: &str,
    language: &'static str,
    code: &str,
    description: &str,
) -> RegisteredControl {
    RegisteredControl {
        id: id.to_string(),
        label: label.to_string(),
        control_type: ControlType::Code,
        default: (!code.is_empty()).then(|| DefaultValue::Code(code.to_string())),
        options: Vec::new(),
        selectors: Vec::new(),
        dynamic: false,
        language: Some(language),
        description: Some(description.to_string()),
    }
}

/// Trailing section holding the widget's own style and behavior code.
pub fn custom_code_section(css: &str, js: &str) -> ControlSection {
    ControlSection {
        id: "section_custom_code".to_string(),
        label: "Custom Code".to_string(),
        tab: ControlList::Advanced,
        controls: vec![
            code_control(
                "custom_css",
                "Custom CSS",
                "css",
                css,
                "Use \"selector\" or {{WRAPPER}} to target this widget instance.",
            ),
            code_control(
                "custom_js",
                "Custom JavaScript",
                "javascript",
                js,
                "Runs once the widget markup is ready. jQuery is available as $.",
            ),
        ],
    }
}

// ─── PHP output ─────────────────────────────────────────────────────────────

pub fn write_sections(
    out: &mut String,
    sections: &[ControlSection],
    text_domain: &str,
) -> fmt::Result {
    let domain = single_quoted(text_domain);
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_section(out, section, &domain)?;
    }
    Ok(())
}

fn write_section(out: &mut String, section: &ControlSection, domain: &str) -> fmt::Result {
    let i = CONTROL_INDENT;
    writeln!(out, "{i}$this->start_controls_section(")?;
    writeln!(out, "{i}    {},", single_quoted(&section.id))?;
    writeln!(out, "{i}    [")?;
    writeln!(out, "{i}        'label' => esc_html__({}, {}),", php_string(&section.label), domain)?;
    writeln!(
        out,
        "{i}        'tab' => \\Elementor\\Controls_Manager::{},",
        section.tab.tab_constant()
    )?;
    writeln!(out, "{i}    ]")?;
    writeln!(out, "{i});")?;

    for control in &section.controls {
        out.push('\n');
        write_control(out, control, domain)?;
    }

    out.push('\n');
    writeln!(out, "{i}$this->end_controls_section();")
}

fn write_control(out: &mut String, control: &RegisteredControl, domain: &str) -> fmt::Result {
    let i = CONTROL_INDENT;
    writeln!(out, "{i}$this->add_control(")?;
    writeln!(out, "{i}    {},", single_quoted(&control.id))?;
    writeln!(out, "{i}    [")?;
    writeln!(out, "{i}        'label' => esc_html__({}, {}),", php_string(&control.label), domain)?;
    writeln!(
        out,
        "{i}        'type' => \\Elementor\\Controls_Manager::{},",
        control.control_type.as_php()
    )?;
    if let Some(language) = control.language {
        writeln!(out, "{i}        'language' => {},", single_quoted(language))?;
        writeln!(out, "{i}        'rows' => 20,")?;
    }
    if let Some(default) = &control.default {
        writeln!(out, "{i}        'default' => {},", default.to_php())?;
    }
    if !control.options.is_empty() {
        writeln!(out, "{i}        'options' => [")?;
        for option in &control.options {
            let literal = php_string(option);
            writeln!(out, "{i}            {} => {},", literal, literal)?;
        }
        writeln!(out, "{i}        ],")?;
    }
    if control.control_type.has_size_units() {
        writeln!(out, "{i}        'size_units' => ['px', 'em', 'rem', '%'],")?;
    }
    if !control.selectors.is_empty() {
        writeln!(out, "{i}        'selectors' => [")?;
        for (selector, declaration) in &control.selectors {
            writeln!(
                out,
                "{i}            {} => {},",
                php_string(selector),
                php_string(declaration)
            )?;
        }
        writeln!(out, "{i}        ],")?;
    }
    if let Some(description) = &control.description {
        writeln!(
            out,
            "{i}        'description' => esc_html__({}, {}),",
            php_string(description),
            domain
        )?;
    }
    if control.dynamic {
        writeln!(out, "{i}        'dynamic' => ['active' => true],")?;
    }
    writeln!(out, "{i}    ]")?;
    writeln!(out, "{i});")
}
