use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{WidgetError, WidgetResult};

const BUILTIN_CATALOG: &str = include_str!("../assets/controls.yaml");

/// Stands for the element's own selector inside a field's selector template.
pub const SELECTOR_PLACEHOLDER: &str = "{{SELECTOR}}";

/// Elementor control type (`\Elementor\Controls_Manager::<TYPE>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlType {
    Text,
    Textarea,
    Wysiwyg,
    Url,
    Media,
    Select,
    Color,
    Slider,
    Dimensions,
    Number,
    Switcher,
    Code,
}

impl ControlType {
    pub fn as_php(&self) -> &'static str {
        match self {
            ControlType::Text => "TEXT",
            ControlType::Textarea => "TEXTAREA",
            ControlType::Wysiwyg => "WYSIWYG",
            ControlType::Url => "URL",
            ControlType::Media => "MEDIA",
            ControlType::Select => "SELECT",
            ControlType::Color => "COLOR",
            ControlType::Slider => "SLIDER",
            ControlType::Dimensions => "DIMENSIONS",
            ControlType::Number => "NUMBER",
            ControlType::Switcher => "SWITCHER",
            ControlType::Code => "CODE",
        }
    }

    /// Value template Elementor substitutes into a style declaration.
    pub fn css_value(&self) -> &'static str {
        match self {
            ControlType::Slider => "{{SIZE}}{{UNIT}}",
            ControlType::Dimensions => {
                "{{TOP}}{{UNIT}} {{RIGHT}}{{UNIT}} {{BOTTOM}}{{UNIT}} {{LEFT}}{{UNIT}}"
            }
            _ => "{{VALUE}}",
        }
    }

    pub fn has_size_units(&self) -> bool {
        matches!(self, ControlType::Slider | ControlType::Dimensions)
    }

    /// URL and MEDIA values are arrays with a `url` key.
    pub fn is_url_like(&self) -> bool {
        matches!(self, ControlType::Url | ControlType::Media)
    }
}

/// One editable field of a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlField {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub control_type: ControlType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dynamic: bool,
}

impl ControlField {
    /// Selector template and CSS property of a visual control.
    pub fn style_binding(&self) -> Option<(&str, &str)> {
        let property = self.property.as_deref()?;
        let selector = self.selector.as_deref().unwrap_or(SELECTOR_PLACEHOLDER);
        Some((selector, property))
    }
}

/// Which tab a field list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlList {
    Content,
    Style,
    Advanced,
}

impl ControlList {
    pub const ALL: [ControlList; 3] = [
        ControlList::Content,
        ControlList::Style,
        ControlList::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlList::Content => "content",
            ControlList::Style => "style",
            ControlList::Advanced => "advanced",
        }
    }

    pub fn tab_constant(&self) -> &'static str {
        match self {
            ControlList::Content => "TAB_CONTENT",
            ControlList::Style => "TAB_STYLE",
            ControlList::Advanced => "TAB_ADVANCED",
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlTemplate {
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ControlField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub style: Vec<ControlField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advanced: Vec<ControlField>,
}

impl ControlTemplate {
    pub fn list(&self, which: ControlList) -> &[ControlField] {
        match which {
            ControlList::Content => &self.content,
            ControlList::Style => &self.style,
            ControlList::Advanced => &self.advanced,
        }
    }

    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.tag.to_ascii_uppercase())
    }

    /// Look a field up across all three lists.
    pub fn field(&self, id: &str) -> Option<&ControlField> {
        ControlList::ALL
            .iter()
            .flat_map(|list| self.list(*list))
            .find(|field| field.id == id)
    }

    pub fn has_field(&self, id: &str) -> bool {
        self.field(id).is_some()
    }

    pub fn field_ids(&self) -> Vec<&str> {
        ControlList::ALL
            .iter()
            .flat_map(|list| self.list(*list))
            .map(|field| field.id.as_str())
            .collect()
    }
}

/// Overlay `child` on top of an already resolved `base`.
///
/// Per list: a child field whose id matches a base field replaces it in
/// place, remaining child fields follow the base fields.
pub fn merge_templates(base: &ControlTemplate, child: &ControlTemplate) -> ControlTemplate {
    ControlTemplate {
        tag: child.tag.clone(),
        extends: child.extends.clone(),
        label: child.label.clone().or_else(|| base.label.clone()),
        content: merge_fields(&base.content, &child.content),
        style: merge_fields(&base.style, &child.style),
        advanced: merge_fields(&base.advanced, &child.advanced),
    }
}

fn merge_fields(base: &[ControlField], overlay: &[ControlField]) -> Vec<ControlField> {
    let mut merged: Vec<ControlField> = base
        .iter()
        .map(|field| {
            overlay
                .iter()
                .find(|o| o.id == field.id)
                .unwrap_or(field)
                .clone()
        })
        .collect();
    merged.extend(
        overlay
            .iter()
            .filter(|o| !base.iter().any(|b| b.id == o.id))
            .cloned(),
    );
    merged
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    fallback: String,
    templates: BTreeMap<String, ControlTemplate>,
}

/// Immutable per-tag table of default controls.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    fallback: String,
    templates: BTreeMap<String, ControlTemplate>,
}

impl Catalog {
    /// The catalog shipped with the crate, parsed once per process.
    pub fn builtin() -> &'static Catalog {
        static BUILTIN: OnceLock<Catalog> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            Catalog::from_yaml(BUILTIN_CATALOG).expect("built-in control catalog is valid")
        })
    }

    pub fn from_yaml(yaml: &str) -> WidgetResult<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let templates = file
            .templates
            .into_iter()
            .map(|(tag, mut template)| {
                let tag = tag.to_ascii_lowercase();
                template.tag = tag.clone();
                template.extends = template.extends.map(|base| base.to_ascii_lowercase());
                (tag, template)
            })
            .collect();
        let catalog = Catalog {
            fallback: file.fallback.to_ascii_lowercase(),
            templates,
        };
        catalog.check()?;
        debug!(
            templates = catalog.templates.len(),
            fallback = %catalog.fallback,
            "loaded control catalog"
        );
        Ok(catalog)
    }

    pub fn from_file(path: impl AsRef<Path>) -> WidgetResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn get(&self, tag: &str) -> Option<&ControlTemplate> {
        self.templates.get(&tag.to_ascii_lowercase())
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Resolve the effective template for `tag`, following `extends`.
    /// Unknown tags resolve to the fallback entry.
    pub fn resolve(&self, tag: &str) -> ControlTemplate {
        let key = tag.to_ascii_lowercase();
        let key = if self.templates.contains_key(&key) {
            key
        } else {
            self.fallback.clone()
        };
        self.resolve_entry(&key, &mut Vec::new())
    }

    fn resolve_entry(&self, key: &str, visiting: &mut Vec<String>) -> ControlTemplate {
        let Some(entry) = self.templates.get(key) else {
            return ControlTemplate {
                tag: key.to_string(),
                ..ControlTemplate::default()
            };
        };
        visiting.push(key.to_string());
        match entry.extends.as_deref() {
            Some(base) if !visiting.iter().any(|v| v == base) => {
                let resolved_base = self.resolve_entry(base, visiting);
                merge_templates(&resolved_base, entry)
            }
            _ => entry.clone(),
        }
    }

    fn check(&self) -> WidgetResult<()> {
        if !self.templates.contains_key(&self.fallback) {
            return Err(WidgetError::MissingFallback {
                tag: self.fallback.clone(),
            });
        }

        for (tag, template) in &self.templates {
            for list in ControlList::ALL {
                let mut seen = BTreeSet::new();
                for field in template.list(list) {
                    if !is_control_key(&field.id) {
                        return Err(WidgetError::CatalogError(format!(
                            "field id '{}' in template '{}' must use only letters, digits and '_'",
                            field.id, tag
                        )));
                    }
                    if !seen.insert(field.id.as_str()) {
                        return Err(WidgetError::DuplicateControlId {
                            tag: tag.clone(),
                            list: list.as_str().to_string(),
                            id: field.id.clone(),
                        });
                    }
                }
            }

            if let Some(base) = &template.extends {
                if !self.templates.contains_key(base) {
                    return Err(WidgetError::UnknownBaseTemplate {
                        tag: tag.clone(),
                        base: base.clone(),
                    });
                }
            }

            let mut chain = vec![tag.as_str()];
            let mut next = template.extends.as_deref();
            while let Some(base) = next {
                let cycle = chain.contains(&base);
                chain.push(base);
                if cycle {
                    return Err(WidgetError::CircularInheritance {
                        chain: chain.join(" -> "),
                    });
                }
                next = self.templates.get(base).and_then(|t| t.extends.as_deref());
            }
        }
        Ok(())
    }
}

/// Field ids end up inside control ids, which allow `[A-Za-z0-9_]` only.
fn is_control_key(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.fallback(), "div");
        for tag in ["div", "h1", "h6", "p", "span", "a", "button", "img", "input", "textarea"] {
            assert!(catalog.get(tag).is_some(), "missing catalog entry for {}", tag);
        }
    }

    #[test]
    fn test_heading_levels_inherit_heading_fields() {
        let h3 = Catalog::builtin().resolve("h3");
        assert_eq!(h3.tag, "h3");
        assert_eq!(h3.display_label(), "Heading");
        let content: Vec<&str> = h3.content.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(content, vec!["heading_text", "link", "html_tag"]);
        assert!(h3.has_field("text_color"));
    }

    #[test]
    fn test_child_field_overrides_in_place() {
        let span = Catalog::builtin().resolve("span");
        assert_eq!(span.content.len(), 1);
        assert_eq!(span.content[0].id, "text");
        assert_eq!(span.content[0].control_type, ControlType::Text);
        let style: Vec<&str> = span.style.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(style, vec!["text_color", "font_size", "line_height", "margin"]);
    }

    #[test]
    fn test_two_level_inheritance() {
        let label = Catalog::builtin().resolve("label");
        assert_eq!(label.display_label(), "Label");
        assert!(label.has_field("text"));
        assert!(label.has_field("line_height"));
    }

    #[test]
    fn test_unknown_tag_falls_back_to_div() {
        let custom = Catalog::builtin().resolve("my-widget");
        assert_eq!(custom.tag, "div");
        assert!(custom.has_field("text"));
        assert!(custom.has_field("background_color"));
        assert!(custom.has_field("z_index"));
    }

    #[test]
    fn test_base_fields_come_first() {
        let div = Catalog::builtin().resolve("div");
        let style: Vec<&str> = div.style.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(
            style,
            vec!["background_color", "padding", "margin", "border_radius", "text_color"]
        );
    }

    #[test]
    fn test_extends_keeps_every_base_field() {
        let catalog = Catalog::builtin();
        for tag in catalog.tags() {
            let entry = catalog.get(tag).unwrap();
            let Some(base) = &entry.extends else { continue };
            let resolved = catalog.resolve(tag);
            let base_resolved = catalog.resolve(base);
            for id in base_resolved.field_ids() {
                assert!(resolved.has_field(id), "{} lost base field {}", tag, id);
            }
        }
    }

    #[test]
    fn test_style_binding_defaults_to_element_selector() {
        let a = Catalog::builtin().resolve("a");
        let color = a.field("text_color").unwrap();
        assert_eq!(color.style_binding(), Some(("{{SELECTOR}}", "color")));
        let hover = a.field("hover_color").unwrap();
        assert_eq!(hover.style_binding(), Some(("{{SELECTOR}}:hover", "color")));
        assert_eq!(a.field("link_text").unwrap().style_binding(), None);
    }

    #[test]
    fn test_unknown_base_rejected() {
        let yaml = "fallback: div\ntemplates:\n  div: {}\n  p:\n    extends: missing\n";
        let err = Catalog::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, WidgetError::UnknownBaseTemplate { .. }));
    }

    #[test]
    fn test_cycle_rejected() {
        let yaml =
            "fallback: div\ntemplates:\n  div: {}\n  a:\n    extends: b\n  b:\n    extends: a\n";
        let err = Catalog::from_yaml(yaml).unwrap_err();
        match err {
            WidgetError::CircularInheritance { chain } => assert_eq!(chain, "a -> b -> a"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_fallback_rejected() {
        let yaml = "fallback: div\ntemplates:\n  p: {}\n";
        assert!(matches!(
            Catalog::from_yaml(yaml).unwrap_err(),
            WidgetError::MissingFallback { .. }
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let yaml = r#"
fallback: div
templates:
  div:
    content:
      - { id: text, label: Text, type: TEXT }
      - { id: text, label: Again, type: TEXT }
"#;
        assert!(matches!(
            Catalog::from_yaml(yaml).unwrap_err(),
            WidgetError::DuplicateControlId { .. }
        ));
    }

    #[test]
    fn test_field_id_with_invalid_characters_rejected() {
        let yaml = r#"
fallback: div
templates:
  div:
    style:
      - { id: text-color, label: Color, type: COLOR }
"#;
        match Catalog::from_yaml(yaml).unwrap_err() {
            WidgetError::CatalogError(message) => {
                assert!(message.contains("'text-color'"), "{}", message)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_merge_templates_directly() {
        let field = |id: &str, label: &str| ControlField {
            id: id.into(),
            label: label.into(),
            control_type: ControlType::Text,
            default: None,
            options: None,
            selector: None,
            property: None,
            dynamic: false,
        };
        let base = ControlTemplate {
            tag: "base".into(),
            label: Some("Base".into()),
            content: vec![field("a", "A"), field("b", "B")],
            ..ControlTemplate::default()
        };
        let child = ControlTemplate {
            tag: "child".into(),
            extends: Some("base".into()),
            content: vec![field("c", "C"), field("a", "A2")],
            ..ControlTemplate::default()
        };
        let merged = merge_templates(&base, &child);
        let labels: Vec<&str> = merged.content.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["A2", "B", "C"]);
        assert_eq!(merged.label.as_deref(), Some("Base"));
        assert_eq!(merged.tag, "child");
    }
}
