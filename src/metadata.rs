use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::config::GeneratorConfig;
use crate::element::ParsedElement;
use crate::error::{WidgetError, WidgetResult};

pub const DEFAULT_NAME: &str = "custom_widget";
pub const DEFAULT_TITLE: &str = "Custom Widget";

/// Identity of a generated widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetMetadata {
    /// Lowercase-with-underscores identifier returned by `get_name()`
    pub name: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub icon: String,
}

impl WidgetMetadata {
    /// PHP class name: PascalCase name plus `_Widget`.
    pub fn class_name(&self) -> String {
        let mut class = String::new();
        for segment in self.name.split('_').filter(|s| !s.is_empty()) {
            let mut chars = segment.chars();
            if let Some(first) = chars.next() {
                class.push(first.to_ascii_uppercase());
                class.push_str(chars.as_str());
            }
        }
        if class.is_empty() {
            class.push_str("Custom");
        }
        class.push_str("_Widget");
        class
    }

    /// Search keywords: title words longer than three characters, then the
    /// root element tags.
    pub fn keywords(&self, elements: &[ParsedElement], max: usize) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let title_words = self
            .title
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 3)
            .map(str::to_lowercase);
        let tags = elements.iter().map(|e| e.tag.clone());

        title_words
            .chain(tags)
            .filter(|k| seen.insert(k.clone()))
            .take(max)
            .collect()
    }
}

/// Metadata with every field optional, as supplied by one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl PartialMetadata {
    /// Fill fields missing here from `fallback`.
    pub fn or(self, fallback: PartialMetadata) -> PartialMetadata {
        PartialMetadata {
            name: non_blank(self.name).or(non_blank(fallback.name)),
            title: non_blank(self.title).or(non_blank(fallback.title)),
            description: non_blank(self.description).or(non_blank(fallback.description)),
            category: non_blank(self.category).or(non_blank(fallback.category)),
            icon: non_blank(self.icon).or(non_blank(fallback.icon)),
        }
    }

    /// Both identity fields are known.
    pub fn has_identity(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
            && self.title.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    /// Complete the record with defaults.
    pub fn resolve(self, config: &GeneratorConfig) -> WidgetResult<WidgetMetadata> {
        let name = match non_blank(self.name) {
            Some(raw) => {
                normalize_name(&raw).ok_or(WidgetError::InvalidWidgetName { name: raw })?
            }
            None => non_blank(self.title.clone())
                .and_then(|t| normalize_name(&t))
                .unwrap_or_else(|| DEFAULT_NAME.to_string()),
        };
        let title = non_blank(self.title).unwrap_or_else(|| {
            if name == DEFAULT_NAME {
                DEFAULT_TITLE.to_string()
            } else {
                title_from_name(&name)
            }
        });
        let description =
            non_blank(self.description).unwrap_or_else(|| format!("{} widget", title));

        Ok(WidgetMetadata {
            name,
            title: collapse_whitespace(&title),
            description: collapse_whitespace(&description),
            category: non_blank(self.category).unwrap_or_else(|| config.default_category.clone()),
            icon: non_blank(self.icon).unwrap_or_else(|| config.default_icon.clone()),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase-with-underscores form of `raw`. `None` if nothing usable is left.
pub fn normalize_name(raw: &str) -> Option<String> {
    let mut name = String::new();
    let mut separator = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if separator && !name.is_empty() {
                name.push('_');
            }
            separator = false;
            name.push(c.to_ascii_lowercase());
        } else {
            separator = true;
        }
    }
    if name.is_empty() {
        return None;
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "widget_");
    }
    Some(name)
}

fn title_from_name(name: &str) -> String {
    name.split('_')
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── Metadata comment ───────────────────────────────────────────────────────

fn meta_comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--\s*WIDGET_META\b(.*?)-->").unwrap())
}

/// Read a `<!-- WIDGET_META ... -->` block of `key: value` lines.
///
/// Must run on the raw markup: sanitizing strips comments.
pub fn extract_metadata_comment(markup: &str) -> Option<PartialMetadata> {
    let caps = meta_comment_regex().captures(markup)?;
    let mut meta = PartialMetadata::default();
    for line in caps[1].lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let slot = match key.trim().to_ascii_lowercase().as_str() {
            "name" => &mut meta.name,
            "title" => &mut meta.title,
            "description" => &mut meta.description,
            "category" => &mut meta.category,
            "icon" => &mut meta.icon,
            other => {
                debug!(key = other, "ignoring unknown WIDGET_META key");
                continue;
            }
        };
        *slot = Some(value.to_string());
    }
    Some(meta)
}

// ─── External inference ─────────────────────────────────────────────────────

/// A service that proposes metadata from the widget's source text.
pub trait MetadataInference {
    fn infer(&self, markup: &str, style: &str, behavior: &str) -> WidgetResult<PartialMetadata>;
}

/// Sources of metadata in priority order.
pub struct MetadataSources<'a> {
    pub explicit: Option<&'a PartialMetadata>,
    pub markup: &'a str,
    pub style: &'a str,
    pub behavior: &'a str,
    pub inference: Option<&'a dyn MetadataInference>,
}

/// Merge explicit metadata, the markup's metadata comment, optional
/// inference and defaults. Inference is consulted only while the name or
/// title is still unknown; its failure falls back to defaults.
pub fn resolve_metadata(
    sources: MetadataSources<'_>,
    config: &GeneratorConfig,
) -> WidgetResult<WidgetMetadata> {
    let explicit = sources.explicit.cloned().unwrap_or_default();
    let comment = extract_metadata_comment(sources.markup).unwrap_or_default();
    let mut merged = explicit.or(comment);

    if !merged.has_identity() {
        if let Some(service) = sources.inference {
            match service.infer(sources.markup, sources.style, sources.behavior) {
                Ok(inferred) => merged = merged.or(inferred),
                Err(err) => warn!(error = %err, "metadata inference failed, using defaults"),
            }
        }
    }

    let metadata = merged.resolve(config)?;
    debug!(name = %metadata.name, title = %metadata.title, "resolved widget metadata");
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sources<'a>(explicit: Option<&'a PartialMetadata>, markup: &'a str) -> MetadataSources<'a> {
        MetadataSources {
            explicit,
            markup,
            style: "",
            behavior: "",
            inference: None,
        }
    }

    #[test]
    fn test_defaults() {
        let meta =
            resolve_metadata(sources(None, "<p>x</p>"), &GeneratorConfig::default()).unwrap();
        assert_eq!(
            meta,
            WidgetMetadata {
                name: "custom_widget".into(),
                title: "Custom Widget".into(),
                description: "Custom Widget widget".into(),
                category: "general".into(),
                icon: "eicon-code".into(),
            }
        );
        assert_eq!(meta.class_name(), "CustomWidget_Widget");
    }

    #[test]
    fn test_comment_extraction() {
        let markup = "<!-- WIDGET_META\nname: hero_banner\ntitle: Hero Banner\nicon: eicon-banner\nflavor: mint\n-->\n<section>x</section>";
        let meta = extract_metadata_comment(markup).unwrap();
        assert_eq!(meta.name.as_deref(), Some("hero_banner"));
        assert_eq!(meta.title.as_deref(), Some("Hero Banner"));
        assert_eq!(meta.icon.as_deref(), Some("eicon-banner"));
        assert_eq!(meta.category, None);
        assert!(extract_metadata_comment("<!-- plain comment -->").is_none());
    }

    #[test]
    fn test_explicit_wins_over_comment() {
        let markup = "<!-- WIDGET_META\nname: from_comment\ncategory: marketing\n-->";
        let explicit = PartialMetadata {
            name: Some("Pricing Table".into()),
            ..PartialMetadata::default()
        };
        let meta =
            resolve_metadata(sources(Some(&explicit), markup), &GeneratorConfig::default())
                .unwrap();
        assert_eq!(meta.name, "pricing_table");
        assert_eq!(meta.title, "Pricing Table");
        assert_eq!(meta.category, "marketing");
        assert_eq!(meta.class_name(), "PricingTable_Widget");
    }

    #[test]
    fn test_name_derived_from_title() {
        let explicit = PartialMetadata {
            title: Some("Team  Members!".into()),
            ..PartialMetadata::default()
        };
        let meta = explicit.resolve(&GeneratorConfig::default()).unwrap();
        assert_eq!(meta.name, "team_members");
        assert_eq!(meta.title, "Team Members!");
        assert_eq!(meta.description, "Team Members! widget");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Hero Banner!").as_deref(), Some("hero_banner"));
        assert_eq!(normalize_name("--cta--box--").as_deref(), Some("cta_box"));
        assert_eq!(normalize_name("3col grid").as_deref(), Some("widget_3col_grid"));
        assert_eq!(normalize_name("!!!"), None);
    }

    #[test]
    fn test_unusable_name_rejected() {
        let explicit = PartialMetadata {
            name: Some("???".into()),
            ..PartialMetadata::default()
        };
        assert!(matches!(
            explicit.resolve(&GeneratorConfig::default()),
            Err(WidgetError::InvalidWidgetName { .. })
        ));
    }

    #[test]
    fn test_keywords() {
        let meta = PartialMetadata {
            title: Some("Modern Pricing Card for SaaS".into()),
            ..PartialMetadata::default()
        }
        .resolve(&GeneratorConfig::default())
        .unwrap();
        let elements = crate::parser::parse_markup("<div>a</div><section>b</section><div>c</div>");
        assert_eq!(
            meta.keywords(&elements, 10),
            vec!["modern", "pricing", "card", "saas", "div", "section"]
        );
        assert_eq!(meta.keywords(&elements, 2), vec!["modern", "pricing"]);
    }

    struct FixedInference(WidgetResult<PartialMetadata>);

    impl MetadataInference for FixedInference {
        fn infer(&self, _: &str, _: &str, _: &str) -> WidgetResult<PartialMetadata> {
            self.0.clone()
        }
    }

    #[test]
    fn test_inference_fills_missing_identity() {
        let service = FixedInference(Ok(PartialMetadata {
            name: Some("faq_accordion".into()),
            title: Some("FAQ Accordion".into()),
            category: Some("ignored-if-explicit".into()),
            ..PartialMetadata::default()
        }));
        let explicit = PartialMetadata {
            category: Some("support".into()),
            ..PartialMetadata::default()
        };
        let meta = resolve_metadata(
            MetadataSources {
                explicit: Some(&explicit),
                markup: "<div>q</div>",
                style: "",
                behavior: "",
                inference: Some(&service),
            },
            &GeneratorConfig::default(),
        )
        .unwrap();
        assert_eq!(meta.name, "faq_accordion");
        assert_eq!(meta.title, "FAQ Accordion");
        assert_eq!(meta.category, "support");
    }

    #[test]
    fn test_inference_failure_falls_back() {
        let service = FixedInference(Err(WidgetError::InferenceFailed("timeout".into())));
        let meta = resolve_metadata(
            MetadataSources {
                explicit: None,
                markup: "<div>q</div>",
                style: "",
                behavior: "",
                inference: Some(&service),
            },
            &GeneratorConfig::default(),
        )
        .unwrap();
        assert_eq!(meta.name, "custom_widget");
    }
}
