use scraper::{ElementRef, Html, Node, Selector};
use std::collections::BTreeMap;
use tracing::debug;

use crate::element::{count_elements, ParsedElement};

// ─── Public parse functions ─────────────────────────────────────────────────

/// Parse a markup fragment as if it were placed inside a document body and
/// return the body's direct element children as roots.
///
/// Malformed markup is recovered best-effort by the HTML5 tree builder.
/// Empty or unusable input yields an empty list.
pub fn parse_markup(markup: &str) -> Vec<ParsedElement> {
    if markup.trim().is_empty() {
        return Vec::new();
    }

    let document = Html::parse_document(markup);
    let Ok(body_selector) = Selector::parse("body") else {
        return Vec::new();
    };
    let Some(body) = document.select(&body_selector).next() else {
        return Vec::new();
    };

    let roots: Vec<ParsedElement> = child_elements(body).map(build_element).collect();
    debug!(
        roots = roots.len(),
        elements = count_elements(&roots),
        "parsed markup fragment"
    );
    roots
}

// ─── Tree building ──────────────────────────────────────────────────────────

fn child_elements(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    element.children().filter_map(ElementRef::wrap)
}

fn build_element(element: ElementRef<'_>) -> ParsedElement {
    let value = element.value();

    let classes = value
        .attr("class")
        .map(|c| c.split_whitespace().map(String::from).collect())
        .unwrap_or_default();
    let id = value.attr("id").map(|id| id.trim().to_string());

    let attributes: BTreeMap<String, String> = value
        .attrs()
        .filter(|(name, _)| *name != "class" && *name != "id")
        .map(|(name, val)| (name.to_string(), val.to_string()))
        .collect();

    let children = child_elements(element).map(build_element).collect();

    ParsedElement::new(
        value.name(),
        classes,
        id,
        direct_text(element),
        attributes,
        children,
    )
}

/// Concatenated text of the element's own text nodes, trimmed.
fn direct_text(element: ElementRef<'_>) -> Option<String> {
    let mut text = String::new();
    for child in element.children() {
        if let Node::Text(t) = child.value() {
            text.push_str(t);
        }
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_heading() {
        let elements = parse_markup(r#"<h1 class="title">Welcome</h1>"#);
        assert_eq!(elements.len(), 1);
        let h1 = &elements[0];
        assert_eq!(h1.tag, "h1");
        assert_eq!(h1.classes, vec!["title"]);
        assert_eq!(h1.text.as_deref(), Some("Welcome"));
        assert_eq!(h1.selector, "h1.title");
        assert!(h1.attributes.is_empty());
    }

    #[test]
    fn test_sibling_roots_keep_order() {
        let elements = parse_markup("<h2>A</h2><p>B</p><span>C</span>");
        let tags: Vec<&str> = elements.iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["h2", "p", "span"]);
    }

    #[test]
    fn test_direct_text_only() {
        let elements = parse_markup("<div> Outer <span>Inner</span> tail </div>");
        let div = &elements[0];
        assert_eq!(div.text.as_deref(), Some("Outer  tail"));
        assert_eq!(div.children[0].text.as_deref(), Some("Inner"));
    }

    #[test]
    fn test_attributes_exclude_class_and_id() {
        let elements = parse_markup(
            r#"<a id="cta" class="btn btn btn-primary" href="/buy" target="_blank">Buy</a>"#,
        );
        let a = &elements[0];
        assert_eq!(a.id.as_deref(), Some("cta"));
        assert_eq!(a.classes, vec!["btn", "btn-primary"]);
        assert_eq!(a.attribute("href"), Some("/buy"));
        assert_eq!(a.attribute("target"), Some("_blank"));
        assert_eq!(a.attribute("class"), None);
        assert_eq!(a.selector, "a#cta.btn.btn-primary");
    }

    #[test]
    fn test_uppercase_tags_lowercased() {
        let elements = parse_markup("<DIV CLASS=\"Box\"><P>x</P></DIV>");
        assert_eq!(elements[0].tag, "div");
        assert_eq!(elements[0].children[0].tag, "p");
        assert_eq!(elements[0].classes, vec!["Box"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_markup("").is_empty());
        assert!(parse_markup("   \n ").is_empty());
        assert!(parse_markup("just some text").is_empty());
    }

    #[test]
    fn test_malformed_markup_recovers() {
        let elements = parse_markup("<div><p>unclosed<span>deep</div>");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].tag, "div");
        assert_eq!(count_elements(&elements), 3);
    }
}
