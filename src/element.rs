use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One node of a parsed markup fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedElement {
    /// Lowercase tag name
    pub tag: String,
    /// Class tokens in source order, without duplicates
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Trimmed direct text of this node (children's text excluded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Every attribute except `class` and `id`
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<ParsedElement>,
    /// Derived `tag#id.class.class` selector
    pub selector: String,
}

impl ParsedElement {
    pub fn new(
        tag: impl Into<String>,
        classes: Vec<String>,
        id: Option<String>,
        text: Option<String>,
        attributes: BTreeMap<String, String>,
        children: Vec<ParsedElement>,
    ) -> Self {
        let tag = tag.into().to_ascii_lowercase();
        let classes = dedup_classes(classes);
        let id = id.filter(|id| !id.trim().is_empty());
        let text = text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let selector = selector_for(&tag, id.as_deref(), &classes);
        Self {
            tag,
            classes,
            id,
            text,
            attributes,
            children,
            selector,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Re-derive the selector from this element's own fields.
    pub fn derive_selector(&self) -> String {
        selector_for(&self.tag, self.id.as_deref(), &self.classes)
    }

    /// Number of elements in this subtree, this one included.
    pub fn element_count(&self) -> usize {
        1 + self.children.iter().map(ParsedElement::element_count).sum::<usize>()
    }

    pub fn has_child_elements(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Build `tag`, then `#id` if present, then `.class` for every class.
pub fn selector_for(tag: &str, id: Option<&str>, classes: &[String]) -> String {
    let mut selector = tag.to_string();
    if let Some(id) = id {
        selector.push('#');
        selector.push_str(id);
    }
    for class in classes {
        selector.push('.');
        selector.push_str(class);
    }
    selector
}

fn dedup_classes(classes: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    classes
        .into_iter()
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}

/// Total element count of a forest.
pub fn count_elements(elements: &[ParsedElement]) -> usize {
    elements.iter().map(ParsedElement::element_count).sum()
}

/// Pre-order walk of a forest. The position in the returned list is the
/// element index used in control identifiers.
pub fn flatten(elements: &[ParsedElement]) -> Vec<&ParsedElement> {
    let mut out = Vec::new();
    for element in elements {
        push_preorder(element, &mut out);
    }
    out
}

fn push_preorder<'a>(element: &'a ParsedElement, out: &mut Vec<&'a ParsedElement>) {
    out.push(element);
    for child in &element.children {
        push_preorder(child, out);
    }
}

/// Tags, classes and ids referenced anywhere in a forest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectorSet {
    pub tags: BTreeSet<String>,
    pub classes: BTreeSet<String>,
    pub ids: BTreeSet<String>,
}

impl SelectorSet {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.classes.is_empty() && self.ids.is_empty()
    }
}

pub fn collect_selectors(elements: &[ParsedElement]) -> SelectorSet {
    let mut set = SelectorSet::default();
    for element in flatten(elements) {
        set.tags.insert(element.tag.clone());
        set.classes.extend(element.classes.iter().cloned());
        if let Some(id) = &element.id {
            set.ids.insert(id.clone());
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn el(
        tag: &str,
        classes: &[&str],
        id: Option<&str>,
        children: Vec<ParsedElement>,
    ) -> ParsedElement {
        ParsedElement::new(
            tag,
            classes.iter().map(|c| c.to_string()).collect(),
            id.map(String::from),
            None,
            BTreeMap::new(),
            children,
        )
    }

    #[test]
    fn test_selector_derivation() {
        assert_eq!(el("DIV", &[], None, vec![]).selector, "div");
        assert_eq!(
            el("section", &["hero", "dark"], Some("top"), vec![]).selector,
            "section#top.hero.dark"
        );
    }

    #[test]
    fn test_classes_deduplicated_in_order() {
        let element = el("p", &["b", "a", "b", "c", "a"], None, vec![]);
        assert_eq!(element.classes, vec!["b", "a", "c"]);
        assert_eq!(element.derive_selector(), element.selector);
    }

    #[test]
    fn test_flatten_is_preorder() {
        let tree = vec![
            el("div", &[], None, vec![el("h1", &[], None, vec![]), el("p", &[], None, vec![])]),
            el("footer", &[], None, vec![el("a", &[], None, vec![])]),
        ];
        let tags: Vec<&str> = flatten(&tree).iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["div", "h1", "p", "footer", "a"]);
        assert_eq!(count_elements(&tree), 5);
    }

    #[test]
    fn test_collect_selectors() {
        let tree = vec![el(
            "div",
            &["card"],
            Some("main"),
            vec![el("span", &["price"], None, vec![])],
        )];
        let set = collect_selectors(&tree);
        assert!(set.tags.contains("span"));
        assert!(set.classes.contains("card"));
        assert!(set.classes.contains("price"));
        assert!(set.ids.contains("main"));
    }

    #[test]
    fn test_empty_text_is_dropped() {
        let element =
            ParsedElement::new("p", vec![], None, Some("   ".into()), BTreeMap::new(), vec![]);
        assert_eq!(element.text, None);
    }
}
