//! Stylesheet handling for embedded widget CSS.
//!
//! A small block parser (not a full CSS grammar): top-level rules, grouping
//! at-rules with nested rules, and everything else kept verbatim. Brace
//! matching skips strings and comments; selector lists split on top-level
//! commas only.

use crate::element::SelectorSet;

/// At-rules whose block holds ordinary rules.
const GROUPING_AT_RULES: &[&str] = &["media", "supports", "container", "layer", "document"];

/// Placeholder Elementor replaces with the per-instance wrapper selector.
pub const WRAPPER_PLACEHOLDER: &str = "{{WRAPPER}}";

/// A single style rule.
#[derive(Debug, Clone, PartialEq)]
pub struct CssRule {
    pub selectors: Vec<String>,
    /// Declaration block without braces
    pub declarations: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CssNode {
    Rule(CssRule),
    /// `@media`, `@supports`, ... with nested nodes
    Group { prelude: String, children: Vec<CssNode> },
    /// Comments, `@import`-style statements and opaque blocks such as
    /// `@keyframes` or `@font-face`
    Raw(String),
}

// ─── Parsing ────────────────────────────────────────────────────────────────

pub fn parse_stylesheet(css: &str) -> Vec<CssNode> {
    let bytes = css.as_bytes();
    let mut nodes = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() || bytes[i] == b'}' {
            i += 1;
            continue;
        }
        if css[i..].starts_with("/*") {
            let end = css[i + 2..]
                .find("*/")
                .map(|p| i + 2 + p + 2)
                .unwrap_or(css.len());
            nodes.push(CssNode::Raw(css[i..end].to_string()));
            i = end;
            continue;
        }

        let Some((stop, terminator)) = find_prelude_end(css, i) else {
            let rest = css[i..].trim();
            if !rest.is_empty() {
                nodes.push(CssNode::Raw(rest.to_string()));
            }
            break;
        };
        let prelude = css[i..stop].trim();

        if terminator == b';' {
            nodes.push(CssNode::Raw(format!("{};", prelude)));
            i = stop + 1;
            continue;
        }

        let Some(close) = find_block_end(css, stop) else {
            nodes.push(CssNode::Raw(css[i..].trim().to_string()));
            break;
        };
        let inner = &css[stop + 1..close];

        if let Some(at_rule) = prelude.strip_prefix('@') {
            let name = at_rule
                .split(|c: char| c.is_whitespace() || c == '(')
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase();
            if GROUPING_AT_RULES.contains(&name.as_str()) {
                nodes.push(CssNode::Group {
                    prelude: prelude.to_string(),
                    children: parse_stylesheet(inner),
                });
            } else {
                nodes.push(CssNode::Raw(css[i..=close].trim().to_string()));
            }
        } else {
            nodes.push(CssNode::Rule(CssRule {
                selectors: split_selector_list(prelude),
                declarations: normalize_declarations(inner),
            }));
        }
        i = close + 1;
    }

    nodes
}

/// Position of the `{` or `;` ending the prelude that starts at `start`.
fn find_prelude_end(css: &str, start: usize) -> Option<(usize, u8)> {
    let bytes = css.as_bytes();
    let mut quote: Option<u8> = None;
    let mut parens = 0usize;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => parens += 1,
                b')' => parens = parens.saturating_sub(1),
                b'{' | b';' if parens == 0 => return Some((i, b)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Position of the `}` matching the `{` at `open`.
fn find_block_end(css: &str, open: usize) -> Option<usize> {
    let bytes = css.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i = css[i + 2..]
                .find("*/")
                .map(|p| i + 2 + p + 2)
                .unwrap_or(bytes.len());
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split `a, b:is(c, d), e` on top-level commas.
pub fn split_selector_list(prelude: &str) -> Vec<String> {
    let mut selectors = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for c in prelude.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            current.push(c);
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                let selector = current.trim();
                if !selector.is_empty() {
                    selectors.push(selector.to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    let selector = current.trim();
    if !selector.is_empty() {
        selectors.push(selector.to_string());
    }
    selectors
}

fn normalize_declarations(block: &str) -> String {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── Rendering ──────────────────────────────────────────────────────────────

pub fn render_stylesheet(nodes: &[CssNode]) -> String {
    let mut css = String::new();
    render_nodes(nodes, "", &mut css);
    css
}

fn render_nodes(nodes: &[CssNode], indent: &str, css: &mut String) {
    for node in nodes {
        css.push_str(indent);
        match node {
            CssNode::Rule(rule) => {
                css.push_str(&rule.selectors.join(", "));
                if rule.declarations.is_empty() {
                    css.push_str(" {}\n");
                } else {
                    css.push_str(" { ");
                    css.push_str(&rule.declarations);
                    css.push_str(" }\n");
                }
            }
            CssNode::Group { prelude, children } => {
                css.push_str(prelude);
                css.push_str(" {\n");
                render_nodes(children, &format!("{}  ", indent), css);
                css.push_str(indent);
                css.push_str("}\n");
            }
            CssNode::Raw(text) => {
                css.push_str(text);
                css.push('\n');
            }
        }
    }
}

// ─── Global selectors ───────────────────────────────────────────────────────

/// `body` or `html` on its own, which would style the whole page.
pub fn is_global_selector(selector: &str) -> bool {
    let selector = selector.trim();
    selector.eq_ignore_ascii_case("body") || selector.eq_ignore_ascii_case("html")
}

/// Every bare `body`/`html` selector in the stylesheet, nested ones included.
pub fn find_global_selectors(css: &str) -> Vec<String> {
    let mut found = Vec::new();
    collect_global_selectors(&parse_stylesheet(css), &mut found);
    found
}

fn collect_global_selectors(nodes: &[CssNode], found: &mut Vec<String>) {
    for node in nodes {
        match node {
            CssNode::Rule(rule) => found.extend(
                rule.selectors
                    .iter()
                    .filter(|s| is_global_selector(s))
                    .cloned(),
            ),
            CssNode::Group { children, .. } => collect_global_selectors(children, found),
            CssNode::Raw(_) => {}
        }
    }
}

fn without_global_selectors(nodes: Vec<CssNode>) -> Vec<CssNode> {
    nodes
        .into_iter()
        .filter_map(|node| match node {
            CssNode::Rule(mut rule) => {
                rule.selectors.retain(|s| !is_global_selector(s));
                (!rule.selectors.is_empty()).then_some(CssNode::Rule(rule))
            }
            CssNode::Group { prelude, children } => {
                let children = without_global_selectors(children);
                (!children.is_empty()).then_some(CssNode::Group { prelude, children })
            }
            raw => Some(raw),
        })
        .collect()
}

pub fn strip_global_selectors(css: &str) -> String {
    render_stylesheet(&without_global_selectors(parse_stylesheet(css)))
}

// ─── Pruning ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum SelectorRef {
    Tag(String),
    Class(String),
    Id(String),
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn read_ident(chars: &[char], mut i: usize) -> (String, usize) {
    let mut ident = String::new();
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            ident.push(chars[i + 1]);
            i += 2;
        } else if is_ident_char(c) {
            ident.push(c);
            i += 1;
        } else {
            break;
        }
    }
    (ident, i)
}

/// Type, class and id references of one complex selector.
fn selector_references(selector: &str) -> Vec<SelectorRef> {
    let chars: Vec<char> = selector.chars().collect();
    let mut refs = Vec::new();
    let mut compound_start = true;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '.' | '#' => {
                let (ident, next) = read_ident(&chars, i + 1);
                if !ident.is_empty() {
                    refs.push(if c == '.' {
                        SelectorRef::Class(ident)
                    } else {
                        SelectorRef::Id(ident)
                    });
                }
                i = next.max(i + 1);
                compound_start = false;
            }
            '[' => {
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                i += 1;
                compound_start = false;
            }
            ':' => {
                i += 1;
                while i < chars.len() && (chars[i] == ':' || is_ident_char(chars[i])) {
                    i += 1;
                }
                compound_start = false;
            }
            ' ' | '\t' | '\n' | '>' | '+' | '~' | '(' | ',' => {
                i += 1;
                compound_start = true;
            }
            c if compound_start && c.is_alphabetic() => {
                let (ident, next) = read_ident(&chars, i);
                refs.push(SelectorRef::Tag(ident.to_ascii_lowercase()));
                i = next;
                compound_start = false;
            }
            _ => {
                i += 1;
                compound_start = false;
            }
        }
    }
    refs
}

/// A selector is relevant when it references nothing specific (`*`,
/// `:root`, attribute-only) or at least one used tag, class or id.
fn selector_is_relevant(selector: &str, used: &SelectorSet) -> bool {
    let refs = selector_references(selector);
    refs.is_empty()
        || refs.iter().any(|r| match r {
            SelectorRef::Tag(tag) => used.tags.contains(tag),
            SelectorRef::Class(class) => used.classes.contains(class),
            SelectorRef::Id(id) => used.ids.contains(id),
        })
}

fn retain_relevant(nodes: Vec<CssNode>, used: &SelectorSet) -> Vec<CssNode> {
    nodes
        .into_iter()
        .filter_map(|node| match node {
            CssNode::Rule(rule) => rule
                .selectors
                .iter()
                .any(|s| selector_is_relevant(s, used))
                .then_some(CssNode::Rule(rule)),
            CssNode::Group { prelude, children } => {
                let children = retain_relevant(children, used);
                (!children.is_empty()).then_some(CssNode::Group { prelude, children })
            }
            raw => Some(raw),
        })
        .collect()
}

/// Keep only rules that can match something in the parsed markup.
pub fn prune_unused(css: &str, used: &SelectorSet) -> String {
    render_stylesheet(&retain_relevant(parse_stylesheet(css), used))
}

// ─── Scoping ────────────────────────────────────────────────────────────────

fn scope_selector(selector: &str, wrapper: &str) -> String {
    if selector.contains(wrapper) || selector.starts_with(':') {
        selector.to_string()
    } else {
        format!("{} {}", wrapper, selector)
    }
}

fn scope_nodes(nodes: Vec<CssNode>, wrapper: &str) -> Vec<CssNode> {
    nodes
        .into_iter()
        .map(|node| match node {
            CssNode::Rule(mut rule) => {
                rule.selectors = rule
                    .selectors
                    .iter()
                    .map(|s| scope_selector(s, wrapper))
                    .collect();
                CssNode::Rule(rule)
            }
            CssNode::Group { prelude, children } => CssNode::Group {
                prelude,
                children: scope_nodes(children, wrapper),
            },
            raw => raw,
        })
        .collect()
}

/// Prefix every selector with `wrapper`. Opaque at-rules are untouched.
pub fn scope_css(css: &str, wrapper: &str) -> String {
    render_stylesheet(&scope_nodes(parse_stylesheet(css), wrapper))
}

// ─── Widget stylesheet ──────────────────────────────────────────────────────

/// Style text ready to embed in a widget: optionally pruned to the rules
/// the markup can use, stripped of page-global selectors, optionally scoped.
pub fn prepare_widget_css(css: &str, used: Option<&SelectorSet>, wrapper: Option<&str>) -> String {
    if css.trim().is_empty() {
        return String::new();
    }
    let mut nodes = parse_stylesheet(css);
    if let Some(used) = used.filter(|u| !u.is_empty()) {
        nodes = retain_relevant(nodes, used);
    }
    nodes = without_global_selectors(nodes);
    if let Some(wrapper) = wrapper {
        nodes = scope_nodes(nodes, wrapper);
    }
    render_stylesheet(&nodes).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn used(tags: &[&str], classes: &[&str], ids: &[&str]) -> SelectorSet {
        let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>();
        SelectorSet {
            tags: set(tags),
            classes: set(classes),
            ids: set(ids),
        }
    }

    #[test]
    fn test_parse_rules_and_groups() {
        let css = ".a { color: red; }\n@media (max-width: 600px) {\n  .b, .c { margin: 0; }\n}\n@import url(\"x.css\");";
        let nodes = parse_stylesheet(css);
        assert_eq!(nodes.len(), 3);
        assert_eq!(
            nodes[0],
            CssNode::Rule(CssRule {
                selectors: vec![".a".into()],
                declarations: "color: red;".into(),
            })
        );
        match &nodes[1] {
            CssNode::Group { prelude, children } => {
                assert_eq!(prelude, "@media (max-width: 600px)");
                assert_eq!(children.len(), 1);
            }
            other => panic!("expected group, got {:?}", other),
        }
        assert_eq!(nodes[2], CssNode::Raw("@import url(\"x.css\");".into()));
    }

    #[test]
    fn test_braces_inside_strings() {
        let css = r#".q::before { content: "}{"; } .r { color: blue; }"#;
        let nodes = parse_stylesheet(css);
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_selector_list_split_respects_parens() {
        assert_eq!(
            split_selector_list(".a, :is(.b, .c) > p, [data-x=\"1,2\"]"),
            vec![".a", ":is(.b, .c) > p", "[data-x=\"1,2\"]"]
        );
    }

    #[test]
    fn test_strip_global_selectors() {
        let css = "body { color: red; }\nhtml, .keep { margin: 0; }\n.body-text { color: blue; }\n@media print { body { display: none; } }";
        let stripped = strip_global_selectors(css);
        assert_eq!(stripped, ".keep { margin: 0; }\n.body-text { color: blue; }\n");
        assert!(find_global_selectors(&stripped).is_empty());
    }

    #[test]
    fn test_find_global_selectors() {
        let found =
            find_global_selectors("BODY { x: 1 } .a, html { y: 2 } @media print { body { z: 3 } }");
        assert_eq!(found, vec!["BODY", "html", "body"]);
    }

    #[test]
    fn test_scope_css() {
        let css = ".hero h1 { color: red; }\n:root { --x: 1; }\n@keyframes spin { from { transform: rotate(0); } to { transform: rotate(360deg); } }";
        let scoped = scope_css(css, WRAPPER_PLACEHOLDER);
        assert!(scoped.contains("{{WRAPPER}} .hero h1 { color: red; }"));
        assert!(scoped.contains(":root { --x: 1; }"));
        assert!(scoped.contains("@keyframes spin { from"));
        assert!(!scoped.contains("{{WRAPPER}} from"));
    }

    #[test]
    fn test_prune_unused() {
        let css = ".card { a: 1 }\n.unused { b: 2 }\nh2.title { c: 3 }\n#main { d: 4 }\n* { e: 5 }\n@media (min-width: 1px) { .gone { f: 6 } }";
        let pruned = prune_unused(css, &used(&["div", "h2"], &["card"], &["main"]));
        assert_eq!(
            pruned,
            ".card { a: 1 }\nh2.title { c: 3 }\n#main { d: 4 }\n* { e: 5 }\n"
        );
    }

    #[test]
    fn test_selector_references() {
        assert_eq!(
            selector_references("section#top.hero > a:hover [href]"),
            vec![
                SelectorRef::Tag("section".into()),
                SelectorRef::Id("top".into()),
                SelectorRef::Class("hero".into()),
                SelectorRef::Tag("a".into()),
            ]
        );
    }

    #[test]
    fn test_prepare_widget_css() {
        let css = "body { color: red; }\n.title {\n  color: blue;\n  font-size: 2rem;\n}\n.other { x: y }";
        let prepared = prepare_widget_css(
            css,
            Some(&used(&["h1"], &["title"], &[])),
            Some(WRAPPER_PLACEHOLDER),
        );
        assert_eq!(prepared, "{{WRAPPER}} .title { color: blue; font-size: 2rem; }");
    }

    #[test]
    fn test_prepare_empty() {
        assert_eq!(prepare_widget_css("  \n", None, Some(WRAPPER_PLACEHOLDER)), "");
    }
}
