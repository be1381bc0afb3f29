use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::debug;

use super::controls::DefaultValue;
use super::BoundElement;
use crate::catalog::ControlTemplate;
use crate::element::ParsedElement;
use crate::php::{single_quoted, PhpWriter};

// ─── Element categories ─────────────────────────────────────────────────────

/// How the render routine treats an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Heading,
    Anchor,
    Button,
    Image,
    TextContainer,
    Input,
    Passthrough,
}

impl ElementKind {
    /// Field whose presence in the resolved template enables substitution.
    fn defining_field(&self) -> Option<&'static str> {
        match self {
            ElementKind::Heading => Some("heading_text"),
            ElementKind::Anchor => Some("link_text"),
            ElementKind::Button => Some("button_text"),
            ElementKind::Image => Some("image"),
            ElementKind::TextContainer => Some("text"),
            ElementKind::Input => Some("placeholder"),
            ElementKind::Passthrough => None,
        }
    }
}

pub fn classify(element: &ParsedElement, template: &ControlTemplate) -> ElementKind {
    let kind = match element.tag.as_str() {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => ElementKind::Heading,
        "a" => ElementKind::Anchor,
        "button" => ElementKind::Button,
        "img" => ElementKind::Image,
        "input" | "textarea" => ElementKind::Input,
        _ => ElementKind::TextContainer,
    };
    match kind.defining_field() {
        Some(field) if template.has_field(field) => kind,
        _ => ElementKind::Passthrough,
    }
}

// ─── Render plan ────────────────────────────────────────────────────────────

/// Output escaping applied to a substituted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    Html,
    Attr,
    Url,
}

impl Escape {
    pub fn php_function(&self) -> &'static str {
        match self {
            Escape::Html => "esc_html",
            Escape::Attr => "esc_attr",
            Escape::Url => "esc_url",
        }
    }

    pub fn apply(&self, text: &str) -> String {
        match self {
            Escape::Html | Escape::Attr => escape_html(text),
            Escape::Url => escape_url(text),
        }
    }
}

/// A value read at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `$settings['id']`
    Setting(String),
    /// `$var`
    Var(String),
    /// `$var['url']`
    Url(String),
}

impl Value {
    fn to_php(&self) -> String {
        match self {
            Value::Setting(id) => format!("$settings[{}]", single_quoted(id)),
            Value::Var(var) => format!("${}", var),
            Value::Url(var) => format!("${}['url']", var),
        }
    }
}

/// Right-hand side of a local variable assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Init {
    Setting(String),
    /// The setting, or a literal when it is empty
    SettingOr { id: String, fallback: String },
    /// The link setting when it has a URL, else `null`
    LinkOrNull(String),
    /// The link or media setting when it has a URL, else `['url' => fallback]`
    UrlOr { id: String, fallback: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub var: String,
    pub init: Init,
}

impl Binding {
    fn to_php(&self) -> String {
        let rhs = match &self.init {
            Init::Setting(id) => Value::Setting(id.clone()).to_php(),
            Init::SettingOr { id, fallback } => {
                let setting = Value::Setting(id.clone()).to_php();
                format!("!empty({0}) ? {0} : {1}", setting, single_quoted(fallback))
            }
            Init::LinkOrNull(id) => {
                let setting = Value::Setting(id.clone()).to_php();
                format!("!empty({0}['url']) ? {0} : null", setting)
            }
            Init::UrlOr { id, fallback } => {
                let setting = Value::Setting(id.clone()).to_php();
                format!(
                    "!empty({0}['url']) ? {0} : ['url' => {1}]",
                    setting,
                    single_quoted(fallback)
                )
            }
        };
        format!("${} = {};", self.var, rhs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPart {
    Markup(String),
    Echo { value: Value, escape: Escape },
    /// `target`/`rel` attributes taken from a link setting
    LinkAttributes(String),
    /// Parts emitted only when the variable is truthy
    IfSet { var: String, body: Vec<RenderPart> },
}

/// The render routine's body: local bindings, then the markup region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderPlan {
    pub bindings: Vec<Binding>,
    pub parts: Vec<RenderPart>,
}

impl RenderPlan {
    pub fn substitution_count(&self) -> usize {
        fn count(parts: &[RenderPart]) -> usize {
            parts
                .iter()
                .map(|part| match part {
                    RenderPart::Markup(_) => 0,
                    RenderPart::IfSet { body, .. } => count(body),
                    _ => 1,
                })
                .sum()
        }
        count(&self.parts)
    }

    pub fn has_markup(&self) -> bool {
        self.parts.iter().any(|part| match part {
            RenderPart::Markup(text) => !text.trim().is_empty(),
            _ => true,
        })
    }

    /// Emit bindings as PHP lines, then the markup region, ending in PHP mode.
    pub fn write_php(&self, w: &mut PhpWriter, indent: &str) {
        for binding in &self.bindings {
            w.line(&format!("{}{}", indent, binding.to_php()));
        }
        if !self.has_markup() {
            return;
        }
        w.blank_line();
        w.line(&format!("{}// Widget markup", indent));
        write_parts(&self.parts, w);
        w.enter_php();
    }

    /// HTML the routine produces when every control holds `defaults`.
    pub fn preview(&self, defaults: &BTreeMap<String, DefaultValue>) -> String {
        let vars: HashMap<&str, Slot> = self
            .bindings
            .iter()
            .map(|b| (b.var.as_str(), evaluate_init(&b.init, defaults)))
            .collect();
        let mut html = String::new();
        preview_parts(&self.parts, defaults, &vars, &mut html);
        html
    }
}

fn write_parts(parts: &[RenderPart], w: &mut PhpWriter) {
    for part in parts {
        match part {
            RenderPart::Markup(text) => w.markup(text),
            RenderPart::Echo { value, escape } => {
                w.inline(&format!("echo {}({});", escape.php_function(), value.to_php()))
            }
            RenderPart::LinkAttributes(var) => w.inline(&format!(
                "echo !empty(${0}['is_external']) ? ' target=\"_blank\"' : ''; echo !empty(${0}['nofollow']) ? ' rel=\"nofollow\"' : '';",
                var
            )),
            RenderPart::IfSet { var, body } => {
                w.inline(&format!("if (${}) :", var));
                write_parts(body, w);
                w.inline("endif;");
            }
        }
    }
}

// ─── Preview evaluation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Text(String),
    Link(String),
    Null,
}

fn setting_text<'a>(defaults: &'a BTreeMap<String, DefaultValue>, id: &str) -> &'a str {
    defaults.get(id).map(DefaultValue::as_text).unwrap_or_default()
}

fn setting_url<'a>(defaults: &'a BTreeMap<String, DefaultValue>, id: &str) -> Option<&'a str> {
    match defaults.get(id) {
        Some(DefaultValue::Url(url)) if !url.is_empty() => Some(url),
        _ => None,
    }
}

fn evaluate_init(init: &Init, defaults: &BTreeMap<String, DefaultValue>) -> Slot {
    match init {
        Init::Setting(id) => match defaults.get(id) {
            Some(DefaultValue::Url(url)) => Slot::Link(url.clone()),
            Some(value) => Slot::Text(value.as_text().to_string()),
            None => Slot::Null,
        },
        Init::SettingOr { id, fallback } => {
            let value = setting_text(defaults, id);
            Slot::Text(if value.is_empty() { fallback.clone() } else { value.to_string() })
        }
        Init::LinkOrNull(id) => setting_url(defaults, id)
            .map(|url| Slot::Link(url.to_string()))
            .unwrap_or(Slot::Null),
        Init::UrlOr { id, fallback } => {
            Slot::Link(setting_url(defaults, id).unwrap_or(fallback).to_string())
        }
    }
}

fn preview_parts(
    parts: &[RenderPart],
    defaults: &BTreeMap<String, DefaultValue>,
    vars: &HashMap<&str, Slot>,
    html: &mut String,
) {
    for part in parts {
        match part {
            RenderPart::Markup(text) => html.push_str(text),
            RenderPart::Echo { value, escape } => {
                let raw = match value {
                    Value::Setting(id) => setting_text(defaults, id),
                    Value::Var(var) => match vars.get(var.as_str()) {
                        Some(Slot::Text(text)) | Some(Slot::Link(text)) => text.as_str(),
                        _ => "",
                    },
                    Value::Url(var) => match vars.get(var.as_str()) {
                        Some(Slot::Link(url)) => url.as_str(),
                        _ => "",
                    },
                };
                html.push_str(&escape.apply(raw));
            }
            // Defaults never mark a link external or nofollow.
            RenderPart::LinkAttributes(_) => {}
            RenderPart::IfSet { var, body } => {
                let truthy = match vars.get(var.as_str()) {
                    Some(Slot::Text(text)) | Some(Slot::Link(text)) => !text.is_empty(),
                    _ => false,
                };
                if truthy {
                    preview_parts(body, defaults, vars, html);
                }
            }
        }
    }
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]*|#[0-9]+|#[xX][0-9A-Fa-f]+);").unwrap())
}

/// `esc_html` / `esc_attr` semantics: special characters become entities,
/// existing entities are left alone.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        match c {
            '&' if entity_regex().is_match(&text[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Display-context approximation of `esc_url`.
pub fn escape_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for (i, c) in url.trim().char_indices() {
        match c {
            '&' if entity_regex().is_match(&url.trim()[i..]) => out.push('&'),
            '&' => out.push_str("&#038;"),
            '\'' => out.push_str("&#039;"),
            '"' => out.push_str("%22"),
            ' ' => out.push_str("%20"),
            '<' | '>' | '\\' => {}
            c => out.push(c),
        }
    }
    out
}

// ─── Start tag scanning ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct RawAttribute<'a> {
    /// Lowercase attribute name
    name: String,
    /// Attribute exactly as written, e.g. `class="title"`
    raw: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
struct StartTag<'a> {
    name: String,
    raw_name: &'a str,
    start: usize,
    end: usize,
    attributes: Vec<RawAttribute<'a>>,
    self_closing: bool,
}

impl StartTag<'_> {
    fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    fn attributes_text(&self) -> String {
        self.attributes
            .iter()
            .map(|a| format!(" {}", a.raw))
            .collect()
    }

    fn tail(&self) -> &'static str {
        if self.self_closing {
            " />"
        } else {
            ">"
        }
    }
}

/// Elements whose content is raw text and must not be scanned for tags.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title", "xmp"];

fn scan_start_tags(markup: &str) -> Vec<StartTag<'_>> {
    let bytes = markup.as_bytes();
    let mut tags = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        if markup[i..].starts_with("<!--") {
            i = markup[i + 4..]
                .find("-->")
                .map(|p| i + 4 + p + 3)
                .unwrap_or(bytes.len());
            continue;
        }
        if !bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) {
            i += 1;
            continue;
        }
        let Some(tag) = parse_start_tag(markup, i) else {
            i += 1;
            continue;
        };
        i = tag.end;
        if RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) && !tag.self_closing {
            let closing = format!("</{}", tag.name);
            i = markup[i..]
                .to_ascii_lowercase()
                .find(&closing)
                .map(|p| i + p)
                .unwrap_or(bytes.len());
        }
        tags.push(tag);
    }
    tags
}

fn parse_start_tag(markup: &str, start: usize) -> Option<StartTag<'_>> {
    let bytes = markup.as_bytes();
    let len = bytes.len();
    let mut i = start + 1;
    while i < len && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'-' | b'_' | b':')) {
        i += 1;
    }
    let raw_name = &markup[start + 1..i];
    let mut attributes = Vec::new();

    loop {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= len {
            return None;
        }
        match bytes[i] {
            b'>' | b'/' if bytes[i] == b'>' || bytes.get(i + 1) == Some(&b'>') => {
                let self_closing = bytes[i] == b'/';
                return Some(StartTag {
                    name: raw_name.to_ascii_lowercase(),
                    raw_name,
                    start,
                    end: if self_closing { i + 2 } else { i + 1 },
                    attributes,
                    self_closing,
                });
            }
            b'/' | b'"' | b'\'' | b'=' => i += 1,
            _ => {
                let attr_start = i;
                while i < len
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'=' | b'>' | b'/')
                {
                    i += 1;
                }
                let name = markup[attr_start..i].to_ascii_lowercase();

                let mut j = i;
                while j < len && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if j < len && bytes[j] == b'=' {
                    j += 1;
                    while j < len && bytes[j].is_ascii_whitespace() {
                        j += 1;
                    }
                    if j < len && (bytes[j] == b'"' || bytes[j] == b'\'') {
                        let quote = bytes[j] as char;
                        let close = markup[j + 1..].find(quote)? + j + 1;
                        i = close + 1;
                    } else {
                        while j < len && !bytes[j].is_ascii_whitespace() && bytes[j] != b'>' {
                            j += 1;
                        }
                        i = j;
                    }
                }

                attributes.push(RawAttribute {
                    name,
                    raw: &markup[attr_start..i],
                });
            }
        }
    }
}

/// End of the `</name>` tag starting at `pos`, if one starts there.
fn closing_tag_end(markup: &str, pos: usize, name: &str) -> Option<usize> {
    let after = markup.get(pos..)?.strip_prefix("</")?;
    if !after.get(..name.len())?.eq_ignore_ascii_case(name) {
        return None;
    }
    let rest = &after[name.len()..];
    let trimmed = rest.trim_start();
    if !trimmed.starts_with('>') {
        return None;
    }
    Some(markup.len() - trimmed.len() + 1)
}

/// Decode the few entities that commonly appear in literal text.
fn decode_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ─── Planning ───────────────────────────────────────────────────────────────

struct Substitution {
    start: usize,
    end: usize,
    bindings: Vec<Binding>,
    parts: Vec<RenderPart>,
}

/// Span of a leaf element's literal text: `(inner_start, inner_end, end)`.
fn text_span(
    markup: &str,
    tag: &StartTag<'_>,
    element: &ParsedElement,
) -> Option<(usize, usize, usize)> {
    if tag.self_closing || element.has_child_elements() {
        return None;
    }
    let expected = element.text.as_deref()?;
    let inner_end = markup[tag.end..].find('<').map(|p| tag.end + p)?;
    let end = closing_tag_end(markup, inner_end, &tag.name)?;
    if decode_text(markup[tag.end..inner_end].trim()) != expected {
        return None;
    }
    Some((tag.end, inner_end, end))
}

fn link_open(var: &str) -> Vec<RenderPart> {
    vec![
        RenderPart::Markup("<a href=\"".to_string()),
        RenderPart::Echo {
            value: Value::Url(var.to_string()),
            escape: Escape::Url,
        },
        RenderPart::Markup("\"".to_string()),
        RenderPart::LinkAttributes(var.to_string()),
        RenderPart::Markup(">".to_string()),
    ]
}

fn wrap_in_link(var: Option<String>, inner: Vec<RenderPart>) -> Vec<RenderPart> {
    let Some(var) = var else {
        return inner;
    };
    let mut parts = vec![RenderPart::IfSet {
        var: var.clone(),
        body: link_open(&var),
    }];
    parts.extend(inner);
    parts.push(RenderPart::IfSet {
        var,
        body: vec![RenderPart::Markup("</a>".to_string())],
    });
    parts
}

/// Rebuild a start tag, replacing the named attributes with echoed values
/// and appending those the tag lacks.
fn rewrite_start_tag(
    tag: &StartTag<'_>,
    replacements: &[(&str, Value, Escape)],
) -> Vec<RenderPart> {
    let attribute = |name: &str, value: &Value, escape: Escape| {
        vec![
            RenderPart::Markup(format!(" {}=\"", name)),
            RenderPart::Echo {
                value: value.clone(),
                escape,
            },
            RenderPart::Markup("\"".to_string()),
        ]
    };

    let mut parts = vec![RenderPart::Markup(format!("<{}", tag.raw_name))];
    for attr in &tag.attributes {
        match replacements.iter().find(|(name, _, _)| *name == attr.name) {
            Some((name, value, escape)) => parts.extend(attribute(name, value, *escape)),
            None => parts.push(RenderPart::Markup(format!(" {}", attr.raw))),
        }
    }
    for (name, value, escape) in replacements {
        if !tag.has_attribute(name) {
            parts.extend(attribute(name, value, *escape));
        }
    }
    parts
}

fn substitute(markup: &str, tag: &StartTag<'_>, item: &BoundElement<'_>) -> Option<Substitution> {
    let element = item.element;
    let index = item.index;
    let mut bindings = Vec::new();

    let (start, end, parts) = match item.kind {
        ElementKind::Passthrough => return None,

        ElementKind::TextContainer => {
            let text_id = item.control("text")?;
            let (inner_start, inner_end, end) = text_span(markup, tag, element)?;
            let parts = vec![
                RenderPart::Markup(markup[tag.start..inner_start].to_string()),
                RenderPart::Echo {
                    value: Value::Setting(text_id),
                    escape: Escape::Html,
                },
                RenderPart::Markup(markup[inner_end..end].to_string()),
            ];
            (tag.start, end, parts)
        }

        ElementKind::Heading => {
            let text_id = item.control("heading_text")?;
            let (_, _, end) = text_span(markup, tag, element)?;

            let text_var = format!("heading_text_{}", index);
            bindings.push(Binding {
                var: text_var.clone(),
                init: Init::Setting(text_id),
            });

            let tag_part = match item.control("html_tag") {
                Some(id) => {
                    let var = format!("html_tag_{}", index);
                    bindings.push(Binding {
                        var: var.clone(),
                        init: Init::SettingOr {
                            id,
                            fallback: element.tag.clone(),
                        },
                    });
                    RenderPart::Echo {
                        value: Value::Var(var),
                        escape: Escape::Attr,
                    }
                }
                None => RenderPart::Markup(tag.raw_name.to_string()),
            };

            let link_var = item.control("link").map(|id| {
                let var = format!("link_{}", index);
                bindings.push(Binding {
                    var: var.clone(),
                    init: Init::LinkOrNull(id),
                });
                var
            });

            let heading = vec![
                RenderPart::Markup("<".to_string()),
                tag_part.clone(),
                RenderPart::Markup(format!("{}>", tag.attributes_text())),
                RenderPart::Echo {
                    value: Value::Var(text_var),
                    escape: Escape::Html,
                },
                RenderPart::Markup("</".to_string()),
                tag_part,
                RenderPart::Markup(">".to_string()),
            ];
            (tag.start, end, wrap_in_link(link_var, heading))
        }

        ElementKind::Anchor => {
            let text_id = item.control("link_text")?;
            let (_, inner_end, end) = text_span(markup, tag, element)?;

            let mut replacements = Vec::new();
            let link_var = item.control("link_url").map(|id| {
                let var = format!("link_url_{}", index);
                bindings.push(Binding {
                    var: var.clone(),
                    init: Init::UrlOr {
                        id,
                        fallback: element.attribute("href").unwrap_or("#").to_string(),
                    },
                });
                var
            });
            if let Some(var) = &link_var {
                replacements.push(("href", Value::Url(var.clone()), Escape::Url));
            }

            let mut parts = rewrite_start_tag(tag, &replacements);
            if let Some(var) = link_var {
                if !tag.has_attribute("target") && !tag.has_attribute("rel") {
                    parts.push(RenderPart::LinkAttributes(var));
                }
            }
            parts.push(RenderPart::Markup(">".to_string()));
            parts.push(RenderPart::Echo {
                value: Value::Setting(text_id),
                escape: Escape::Html,
            });
            parts.push(RenderPart::Markup(markup[inner_end..end].to_string()));
            (tag.start, end, parts)
        }

        ElementKind::Button => {
            let text_id = item.control("button_text")?;
            let (inner_start, inner_end, end) = text_span(markup, tag, element)?;

            let link_var = item.control("button_link").map(|id| {
                let var = format!("button_link_{}", index);
                bindings.push(Binding {
                    var: var.clone(),
                    init: Init::LinkOrNull(id),
                });
                var
            });
            let button = vec![
                RenderPart::Markup(markup[tag.start..inner_start].to_string()),
                RenderPart::Echo {
                    value: Value::Setting(text_id),
                    escape: Escape::Html,
                },
                RenderPart::Markup(markup[inner_end..end].to_string()),
            ];
            (tag.start, end, wrap_in_link(link_var, button))
        }

        ElementKind::Image => {
            let image_id = item.control("image")?;
            let image_var = format!("image_{}", index);
            bindings.push(Binding {
                var: image_var.clone(),
                init: Init::UrlOr {
                    id: image_id,
                    fallback: element.attribute("src").unwrap_or_default().to_string(),
                },
            });
            let mut replacements = vec![("src", Value::Url(image_var), Escape::Url)];
            if let Some(alt_id) = item.control("alt_text") {
                let alt_var = format!("alt_text_{}", index);
                bindings.push(Binding {
                    var: alt_var.clone(),
                    init: Init::SettingOr {
                        id: alt_id,
                        fallback: element.attribute("alt").unwrap_or_default().to_string(),
                    },
                });
                replacements.push(("alt", Value::Var(alt_var), Escape::Attr));
            }
            let mut parts = rewrite_start_tag(tag, &replacements);
            parts.push(RenderPart::Markup(tag.tail().to_string()));
            (tag.start, tag.end, parts)
        }

        ElementKind::Input => {
            let placeholder_id = item.control("placeholder")?;
            if !tag.has_attribute("placeholder") {
                return None;
            }
            let replacements = [("placeholder", Value::Setting(placeholder_id), Escape::Attr)];
            let mut parts = rewrite_start_tag(tag, &replacements);
            parts.push(RenderPart::Markup(tag.tail().to_string()));
            (tag.start, tag.end, parts)
        }
    };

    Some(Substitution {
        start,
        end,
        bindings,
        parts,
    })
}

/// Join adjacent literal parts and drop empty ones.
fn merge_markup(parts: Vec<RenderPart>) -> Vec<RenderPart> {
    let mut merged: Vec<RenderPart> = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            RenderPart::Markup(text) if text.is_empty() => {}
            RenderPart::Markup(text) => match merged.last_mut() {
                Some(RenderPart::Markup(previous)) => previous.push_str(&text),
                _ => merged.push(RenderPart::Markup(text)),
            },
            RenderPart::IfSet { var, body } => merged.push(RenderPart::IfSet {
                var,
                body: merge_markup(body),
            }),
            other => merged.push(other),
        }
    }
    merged
}

/// Build the render plan for sanitized `markup`.
///
/// Elements are matched to start tags in document order by tag name. An
/// element whose literal markup cannot be located, or whose content is not
/// plain text, is left as literal markup.
pub fn plan_render(markup: &str, bound: &[BoundElement<'_>]) -> RenderPlan {
    let tags = scan_start_tags(markup);
    let mut plan = RenderPlan::default();
    let mut parts = Vec::new();
    let mut cursor = 0;
    let mut written = 0;

    for item in bound {
        let Some(offset) = tags[cursor..]
            .iter()
            .position(|t| t.name == item.element.tag)
        else {
            debug!(tag = %item.element.tag, index = item.index, "no literal markup for element");
            continue;
        };
        let tag = &tags[cursor + offset];
        cursor += offset + 1;

        if tag.start < written {
            continue;
        }
        let Some(substitution) = substitute(markup, tag, item) else {
            continue;
        };
        parts.push(RenderPart::Markup(markup[written..substitution.start].to_string()));
        parts.extend(substitution.parts);
        plan.bindings.extend(substitution.bindings);
        written = substitution.end;
    }

    parts.push(RenderPart::Markup(markup[written..].to_string()));
    plan.parts = merge_markup(parts);
    debug!(
        substitutions = plan.substitution_count(),
        bindings = plan.bindings.len(),
        "planned render routine"
    );
    plan
}
