use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;

use crate::diagnostic::{IssueKind, ValidationIssue, ValidationResult};
use crate::php::{unescape_literal, PHP_CLOSE, PHP_OPEN};
use crate::style::find_global_selectors;

const SHORT_ECHO_OPEN: &str = "<?=";
const SNIPPET_MAX_CHARS: usize = 100;

/// Code controls whose value is emitted verbatim inside `<style>`/`<script>`.
const RAW_CODE_CONTROLS: &[&str] = &["custom_css", "custom_js"];

/// Keywords that justify leaving PHP and immediately re-entering it.
const SUBSTITUTION_KEYWORDS: &[&str] = &[
    "echo", "if", "else", "elseif", "endif", "foreach", "endforeach", "while", "endwhile",
];

const REQUIRED_METHODS: &[&str] = &[
    "get_name",
    "get_title",
    "get_icon",
    "get_categories",
    "register_controls",
    "render",
];

/// Validate a generated widget module. Every check runs; findings are unioned.
pub fn validate_widget(source: &str) -> ValidationResult {
    let lines: Vec<&str> = source.lines().collect();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    errors.extend(check_render_modes(&lines));
    errors.extend(check_redundant_transitions(source));
    errors.extend(check_document_structure(source, &lines));
    warnings.extend(check_unescaped_output(source));
    warnings.extend(check_global_css(source));
    errors.extend(check_control_ids(source));
    errors.extend(check_quote_balance(&lines));
    errors.extend(check_class_structure(source));

    let result = ValidationResult::new(errors, warnings);
    debug!(
        valid = result.valid,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "validated widget source"
    );
    result
}

fn snippet(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= SNIPPET_MAX_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(SNIPPET_MAX_CHARS).collect();
    format!("{}...", cut)
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

// ─── Render routine mode tracking ───────────────────────────────────────────

fn render_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bfunction\s+render\s*\(").unwrap())
}

fn markup_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<[A-Za-z/!]").unwrap())
}

/// Mode after `line`, decided by whichever delimiter comes last.
fn mode_after(line: &str, in_php: bool) -> bool {
    let close = line.rfind(PHP_CLOSE);
    let open = [line.rfind(PHP_OPEN), line.rfind(SHORT_ECHO_OPEN)]
        .into_iter()
        .flatten()
        .max();
    match (open, close) {
        (Some(o), Some(c)) => o > c,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => in_php,
    }
}

fn check_render_modes(lines: &[&str]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let Some(decl) = lines.iter().position(|l| render_decl_regex().is_match(l)) else {
        return issues;
    };
    let decl_indent = indent_width(lines[decl]);
    let mut in_php = true;
    let mut previous = lines[decl].trim();

    for (offset, line) in lines[decl + 1..].iter().enumerate() {
        let number = decl + offset + 2;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if in_php && trimmed.starts_with('}') && indent_width(line) <= decl_indent {
            break;
        }

        if in_php && trimmed == PHP_OPEN && !(previous.ends_with(PHP_CLOSE) || previous == "}") {
            issues.push(
                ValidationIssue::new(
                    IssueKind::Syntax,
                    "Orphaned <?php tag: the render routine is already in PHP mode",
                )
                .at_line(number)
                .with_snippet(snippet(line)),
            );
        } else if in_php && markup_line_regex().is_match(trimmed) {
            issues.push(
                ValidationIssue::new(
                    IssueKind::Syntax,
                    "Markup output while in PHP mode; close PHP with ?> first",
                )
                .at_line(number)
                .with_snippet(snippet(line)),
            );
        }

        in_php = mode_after(line, in_php);
        previous = trimmed;
    }

    debug!(issues = issues.len(), "checked render mode transitions");
    issues
}

fn transition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\?>\s*<\?php\s+(\w*)").unwrap())
}

fn check_redundant_transitions(source: &str) -> Vec<ValidationIssue> {
    let redundant: Vec<usize> = transition_regex()
        .captures_iter(source)
        .filter(|caps| {
            let keyword = caps.get(1).map_or("", |m| m.as_str());
            !SUBSTITUTION_KEYWORDS.contains(&keyword)
        })
        .filter_map(|caps| caps.get(0).map(|m| m.start()))
        .collect();

    let Some(&first) = redundant.first() else {
        return Vec::new();
    };
    let line = line_of(source, first);
    let text = source.lines().nth(line - 1).unwrap_or_default();
    vec![ValidationIssue::new(
        IssueKind::Syntax,
        format!(
            "Redundant PHP mode transition: ?> immediately followed by <?php with nothing to output ({} occurrence(s))",
            redundant.len()
        ),
    )
    .at_line(line)
    .with_snippet(snippet(text))]
}

// ─── Document structure ─────────────────────────────────────────────────────

fn forbidden_structures() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)<!DOCTYPE", "<!DOCTYPE> declaration"),
            (r"(?i)<html[\s>]", "<html> opening tag"),
            (r"(?i)</html>", "</html> closing tag"),
            (r"(?i)<head[\s>]", "<head> section"),
            (r"(?i)<body[\s>]", "<body> tag"),
        ]
        .into_iter()
        .map(|(pattern, what)| (Regex::new(pattern).unwrap(), what))
        .collect()
    })
}

fn check_document_structure(source: &str, lines: &[&str]) -> Vec<ValidationIssue> {
    forbidden_structures()
        .iter()
        .filter_map(|(re, what)| {
            let found = re.find(source)?;
            let line = line_of(source, found.start());
            Some(
                ValidationIssue::new(
                    IssueKind::Structure,
                    format!("Widget output must be a fragment: found {}", what),
                )
                .at_line(line)
                .with_snippet(snippet(lines.get(line - 1).copied().unwrap_or_default())),
            )
        })
        .collect()
}

// ─── Output escaping and style defaults ─────────────────────────────────────

fn unescaped_output_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:echo\s+|<\?=\s*)\$settings\[\s*['"]?([^'"\]]*)"#).unwrap()
    })
}

fn check_unescaped_output(source: &str) -> Option<ValidationIssue> {
    let matches: Vec<usize> = unescaped_output_regex()
        .captures_iter(source)
        .filter(|caps| !RAW_CODE_CONTROLS.contains(&&caps[1]))
        .filter_map(|caps| caps.get(0).map(|m| m.start()))
        .collect();
    let first = *matches.first()?;
    Some(
        ValidationIssue::new(
            IssueKind::Security,
            format!(
                "{} control value(s) echoed without escaping; wrap them in esc_html(), esc_attr() or esc_url()",
                matches.len()
            ),
        )
        .at_line(line_of(source, first)),
    )
}

fn custom_css_default_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"'custom_css',\s*\[(?:[^\]'"]|'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*")*?'default'\s*=>\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')"#,
        )
        .unwrap()
    })
}

fn check_global_css(source: &str) -> Option<ValidationIssue> {
    let caps = custom_css_default_regex().captures(source)?;
    let css = match (caps.get(1), caps.get(2)) {
        (Some(body), _) => unescape_literal(body.as_str(), '"'),
        (None, Some(body)) => unescape_literal(body.as_str(), '\''),
        (None, None) => return None,
    };
    let globals: BTreeSet<String> = find_global_selectors(&css)
        .into_iter()
        .map(|s| s.to_ascii_lowercase())
        .collect();
    if globals.is_empty() {
        return None;
    }
    let list = globals.into_iter().collect::<Vec<_>>().join(", ");
    Some(ValidationIssue::new(
        IssueKind::BestPractice,
        format!(
            "Custom CSS targets global selector(s) {}; such rules are stripped, use scoped class selectors instead",
            list
        ),
    ))
}

// ─── Control ids ────────────────────────────────────────────────────────────

fn settings_lookup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\$settings\[(?:'([^']*)'|"([^"]*)")\]"#).unwrap())
}

fn control_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap())
}

fn check_control_ids(source: &str) -> Vec<ValidationIssue> {
    let mut seen = BTreeSet::new();
    let mut issues = Vec::new();
    for caps in settings_lookup_regex().captures_iter(source) {
        let Some(id) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        if control_id_regex().is_match(id.as_str()) || !seen.insert(id.as_str()) {
            continue;
        }
        let line = line_of(source, id.start());
        let text = source.lines().nth(line - 1).unwrap_or_default();
        issues.push(
            ValidationIssue::new(
                IssueKind::Syntax,
                format!(
                    "Invalid control id '{}': only letters, digits and underscores are allowed",
                    id.as_str()
                ),
            )
            .at_line(line)
            .with_snippet(snippet(text)),
        );
    }
    issues
}

// ─── Quote balance ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Markup,
    Code,
    BlockComment,
}

/// Flag PHP string literals left open at the end of a line. Markup regions
/// and comments are skipped.
fn check_quote_balance(lines: &[&str]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut state = LexState::Markup;

    for (n, line) in lines.iter().enumerate() {
        let bytes = line.as_bytes();
        let mut open_quote: Option<u8> = None;
        let mut i = 0;

        while i < bytes.len() {
            let rest = &line[i..];
            match state {
                LexState::Markup => {
                    if rest.starts_with(PHP_OPEN) {
                        state = LexState::Code;
                        i += PHP_OPEN.len();
                    } else if rest.starts_with(SHORT_ECHO_OPEN) {
                        state = LexState::Code;
                        i += SHORT_ECHO_OPEN.len();
                    } else {
                        i += 1;
                    }
                }
                LexState::BlockComment => {
                    if rest.starts_with("*/") {
                        state = LexState::Code;
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                LexState::Code => {
                    if let Some(quote) = open_quote {
                        if bytes[i] == b'\\' {
                            i += 2;
                            continue;
                        }
                        if bytes[i] == quote {
                            open_quote = None;
                        }
                        i += 1;
                        continue;
                    }
                    if rest.starts_with(PHP_CLOSE) {
                        state = LexState::Markup;
                        i += PHP_CLOSE.len();
                    } else if rest.starts_with("/*") {
                        state = LexState::BlockComment;
                        i += 2;
                    } else if rest.starts_with("//")
                        || (rest.starts_with('#') && !rest.starts_with("#["))
                    {
                        // A line comment still ends at `?>`.
                        match rest.find(PHP_CLOSE) {
                            Some(close) => {
                                state = LexState::Markup;
                                i += close + PHP_CLOSE.len();
                            }
                            None => break,
                        }
                    } else {
                        if bytes[i] == b'\'' || bytes[i] == b'"' {
                            open_quote = Some(bytes[i]);
                        }
                        i += 1;
                    }
                }
            }
        }

        if let Some(quote) = open_quote {
            let which = if quote == b'\'' { "single" } else { "double" };
            issues.push(
                ValidationIssue::new(IssueKind::Syntax, format!("Unbalanced {} quotes", which))
                    .at_line(n + 1)
                    .with_snippet(snippet(line)),
            );
        }
    }
    issues
}

// ─── Class shape ────────────────────────────────────────────────────────────

fn class_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bclass\s+[A-Za-z_][A-Za-z0-9_]*\s+extends\s+\\?Elementor\\Widget_Base\b")
            .unwrap()
    })
}

fn method_regexes() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        REQUIRED_METHODS
            .iter()
            .map(|name| {
                let pattern = format!(r"\bfunction\s+{}\s*\(", name);
                (Regex::new(&pattern).unwrap(), *name)
            })
            .collect()
    })
}

fn check_class_structure(source: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if !class_decl_regex().is_match(source) {
        issues.push(ValidationIssue::new(
            IssueKind::Structure,
            "No class extending \\Elementor\\Widget_Base",
        ));
    }
    for (re, name) in method_regexes() {
        if !re.is_match(source) {
            issues.push(ValidationIssue::new(
                IssueKind::Structure,
                format!("Missing required method {}()", name),
            ));
        }
    }
    issues
}
