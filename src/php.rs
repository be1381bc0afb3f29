//! PHP text helpers: string literals and a writer that tracks whether it
//! is emitting PHP code or literal markup.

use std::fmt::Write;

pub const PHP_OPEN: &str = "<?php";
pub const PHP_CLOSE: &str = "?>";

// ─── String literals ────────────────────────────────────────────────────────

pub fn escape_single_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Escape for a double-quoted literal. Newlines become `\n` escapes and
/// carriage returns are dropped.
pub fn escape_double_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

pub fn single_quoted(text: &str) -> String {
    format!("'{}'", escape_single_quoted(text))
}

pub fn double_quoted(text: &str) -> String {
    format!("\"{}\"", escape_double_quoted(text))
}

/// Single-quoted literal, or double-quoted when the text spans lines
/// (single quotes cannot express a `\n` escape).
pub fn php_string(text: &str) -> String {
    if text.contains('\n') || text.contains('\r') {
        double_quoted(text)
    } else {
        single_quoted(text)
    }
}

/// Decode the body of a PHP string literal delimited by `quote`.
pub fn unescape_literal(body: &str, quote: char) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match (quote, next) {
            (_, '\\') => out.push('\\'),
            ('\'', '\'') => out.push('\''),
            ('"', '"') => out.push('"'),
            ('"', '$') => out.push('$'),
            ('"', 'n') => out.push('\n'),
            ('"', 't') => out.push('\t'),
            ('"', 'r') => out.push('\r'),
            (_, other) => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

// ─── Mode-tracking writer ───────────────────────────────────────────────────

/// What the writer is currently emitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Php,
    Markup,
}

/// Builds a PHP routine that interleaves code and literal markup.
///
/// Every transition is written exactly once. Entering PHP right after a
/// `?>` (only whitespace in between) reopens nothing: the trailing `?>` is
/// removed instead, so the output never contains an empty exit/re-entry pair.
#[derive(Debug)]
pub struct PhpWriter {
    out: String,
    mode: Mode,
    indent: String,
}

impl PhpWriter {
    /// Starts in PHP mode. `indent` prefixes standalone `<?php` / `?>` lines.
    pub fn new(indent: &str) -> Self {
        Self {
            out: String::new(),
            mode: Mode::Php,
            indent: indent.to_string(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_indent(&mut self, indent: &str) {
        self.indent = indent.to_string();
    }

    /// One line of PHP code, written as given.
    pub fn line(&mut self, code: &str) {
        self.enter_php();
        self.out.push_str(code);
        self.out.push('\n');
    }

    pub fn blank_line(&mut self) {
        self.enter_php();
        self.out.push('\n');
    }

    /// Literal markup. Whitespace-only text never forces a mode switch.
    pub fn markup(&mut self, text: &str) {
        if text.is_empty() || (self.mode == Mode::Php && text.trim().is_empty()) {
            return;
        }
        self.exit_php();
        self.out.push_str(text);
    }

    /// `<?php code ?>` inside markup.
    pub fn inline(&mut self, code: &str) {
        self.exit_php();
        let _ = write!(self.out, "{} {} {}", PHP_OPEN, code, PHP_CLOSE);
    }

    pub fn enter_php(&mut self) {
        if self.mode == Mode::Php {
            return;
        }
        let content_end = self.out.trim_end().len();
        if self.out[..content_end].ends_with(PHP_CLOSE) {
            self.out.truncate(content_end - PHP_CLOSE.len());
            let kept = self.out.trim_end().len();
            self.out.truncate(kept);
            self.out.push('\n');
        } else {
            if !self.out.is_empty() && !self.out.ends_with('\n') {
                self.out.push('\n');
            }
            self.out.push_str(&self.indent);
            self.out.push_str(PHP_OPEN);
            self.out.push('\n');
        }
        self.mode = Mode::Php;
    }

    pub fn exit_php(&mut self) {
        if self.mode == Mode::Markup {
            return;
        }
        self.out.push_str(&self.indent);
        self.out.push_str(PHP_CLOSE);
        self.out.push('\n');
        self.mode = Mode::Markup;
    }

    /// Close any open markup region and return the routine body.
    pub fn finish(mut self) -> String {
        self.enter_php();
        self.out
    }
}
