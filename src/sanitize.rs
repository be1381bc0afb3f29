use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Fragment-level markup plus the inline blocks lifted out of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizedMarkup {
    pub markup: String,
    /// Bodies of `<style>` blocks, in document order
    pub inline_styles: Vec<String>,
    /// Bodies of inline `<script>` blocks (no `src`), in document order
    pub inline_scripts: Vec<String>,
}

fn comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").unwrap())
}

fn style_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<style\b[^>]*>(.*?)</style\s*>").unwrap())
}

fn script_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").unwrap())
}

fn script_src_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bsrc\s*=").unwrap())
}

fn processing_instruction_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<\?[^>]*>").unwrap())
}

fn document_wrapper_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<!DOCTYPE[^>]*>|<head\b[^>]*>.*?</head\s*>|</?html\b[^>]*>|</?body\b[^>]*>",
        )
        .unwrap()
    })
}

/// Strip everything a widget must not emit: comments, doctype, the
/// `<html>`/`<head>`/`<body>` wrappers, and style/script blocks. Style and
/// inline script bodies are kept aside so the caller can embed them.
///
/// `<?...>` sequences are dropped up to the first `>`, which is where the
/// HTML tree builder ends them too. Any `<?` left after that is encoded as
/// `&lt;?`, so the markup copied into the render routine never opens a PHP
/// block of its own.
pub fn sanitize_markup(markup: &str) -> SanitizedMarkup {
    let without_comments = comment_regex().replace_all(markup, "");

    let mut inline_styles = Vec::new();
    let without_styles =
        style_block_regex().replace_all(&without_comments, |caps: &regex::Captures| {
            let body = caps[1].trim();
            if !body.is_empty() {
                inline_styles.push(body.to_string());
            }
            String::new()
        });

    let mut inline_scripts = Vec::new();
    let without_scripts =
        script_block_regex().replace_all(&without_styles, |caps: &regex::Captures| {
            let body = caps[2].trim();
            if !script_src_regex().is_match(&caps[1]) && !body.is_empty() {
                inline_scripts.push(body.to_string());
            }
            String::new()
        });

    let fragment = document_wrapper_regex().replace_all(&without_scripts, "");
    let without_instructions = processing_instruction_regex().replace_all(&fragment, "");
    let markup_out = without_instructions.replace("<?", "&lt;?").trim().to_string();

    debug!(
        removed_bytes = markup.len().saturating_sub(markup_out.len()),
        inline_styles = inline_styles.len(),
        inline_scripts = inline_scripts.len(),
        "sanitized markup"
    );

    SanitizedMarkup {
        markup: markup_out,
        inline_styles,
        inline_scripts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fragment_untouched() {
        let result = sanitize_markup(r#"<h1 class="title">Welcome</h1>"#);
        assert_eq!(result.markup, r#"<h1 class="title">Welcome</h1>"#);
        assert!(result.inline_styles.is_empty());
        assert!(result.inline_scripts.is_empty());
    }

    #[test]
    fn test_full_document_stripped() {
        let doc = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Landing</title>
  <style>.hero { color: red; }</style>
</head>
<body class="home">
  <!-- hero -->
  <section class="hero"><h1>Hi</h1></section>
  <script src="https://cdn.example.com/lib.js"></script>
  <script>console.log('ready');</script>
</body>
</html>"#;
        let result = sanitize_markup(doc);
        assert_eq!(result.markup, r#"<section class="hero"><h1>Hi</h1></section>"#);
        assert_eq!(result.inline_styles, vec![".hero { color: red; }"]);
        assert_eq!(result.inline_scripts, vec!["console.log('ready');"]);
    }

    #[test]
    fn test_php_open_tags_removed() {
        let result = sanitize_markup(r#"<p>Price: <?php echo 1; ?></p><span>ok</span>"#);
        assert_eq!(result.markup, "<p>Price: </p><span>ok</span>");

        let result = sanitize_markup("<p>a <?= $x ?> b</p>\n<?xml version=\"1.0\"?>");
        assert_eq!(result.markup, "<p>a  b</p>");
    }

    #[test]
    fn test_unterminated_php_open_is_encoded() {
        let result = sanitize_markup("<p>x</p><?php echo 1;");
        assert_eq!(result.markup, "<p>x</p>&lt;?php echo 1;");
        assert!(!result.markup.contains("<?"));
    }

    #[test]
    fn test_header_and_body_like_names_survive() {
        let result =
            sanitize_markup(r#"<header class="top"><p class="body-text">x</p></header>"#);
        assert_eq!(
            result.markup,
            r#"<header class="top"><p class="body-text">x</p></header>"#
        );
    }
}
