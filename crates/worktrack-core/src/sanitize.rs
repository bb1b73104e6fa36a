use std::sync::LazyLock;

use regex::{Captures, Regex};

const ALLOWED_TAGS: &[&str] = &[
    "a", "b", "blockquote", "br", "code", "div", "em", "h1", "h2", "h3", "h4", "h5", "h6", "i",
    "li", "ol", "p", "pre", "s", "span", "strong", "u", "ul",
];

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</\s*script\s*>").expect("valid regex"));
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</\s*style\s*>").expect("valid regex"));
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9]*)([^>]*)>").expect("valid regex")
});
static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*("([^"]*)"|'([^']*)'|([^\s>]+))"#).expect("valid regex")
});

/// Reduce rich-text HTML (work item descriptions, PR comments) to a small
/// allowlist of formatting tags. Attributes are dropped except `href` on
/// links with an http(s) or mailto target.
pub fn sanitize_html(input: &str) -> String {
    let without_scripts = SCRIPT_BLOCK.replace_all(input, "");
    let without_styles = STYLE_BLOCK.replace_all(&without_scripts, "");
    let without_comments = COMMENT.replace_all(&without_styles, "");

    TAG.replace_all(&without_comments, |caps: &Captures| {
        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            return String::new();
        }
        if closing {
            return format!("</{name}>");
        }
        if name == "a" {
            if let Some(href) = safe_href(&caps[3]) {
                return format!("<a href=\"{href}\" rel=\"noopener noreferrer\">");
            }
        }
        format!("<{name}>")
    })
    .into_owned()
}

fn safe_href(attrs: &str) -> Option<String> {
    let caps = HREF.captures(attrs)?;
    let raw = caps
        .get(2)
        .or_else(|| caps.get(3))
        .or_else(|| caps.get(4))?
        .as_str()
        .trim();
    let lower = raw.to_ascii_lowercase();
    let allowed = ["http://", "https://", "mailto:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme));
    allowed.then(|| raw.replace('"', "&quot;"))
}

/// Plain text for the terminal: tags removed, common entities decoded.
pub fn html_to_text(input: &str) -> String {
    let cleaned = sanitize_html(input);
    let text = TAG.replace_all(&cleaned, |caps: &Captures| {
        match caps[2].to_ascii_lowercase().as_str() {
            "br" | "p" | "div" | "li" if caps[1].is_empty() => "\n".to_string(),
            _ => String::new(),
        }
    });
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
