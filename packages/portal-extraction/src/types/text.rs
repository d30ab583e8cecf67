//! Text helpers shared by passes and fingerprinting.

use regex::Regex;
use std::sync::OnceLock;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b[A-Z0-9._%+\-]+@[A-Z0-9.\-]+\.[A-Z]{2,}\b").unwrap()
    })
}

/// Every email address in text, lower-cased, first occurrence order, no repeats.
pub fn extract_emails(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    email_pattern()
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

/// Strip a `mailto:` prefix and any query string.
pub fn email_from_mailto(href: &str) -> Option<String> {
    let rest = href.trim().strip_prefix("mailto:").unwrap_or(href.trim());
    let addr = rest.split('?').next().unwrap_or_default();
    extract_emails(addr).into_iter().next()
}

struct HtmlPatterns {
    script: Regex,
    style: Regex,
    comment: Regex,
    tag: Regex,
}

fn html_patterns() -> &'static HtmlPatterns {
    static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HtmlPatterns {
        script: Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap(),
        style: Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap(),
        comment: Regex::new(r"(?s)<!--.*?-->").unwrap(),
        tag: Regex::new(r"<[^>]+>").unwrap(),
    })
}

/// Visible text of an HTML document with whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let p = html_patterns();
    let text = p.script.replace_all(html, " ");
    let text = p.style.replace_all(&text, " ");
    let text = p.comment.replace_all(&text, " ");
    let text = p.tag.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#39;", "'")
        .replace("&quot;", "\"");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_emails_dedups_and_lowercases() {
        let emails = extract_emails(
            "Sent to JSmith@MIT.edu and alee@stanford.edu. Copy: jsmith@mit.edu.",
        );
        assert_eq!(emails, vec!["jsmith@mit.edu", "alee@stanford.edu"]);
    }

    #[test]
    fn test_email_from_mailto() {
        assert_eq!(
            email_from_mailto("mailto:Anna.Lee@stanford.edu?subject=Review"),
            Some("anna.lee@stanford.edu".to_string())
        );
        assert_eq!(email_from_mailto("javascript:void(0)"), None);
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><script>var x = 1;</script><style>p{}</style></head>\
                    <body><p>Hello&nbsp;<b>world</b></p><!-- hidden --></body></html>";
        assert_eq!(html_to_text(html), "Hello world");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
