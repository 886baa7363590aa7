use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn href_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"(?i)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).ok()
        })
        .as_ref()
}

/// `href` values of anchors, in document order, without duplicates and
/// without fragment-only or `javascript:` links.
pub fn extract_links(html: &str) -> Vec<String> {
    let Some(pattern) = href_pattern() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    pattern
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().trim().replace("&amp;", "&"))
        .filter(|href| {
            !href.is_empty()
                && !href.starts_with('#')
                && !href.to_ascii_lowercase().starts_with("javascript:")
        })
        .filter(|href| seen.insert(href.clone()))
        .collect()
}

/// Copied page text followed by its links, as handed to the model.
pub fn scraped_text(text: &str, links: &[String]) -> String {
    if links.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + links.len() * 32);
    out.push_str(text);
    out.push_str("\n\nLinks:\n");
    for link in links {
        out.push_str("- ");
        out.push_str(link);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_quoted_and_bare_hrefs() {
        let html = r##"<p><a href="https://a.example/x?y=1&amp;z=2">A</a>
            <A class='c' HREF='/relative'>B</A> <a href=bare.html>C</a>
            <a href="#top">Top</a> <a href="javascript:void(0)">J</a>
            <a href="https://a.example/x?y=1&amp;z=2">again</a>
            <link href="style.css"></p>"##;
        assert_eq!(
            extract_links(html),
            vec![
                "https://a.example/x?y=1&z=2".to_string(),
                "/relative".to_string(),
                "bare.html".to_string(),
            ]
        );
    }

    #[test]
    fn scraped_text_lists_links() {
        let links = vec!["https://a.example".to_string()];
        assert_eq!(
            scraped_text("Hello", &links),
            "Hello\n\nLinks:\n- https://a.example\n"
        );
        assert_eq!(scraped_text("Hello", &[]), "Hello");
    }
}
