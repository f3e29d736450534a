// HTML → text. Semantic article containers first, whole body as fallback.

use std::sync::LazyLock;

use regex::Regex;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

static ARTICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<article\b[^>]*>(.*?)</article>").expect("valid regex"));
static MAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<main\b[^>]*>(.*?)</main>").expect("valid regex"));
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));

/// Containers shorter than this (in visible characters) are probably teaser
/// cards, not the story.
const MIN_CONTAINER_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Container {
    Article,
    Main,
    Body,
}

/// Pick the richest semantic container. Returns the inner HTML and which
/// container it came from.
pub(crate) fn select_container(html: &str) -> (Container, &str) {
    for (kind, re) in [(Container::Article, &*ARTICLE_RE), (Container::Main, &*MAIN_RE)] {
        let best = re
            .captures_iter(html)
            .filter_map(|c| c.get(1))
            .max_by_key(|m| visible_len(m.as_str()));
        if let Some(m) = best {
            if visible_len(m.as_str()) >= MIN_CONTAINER_CHARS {
                return (kind, m.as_str());
            }
        }
    }

    match BODY_RE.captures(html).and_then(|c| c.get(1)) {
        Some(body) => (Container::Body, body.as_str()),
        None => (Container::Body, html),
    }
}

fn visible_len(fragment: &str) -> usize {
    TAG_RE
        .replace_all(fragment, " ")
        .split_whitespace()
        .map(|w| w.len() + 1)
        .sum()
}

/// Convert an article page into plain readable text.
pub fn extract_article_text(html: &str, url: Option<&str>) -> String {
    let (container, fragment) = select_container(html);
    // Readability scoring only helps on the whole body; on a selected
    // container it tends to drop short paragraphs.
    let whole_page = container == Container::Body;

    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: whole_page,
        main_content: whole_page,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: fragment.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(words: usize) -> String {
        format!("<p>{}</p>", "construction crews arrived today ".repeat(words))
    }

    #[test]
    fn prefers_article_over_body() {
        let html = format!(
            "<html><body><nav>Menu</nav><article>{}</article><footer>x</footer></body></html>",
            paragraph(20)
        );
        let (kind, fragment) = select_container(&html);
        assert_eq!(kind, Container::Article);
        assert!(!fragment.contains("Menu"));
    }

    #[test]
    fn picks_longest_article() {
        let html = format!(
            "<body><article><p>Related story</p></article><article>{}</article></body>",
            paragraph(20)
        );
        let (kind, fragment) = select_container(&html);
        assert_eq!(kind, Container::Article);
        assert!(fragment.contains("construction crews"));
    }

    #[test]
    fn short_article_falls_back_to_main() {
        let html = format!(
            "<body><article><p>teaser</p></article><main>{}</main></body>",
            paragraph(20)
        );
        assert_eq!(select_container(&html).0, Container::Main);
    }

    #[test]
    fn falls_back_to_body_then_whole_document() {
        let (kind, fragment) = select_container("<html><body><p>hello</p></body></html>");
        assert_eq!(kind, Container::Body);
        assert_eq!(fragment, "<p>hello</p>");

        let (kind, fragment) = select_container("<p>no body tag</p>");
        assert_eq!(kind, Container::Body);
        assert_eq!(fragment, "<p>no body tag</p>");
    }
}
