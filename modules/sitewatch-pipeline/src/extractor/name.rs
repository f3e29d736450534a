use std::sync::LazyLock;

use regex::Regex;
use sitewatch_common::text::squash_whitespace;

static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[\"\u{201C}]([^\"\u{201C}\u{201D}\\n]{3,80})[\"\u{201D}]").expect("valid regex")
});
static CODENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bProject\s+([A-Z][a-z]+)\b").expect("valid regex"));

/// Words that follow "Project" without being a codename.
const NOT_CODENAMES: &[&str] = &[
    "Could", "Would", "Will", "May", "Might", "Is", "Was", "Has", "Had", "In", "At", "For", "To",
    "The", "Near", "And", "Details", "Manager", "Update", "Updates", "Site", "Timeline", "Cost",
    "Costs", "Name", "Overview", "Information", "Approved", "Plans",
];

const LINKING_WORDS: &[&str] = &["of", "the", "at", "and", "in", "on", "for", "a", "de"];

/// Quoted text that reads like a proper name rather than speech: short and
/// title-cased.
fn looks_like_name(candidate: &str) -> bool {
    let words: Vec<&str> = candidate.split_whitespace().collect();
    if words.is_empty() || words.len() > 8 {
        return false;
    }
    if !words[0].chars().next().is_some_and(char::is_uppercase) {
        return false;
    }
    if candidate.ends_with(['.', ',', '!', '?']) {
        return false;
    }
    let content: Vec<&&str> = words
        .iter()
        .filter(|w| !LINKING_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    let capitalized = content
        .iter()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase() || c.is_ascii_digit()))
        .count();
    capitalized * 10 >= content.len() * 8
}

pub fn quoted_name(texts: &[&str]) -> Option<String> {
    texts.iter().find_map(|text| {
        QUOTED_RE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| squash_whitespace(m.as_str()))
            .find(|c| looks_like_name(c))
    })
}

/// "Project Jupiter" style codenames.
pub fn codename(texts: &[&str]) -> Option<String> {
    texts.iter().find_map(|text| {
        CODENAME_RE
            .captures_iter(text)
            .find(|caps| caps.get(1).is_some_and(|w| !NOT_CODENAMES.contains(&w.as_str())))
            .and_then(|caps| caps.get(0))
            .map(|m| m.as_str().to_string())
    })
}

/// "<alias> [words] Data Center|Campus|Project|Facility|Hub" for the
/// already-detected company.
pub struct CompanyIdentifiers {
    patterns: Vec<Regex>,
}

impl CompanyIdentifiers {
    pub fn new(aliases: &[&str]) -> Result<Self, regex::Error> {
        let mut aliases: Vec<&str> = aliases.to_vec();
        aliases.sort_by_key(|a| std::cmp::Reverse(a.len()));
        let patterns = aliases
            .iter()
            .map(|alias| {
                Regex::new(&format!(
                    r"(?:^|[^\w])((?i:{})(?:\s+[A-Z0-9][\w'-]*){{0,3}}?\s+(?i:data\s+cent(?:er|re)|campus|project|facility|hub))\b",
                    regex::escape(alias)
                ))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    pub fn find(&self, texts: &[&str]) -> Option<String> {
        texts.iter().find_map(|text| {
            self.patterns
                .iter()
                .find_map(|re| re.captures(text)?.get(1))
                .map(|m| squash_whitespace(m.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_names_must_look_like_names() {
        assert_eq!(
            quoted_name(&["the campus, dubbed \u{201C}Lone Star Campus\u{201D}, will"]).as_deref(),
            Some("Lone Star Campus")
        );
        assert_eq!(quoted_name(&["\"We are excited to be here,\" the CEO said"]), None);
        assert_eq!(quoted_name(&["\"Project Jupiter\" was approved"]).as_deref(), Some("Project Jupiter"));
    }

    #[test]
    fn codenames() {
        assert_eq!(codename(&["known as Project Jupiter in filings"]).as_deref(), Some("Project Jupiter"));
        assert_eq!(codename(&["Project Could Bring Jobs"]), None);
    }

    #[test]
    fn company_identifiers() {
        let ids = CompanyIdentifiers::new(&["Acme", "Acme Corp"]).unwrap();
        assert_eq!(
            ids.find(&["Acme Data Center breaks ground in Taylor, Texas"]).as_deref(),
            Some("Acme Data Center")
        );
        assert_eq!(
            ids.find(&["plans for the Acme Taylor Campus were filed"]).as_deref(),
            Some("Acme Taylor Campus")
        );
        assert_eq!(ids.find(&["Acme announced earnings"]), None);
    }
}
