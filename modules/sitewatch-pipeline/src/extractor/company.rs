use std::collections::BTreeMap;

use regex::Regex;
use sitewatch_common::text::{normalize_company, word_matcher};

struct Alias {
    canonical: String,
    alias: String,
    matcher: Regex,
}

/// Canonical company name → alias dictionary, matched on word boundaries.
pub struct CompanyMatcher {
    aliases: Vec<Alias>,
}

impl CompanyMatcher {
    pub fn new(companies: &BTreeMap<String, Vec<String>>) -> Result<Self, regex::Error> {
        let mut aliases = Vec::new();
        for (canonical, listed) in companies {
            let mut names: Vec<&str> = vec![canonical.as_str()];
            names.extend(listed.iter().map(String::as_str));
            names.sort_unstable();
            names.dedup();
            for name in names.into_iter().filter(|n| !n.trim().is_empty()) {
                aliases.push(Alias {
                    canonical: canonical.clone(),
                    alias: name.trim().to_string(),
                    matcher: word_matcher(name)?,
                });
            }
        }
        Ok(Self { aliases })
    }

    /// Earliest alias occurrence in `text`; a longer alias wins a tie so
    /// "Blue Owl Capital" beats "Blue Owl" at the same offset.
    pub fn find(&self, text: &str) -> Option<&str> {
        self.aliases
            .iter()
            .filter_map(|a| {
                let m = a.matcher.captures(text)?.get(1)?;
                Some((m.start(), std::cmp::Reverse(a.alias.len()), a))
            })
            .min_by_key(|(start, len, _)| (*start, *len))
            .map(|(_, _, a)| a.canonical.as_str())
    }

    /// Normalized alias keys, for rejecting locations that start with a
    /// company name ("Acme Taylor" is not a place).
    pub fn alias_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .aliases
            .iter()
            .map(|a| normalize_company(&a.alias))
            .filter(|k| !k.is_empty())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Surface forms of one company, used by project-name patterns.
    pub fn aliases_of(&self, canonical: &str) -> Vec<&str> {
        self.aliases
            .iter()
            .filter(|a| a.canonical == canonical)
            .map(|a| a.alias.as_str())
            .collect()
    }
}

/// URL path as words: `/news/acme-picks-taylor.html` → "news acme picks taylor".
pub(crate) fn url_slug(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme.split_once('/').map_or("", |(_, p)| p);
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let words: Vec<String> = path
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .flat_map(|w| w.split('.'))
        .filter(|w| !w.is_empty() && !matches!(*w, "html" | "htm" | "php" | "aspx"))
        .map(str::to_string)
        .collect();
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> CompanyMatcher {
        let mut companies = BTreeMap::new();
        companies.insert("Acme".to_string(), vec!["Acme Corp".to_string()]);
        companies.insert("Blue Owl".to_string(), vec!["Blue Owl Capital".to_string()]);
        companies.insert("NS".to_string(), vec![]);
        CompanyMatcher::new(&companies).unwrap()
    }

    #[test]
    fn earliest_match_wins() {
        let m = matcher();
        assert_eq!(m.find("Blue Owl partners with Acme"), Some("Blue Owl"));
        assert_eq!(m.find("Acme partners with Blue Owl Capital"), Some("Acme"));
        assert_eq!(m.find("nothing here"), None);
    }

    #[test]
    fn short_aliases_need_word_boundaries() {
        let m = matcher();
        assert_eq!(m.find("a new business park"), None);
        assert_eq!(m.find("NS will build"), Some("NS"));
    }

    #[test]
    fn slug_turns_path_into_words() {
        assert_eq!(
            url_slug("https://news.example.com/2025/acme-picks-taylor.html?ref=x"),
            "2025 acme picks taylor"
        );
        assert_eq!(url_slug("https://example.com"), "");
    }
}
