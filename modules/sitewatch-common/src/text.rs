//! Text normalization shared by extraction, canonicalization and validation.
//!
//! Everything here is pure and allocation-light; the same input always
//! normalizes to the same key.

use regex::Regex;

pub const DIRECTIONS: &[&str] = &[
    "north",
    "south",
    "east",
    "west",
    "northern",
    "southern",
    "eastern",
    "western",
    "northeast",
    "northwest",
    "southeast",
    "southwest",
    "northeastern",
    "northwestern",
    "southeastern",
    "southwestern",
    "central",
];

const CORPORATE_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "llc",
    "corp",
    "corporation",
    "co",
    "company",
    "ltd",
    "lp",
    "plc",
    "holdings",
];

const AREA_WORDS: &[&str] = &["area", "region", "metro", "vicinity"];

const PLACE_PREFIXES: &[&str] = &["the", "city of", "town of", "village of"];

/// Lowercase, punctuation to spaces, collapsed whitespace.
fn fold(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c.to_ascii_lowercase()
            } else if c == '\'' || c == '\u{2019}' {
                '\0'
            } else {
                ' '
            }
        })
        .filter(|c| *c != '\0')
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Company key: case, punctuation and corporate suffixes removed.
pub fn normalize_company(name: &str) -> String {
    fold(name)
        .split(' ')
        .filter(|t| !t.is_empty() && !CORPORATE_SUFFIXES.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Place key: "Taylor, Texas" and "north Taylor area" both become "taylor".
/// County suffixes are kept. A place that is nothing but the region's state
/// name normalizes to the empty string.
pub fn normalize_place(text: &str, state_names: &[String]) -> String {
    let mut folded = format!(" {} ", fold(text));

    for state in state_names {
        let state = fold(state);
        if state.is_empty() {
            continue;
        }
        let needle = format!(" {state} ");
        while folded.contains(&needle) {
            folded = folded.replace(&needle, " ");
        }
    }

    let mut tokens: Vec<&str> = folded.split_whitespace().collect();

    loop {
        let joined = tokens.join(" ");
        let Some(prefix) = PLACE_PREFIXES
            .iter()
            .find(|p| joined.starts_with(&format!("{p} ")))
        else {
            break;
        };
        let n = prefix.split(' ').count();
        tokens.drain(..n);
    }

    tokens
        .into_iter()
        .filter(|t| !DIRECTIONS.contains(t) && !AREA_WORDS.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_county_name(text: &str) -> bool {
    fold(text).split(' ').any(|t| t == "county" || t == "parish")
}

/// Whole-word containment on already-normalized strings.
pub fn phrase_contains(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

/// Case-insensitive matcher for `term` that only fires on word boundaries.
///
/// Uses explicit non-word guards instead of `\b` so aliases that end in
/// punctuation ("X.AI", "AT&T") still anchor correctly. The term itself is
/// capture group 1.
pub fn word_matcher(term: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?i)(?:^|[^\w])({})(?:$|[^\w])",
        regex::escape(term.trim())
    ))
}

/// Collapse runs of whitespace and trim.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texas() -> Vec<String> {
        vec!["Texas".into(), "TX".into()]
    }

    #[test]
    fn company_suffixes_are_dropped() {
        assert_eq!(normalize_company("Acme Corp."), "acme");
        assert_eq!(normalize_company("ACME, Inc"), "acme");
        assert_eq!(normalize_company("Blue Owl Capital"), "blue owl capital");
    }

    #[test]
    fn place_normalization() {
        assert_eq!(normalize_place("Taylor, Texas", &texas()), "taylor");
        assert_eq!(normalize_place("north Taylor area", &texas()), "taylor");
        assert_eq!(normalize_place("the City of Round Rock", &texas()), "round rock");
        assert_eq!(normalize_place("Hill County", &texas()), "hill county");
        assert_eq!(normalize_place("Texas", &texas()), "");
    }

    #[test]
    fn county_detection() {
        assert!(is_county_name("Austin County"));
        assert!(!is_county_name("Austin"));
        assert!(!is_county_name("Countyline"));
    }

    #[test]
    fn phrases_match_whole_words() {
        assert!(phrase_contains("round rock", "rock"));
        assert!(!phrase_contains("rockdale", "rock"));
        assert!(!phrase_contains("taylor", ""));
    }

    #[test]
    fn word_matcher_skips_partial_hits() {
        let ns = word_matcher("NS").unwrap();
        assert!(!ns.is_match("a business park"));
        assert!(ns.is_match("NS announced"));
        assert!(ns.is_match("deal with ns."));

        let xai = word_matcher("X.AI").unwrap();
        assert!(xai.is_match("Musk's X.AI, based"));
    }
}
