//! Location phrases from free text.
//!
//! Pattern families are tried in order against each text; every raw capture
//! goes through the same cleanup and stoplist before it is accepted.

use std::sync::LazyLock;

use regex::Regex;
use sitewatch_common::text::{normalize_company, normalize_place, squash_whitespace, DIRECTIONS};

/// Up to four capitalized words.
const PLACE: &str = r"[A-Z][\w.'-]*(?:\s+[A-Z][\w.'-]*){0,3}";

static COUNTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:[A-Z][\w.'-]*\s+){1,4})(County|Parish)\b").expect("valid regex")
});
static CITY_OF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(?i:city|town|village) of ({PLACE})")).expect("valid regex")
});
static PREPOSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(?i:in|near|outside(?:\s+of)?)\s+({PLACE})")).expect("valid regex")
});
static AREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][\w.'-]*(?:[\s-]+[A-Z][\w.'-]*){0,2})\s+(?:area|region|metro)\b")
        .expect("valid regex")
});

/// Leading tokens that are never part of a place name.
const LEADING_NOISE: &[&str] = &[
    "in", "near", "at", "to", "the", "a", "an", "of", "outside", "from", "and",
];

/// A token that ends the place name: everything from here on is dropped.
const TERMINATORS: &[&str] = &[
    "as", "for", "to", "with", "and", "on", "by", "after", "before", "amid", "over", "from",
    "that", "which", "where", "will", "would", "could", "is", "was", "has", "have", "plans",
    "data", "center", "centre", "campus", "facility", "facilities", "project", "site", "plant",
    "development", "expansion", "hub", "this", "next", "last", "announces", "announced",
    "breaks", "gets", "wins", "approves", "approved",
];

/// A lone token like these is not a place.
const GENERIC_NOUNS: &[&str] = &[
    "center", "billion", "million", "data", "campus", "facility", "project", "plant", "site",
    "county", "city", "state", "region", "area", "phase", "company", "headquarters", "us", "u.s",
    "u.s.", "america", "united states", "north america", "downtown",
];

const POSSESSIVE_PREFIXES: &[&str] = &["its", "their", "our", "his", "her", "my", "your"];

const CALENDAR_WORDS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "monday", "tuesday", "wednesday", "thursday", "friday",
    "saturday", "sunday", "q1", "q2", "q3", "q4",
];

/// First words of multi-word county names; any other word before "County"
/// is not part of the name.
const COUNTY_NAME_LEADS: &[&str] = &[
    "fort", "san", "santa", "el", "la", "las", "los", "van", "de", "st", "st.", "saint", "new",
    "palo", "jim", "live", "red", "deaf", "jeff", "tom", "glass", "king",
];

pub struct LocationRules {
    families: Vec<Family>,
    state_names: Vec<String>,
    company_keys: Vec<String>,
}

struct Family {
    regex: Regex,
    county: bool,
}

impl LocationRules {
    pub fn new(state_names: &[String], company_keys: Vec<String>) -> Result<Self, regex::Error> {
        let mut families = Vec::new();

        let states: Vec<String> = state_names
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| regex::escape(s.trim()))
            .collect();
        if !states.is_empty() {
            let states = states.join("|");
            // "in Taylor, Texas"
            families.push(Family {
                regex: Regex::new(&format!(
                    r"\b(?i:in|near|outside(?:\s+of)?|at|to)\s+((?:[A-Z][\w.'-]*\s+){{0,3}}?[A-Z][\w.'-]*),\s*(?:{states})\b"
                ))?,
                county: false,
            });
            // Dateline: "TAYLOR, Texas —"
            families.push(Family {
                regex: Regex::new(&format!(r"^\s*([A-Z][A-Z.' -]{{1,40}}?),\s*(?:{states})\b"))?,
                county: false,
            });
        }
        families.push(Family {
            regex: COUNTY_RE.clone(),
            county: true,
        });
        families.push(Family {
            regex: CITY_OF_RE.clone(),
            county: false,
        });
        families.push(Family {
            regex: PREPOSITION_RE.clone(),
            county: false,
        });
        families.push(Family {
            regex: AREA_RE.clone(),
            county: false,
        });

        Ok(Self {
            families,
            state_names: state_names.to_vec(),
            company_keys,
        })
    }

    /// First accepted location in `texts`, which are in trust order.
    pub fn find<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> Option<String> {
        texts.into_iter().find_map(|text| self.find_in(text))
    }

    fn find_in(&self, text: &str) -> Option<String> {
        for family in &self.families {
            for caps in family.regex.captures_iter(text) {
                let raw = if family.county {
                    county_phrase(caps.get(1)?.as_str(), caps.get(2)?.as_str())
                } else {
                    caps.get(1)?.as_str().to_string()
                };
                if let Some(location) = self.accept(&raw) {
                    return Some(location);
                }
            }
        }
        None
    }

    /// Cleanup plus stoplist. `None` means the capture is not a place.
    pub(crate) fn accept(&self, raw: &str) -> Option<String> {
        let cleaned = clean_location(raw, &self.state_names)?;
        let lower = cleaned.to_lowercase();
        let tokens: Vec<&str> = cleaned.split(' ').collect();

        if tokens.len() == 1 && cleaned.chars().next().is_some_and(char::is_lowercase) {
            return None;
        }
        if GENERIC_NOUNS.contains(&lower.as_str()) {
            return None;
        }
        if POSSESSIVE_PREFIXES.contains(&tokens[0].to_lowercase().as_str()) {
            return None;
        }
        if tokens
            .iter()
            .any(|t| CALENDAR_WORDS.contains(&t.to_lowercase().trim_end_matches('.')))
        {
            return None;
        }
        if cleaned.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        let key = normalize_company(&cleaned);
        if self
            .company_keys
            .iter()
            .any(|company| key == *company || key.starts_with(&format!("{company} ")))
        {
            return None;
        }
        Some(cleaned)
    }

    pub fn state_names(&self) -> &[String] {
        &self.state_names
    }
}

/// Keep only the words that belong to the county name: one word, or two
/// when the first is a known multi-word lead ("Fort Bend", "San Patricio").
fn county_phrase(words: &str, suffix: &str) -> String {
    let tokens: Vec<&str> = words.split_whitespace().collect();
    let take = match tokens.as_slice() {
        [.., lead, _] if COUNTY_NAME_LEADS.contains(&lead.to_lowercase().as_str()) => 2,
        _ => 1,
    };
    let start = tokens.len().saturating_sub(take);
    format!("{} {suffix}", tokens[start..].join(" "))
}

/// Strip articles, prepositions, directions, possessive endings and trailing
/// non-location words. County suffixes are never stripped.
pub(crate) fn clean_location(raw: &str, state_names: &[String]) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || ",.;:!?\"'()".contains(c));
    let squashed = squash_whitespace(trimmed);
    let mut tokens: Vec<&str> = squashed.split(' ').filter(|t| !t.is_empty()).collect();

    while let Some(first) = tokens.first() {
        let lower = first.to_lowercase();
        if LEADING_NOISE.contains(&lower.as_str()) || DIRECTIONS.contains(&lower.as_str()) {
            tokens.remove(0);
        } else {
            break;
        }
    }

    if let Some(cut) = tokens
        .iter()
        .position(|t| TERMINATORS.contains(&t.to_lowercase().as_str()))
    {
        tokens.truncate(cut);
    }

    let state_keys: Vec<String> = state_names.iter().map(|s| s.to_lowercase()).collect();
    while tokens.len() > 1 {
        let last = tokens[tokens.len() - 1].to_lowercase();
        if DIRECTIONS.contains(&last.as_str()) || state_keys.contains(&last) {
            tokens.pop();
        } else {
            break;
        }
    }

    let mut cleaned = tokens.join(" ");
    for suffix in ["'s", "\u{2019}s"] {
        if let Some(stripped) = cleaned.strip_suffix(suffix) {
            cleaned = stripped.to_string();
        }
    }
    let cleaned = cleaned.trim_matches(|c: char| ",.;:-".contains(c));
    let cleaned = cleaned
        .split(' ')
        .map(uncap_shouting)
        .collect::<Vec<_>>()
        .join(" ");

    (!cleaned.is_empty()).then_some(cleaned)
}

/// Datelines shout: "ROUND ROCK" → "Round Rock". Short tokens ("TX") are
/// left alone.
fn uncap_shouting(token: &str) -> String {
    let letters = token.chars().filter(|c| c.is_alphabetic()).count();
    if letters <= 2 || token.chars().any(char::is_lowercase) {
        return token.to_string();
    }
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// A location that only names the region ("Texas") carries no placement.
pub fn is_vague(location: &str, state_names: &[String]) -> bool {
    normalize_place(location, state_names).is_empty()
}

// --- Site hints ---

static PARK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b((?:[A-Z][\w'-]*\s+){1,4}(?:Industrial|Business|Technology|Tech|Research|Commerce|Logistics)\s+(?:Park|Center|Campus|District))\b",
    )
    .expect("valid regex")
});
static HIGHWAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:near|along|off(?:\s+of)?|at)\s+((?:interstate|state\s+highway|highway|u\.?s\.?\s+highway|farm[\s-]to[\s-]market\s+road|fm|sh|loop)\s*-?\s*\d+[a-z]?|i-\d+)\b",
    )
    .expect("valid regex")
});
static FORMER_SITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[Ff]ormer\s+((?:[A-Z][\w'-]*\s+){1,4}(?:site|plant|facility|mill|campus|refinery))\b")
        .expect("valid regex")
});

/// A named facility site (industrial park, highway frontage, former plant).
/// A project at one can legitimately sit far from its city's centroid.
pub fn find_site_hint<'a>(texts: impl IntoIterator<Item = &'a str>) -> Option<String> {
    texts.into_iter().find_map(|text| {
        [&*PARK_RE, &*HIGHWAY_RE, &*FORMER_SITE_RE]
            .iter()
            .find_map(|re| re.captures(text)?.get(1))
            .map(|m| {
                let hint = squash_whitespace(m.as_str());
                hint.strip_prefix("The ").map(str::to_string).unwrap_or(hint)
            })
    })
}
