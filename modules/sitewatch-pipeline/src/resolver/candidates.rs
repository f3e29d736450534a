//! Rule-based location candidates from a project's texts, ranked by
//! specificity.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use sitewatch_common::config::NeighborhoodConfig;
use sitewatch_common::text::{is_county_name, normalize_place, squash_whitespace, word_matcher};
use sitewatch_common::{Project, Result, SitewatchError};

use crate::extractor::location::clean_location;

const STREET_SUFFIX: &str = r"(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Drive|Dr|Lane|Ln|Parkway|Pkwy|Highway|Hwy|Way|Court|Ct|Trail|Trl|Loop|Freeway|Fwy|Pike|Circle|Cir)";

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(\d{{2,6}}\s+(?:[NSEW]\.?\s+)?(?:[A-Z0-9][\w'-]*\s+){{0,4}}?{STREET_SUFFIX})\b\.?(?:,?\s+(?:in\s+)?([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*){{0,2}}))?"
    ))
    .expect("valid regex")
});
static COUNTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:\b((?:north|south|east|west)(?:ern)?|(?:north|south)(?:east|west)(?:ern)?|central)\s+)?\b((?:[A-Z][\w'-]*\s+){1,2})County\b")
        .expect("valid regex")
});

/// Capitalized words after an address that are not a city.
const NOT_CITIES: &[&str] = &[
    "The", "This", "That", "It", "In", "On", "At", "And", "Suite", "Ste", "Building", "Unit", "A",
];

/// Priority order, most specific first. Specificity beats confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CandidateKind {
    AddressWithCity,
    Address,
    Neighborhood,
    /// A named city or town.
    Place,
    County,
    /// Anything coarser.
    Area,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextCandidate {
    pub text: String,
    pub kind: CandidateKind,
    /// City context sent alongside the text to the geocoder.
    pub city: Option<String>,
    pub snippet: Option<String>,
}

pub struct CandidateRules {
    neighborhoods: Vec<(NeighborhoodConfig, Regex)>,
    state_names: Vec<String>,
}

impl CandidateRules {
    pub fn new(neighborhoods: &[NeighborhoodConfig], state_names: &[String]) -> Result<Self> {
        let neighborhoods = neighborhoods
            .iter()
            .map(|n| {
                word_matcher(&n.name)
                    .map(|re| (n.clone(), re))
                    .map_err(|e| SitewatchError::Config(format!("invalid neighborhood name {:?}: {e}", n.name)))
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            neighborhoods,
            state_names: state_names.to_vec(),
        })
    }

    /// Deduplicated candidates in priority order. `texts` are the project's
    /// article bodies and snippets.
    pub fn extract(&self, project: &Project, texts: &[&str]) -> Vec<TextCandidate> {
        let stated = project
            .location_text
            .as_deref()
            .and_then(|l| clean_location(l, &self.state_names));
        let stated_city = stated
            .as_deref()
            .filter(|l| !is_county_name(l) && !normalize_place(l, &self.state_names).is_empty());

        let mut out = Vec::new();
        for text in texts {
            self.addresses(text, stated_city, &mut out);
            self.neighborhoods(text, &mut out);
            self.counties(text, &mut out);
        }
        if let Some(stated) = stated {
            let key = normalize_place(&stated, &self.state_names);
            let kind = if key.is_empty() {
                CandidateKind::Area
            } else if is_county_name(&stated) {
                CandidateKind::County
            } else {
                CandidateKind::Place
            };
            out.push(TextCandidate {
                text: stated,
                kind,
                city: None,
                snippet: None,
            });
        }

        out.sort_by_key(|c| c.kind);
        let mut seen = HashSet::new();
        out.retain(|c| {
            let key = (normalize_place(&c.text, &self.state_names), c.city.as_deref().map(str::to_lowercase));
            seen.insert(key)
        });
        // A region-only candidate is no use once anything better exists.
        if out.len() > 1 {
            out.retain(|c| c.kind != CandidateKind::Area);
        }
        out
    }

    fn addresses(&self, text: &str, stated_city: Option<&str>, out: &mut Vec<TextCandidate>) {
        for caps in ADDRESS_RE.captures_iter(text) {
            let Some(address) = caps.get(1) else { continue };
            let city = caps
                .get(2)
                .map(|m| m.as_str())
                .and_then(|c| {
                    let first = c.split_whitespace().next()?;
                    (!NOT_CITIES.contains(&first)).then_some(c)
                })
                .and_then(|c| clean_location(c, &self.state_names));
            let (kind, city) = match city {
                Some(city) => (CandidateKind::AddressWithCity, Some(city)),
                None => (CandidateKind::Address, stated_city.map(str::to_string)),
            };
            out.push(TextCandidate {
                text: squash_whitespace(address.as_str()),
                kind,
                city,
                snippet: Some(snippet_around(text, address.start(), address.end())),
            });
        }
    }

    fn neighborhoods(&self, text: &str, out: &mut Vec<TextCandidate>) {
        for (hood, re) in &self.neighborhoods {
            if let Some(m) = re.captures(text).and_then(|c| c.get(1)) {
                out.push(TextCandidate {
                    text: hood.name.clone(),
                    kind: CandidateKind::Neighborhood,
                    city: Some(hood.city.clone()),
                    snippet: Some(snippet_around(text, m.start(), m.end())),
                });
            }
        }
    }

    fn counties(&self, text: &str, out: &mut Vec<TextCandidate>) {
        for caps in COUNTY_RE.captures_iter(text) {
            let Some(words) = caps.get(2) else { continue };
            let Some(name) = clean_location(&format!("{} County", words.as_str().trim()), &self.state_names) else {
                continue;
            };
            if !is_county_name(&name) {
                continue;
            }
            let whole = caps.get(0).map_or(words, |m| m);
            out.push(TextCandidate {
                text: name,
                kind: CandidateKind::County,
                city: None,
                snippet: Some(snippet_around(text, whole.start(), whole.end())),
            });
        }
    }
}

/// About 60 characters either side of a match, on char boundaries.
fn snippet_around(text: &str, start: usize, end: usize) -> String {
    const PAD: usize = 60;
    let mut from = start.saturating_sub(PAD);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + PAD).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    squash_whitespace(&text[from..to])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> CandidateRules {
        CandidateRules::new(
            &[NeighborhoodConfig {
                name: "Mueller".into(),
                city: "Austin".into(),
            }],
            &["Texas".into(), "TX".into()],
        )
        .unwrap()
    }

    fn project(location: Option<&str>) -> Project {
        let mut p = Project::new("m-1", 0);
        p.location_text = location.map(str::to_string);
        p
    }

    #[test]
    fn ranked_by_specificity() {
        let text = "The site at 1200 Main Street in Taylor sits in eastern Williamson County, \
                    not far from Mueller.";
        let found = rules().extract(&project(Some("Taylor")), &[text]);
        let kinds: Vec<CandidateKind> = found.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CandidateKind::AddressWithCity,
                CandidateKind::Neighborhood,
                CandidateKind::Place,
                CandidateKind::County,
            ]
        );
        assert_eq!(found[0].text, "1200 Main Street");
        assert_eq!(found[0].city.as_deref(), Some("Taylor"));
        assert_eq!(found[1].city.as_deref(), Some("Austin"));
        assert_eq!(found[3].text, "Williamson County");
    }

    #[test]
    fn bare_address_borrows_stated_city() {
        let found = rules().extract(&project(Some("Temple")), &["Plans list 4500 Industrial Blvd. The campus"]);
        assert_eq!(found[0].kind, CandidateKind::Address);
        assert_eq!(found[0].text, "4500 Industrial Blvd");
        assert_eq!(found[0].city.as_deref(), Some("Temple"));
    }

    #[test]
    fn county_location_is_a_county_candidate() {
        let found = rules().extract(&project(Some("Austin County")), &[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CandidateKind::County);
        assert_eq!(found[0].text, "Austin County");
    }

    #[test]
    fn duplicates_collapse_to_highest_priority() {
        let found = rules().extract(
            &project(Some("Hill County")),
            &["in Hill County", "northern Hill County officials"],
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CandidateKind::County);
    }

    #[test]
    fn vague_only_location_is_an_area_candidate() {
        let found = rules().extract(&project(Some("Texas")), &[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CandidateKind::Area);
        assert!(rules().extract(&project(None), &["no places"]).is_empty());
    }
}
