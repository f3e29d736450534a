use std::sync::LazyLock;

use regex::Regex;
use sitewatch_common::ProbabilityScore;

static HIGH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \bground[\s-]?breaking\b
        | \b(?:broke|breaks|break|breaking)\s+ground\b
        | \bpermits?\s+(?:(?:was|were|has\s+been|have\s+been)\s+)?(?:approved|granted|issued)\b
        | \b(?:approved|granted|issued)\s+(?:the\s+)?(?:building\s+|construction\s+|zoning\s+)?permits?\b
        | \bunder\s+construction\b
        | \bconstruction\s+(?:has\s+)?(?:began|begun|started|is\s+underway|underway)\b
        | \b(?:council|commission|commissioners|board)\s+(?:unanimously\s+)?approved\b
        ",
    )
    .expect("valid regex")
});

static MEDIUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \bplans?\s+to\s+(?:build|construct|develop|open)\b
        | \bannounced\s+plans\b
        | \bplanned\b
        | \bpropos(?:al|ed|es)\b
        | \bfiled\s+(?:plans|an?\s+application)\b
        | \bseeks?\s+(?:approval|incentives|rezoning)\b
        | \btax\s+abatement\b
        ",
    )
    .expect("valid regex")
});

static LOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \bexplor(?:ing|es)\b
        | \bconsider(?:ing|s)\b
        | \bno\s+(?:firm\s+|set\s+)?timeline\b
        | \b(?:early|preliminary)\s+stages?\b
        | \bmay\s+build\b
        | \brumou?red\b
        ",
    )
    .expect("valid regex")
});

/// First tier whose language appears anywhere in `texts` wins.
pub fn score(texts: &[&str]) -> ProbabilityScore {
    let tiers = [
        (&*HIGH_RE, ProbabilityScore::High),
        (&*MEDIUM_RE, ProbabilityScore::Medium),
        (&*LOW_RE, ProbabilityScore::Low),
    ];
    tiers
        .into_iter()
        .find(|(re, _)| texts.iter().any(|t| re.is_match(t)))
        .map(|(_, tier)| tier)
        .unwrap_or_default()
}
