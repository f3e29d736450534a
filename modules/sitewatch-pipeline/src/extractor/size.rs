use std::sync::LazyLock;

use regex::{Captures, Regex};
use sitewatch_common::MegawattFigure;

/// "1,200" or "1.5" or "300".
const NUMBER: &str = r"(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)";

static MW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b{NUMBER}\s*-?\s*(mw|megawatts?|gw|gigawatts?)\b")).expect("valid regex")
});
static SQFT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b{NUMBER}(\s*million)?\s*-?\s*(?:square[\s-]+f(?:oo|ee)t|sq\.?\s*ft)"
    ))
    .expect("valid regex")
});
static ACRES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\b{NUMBER}\s*-?\s*acres?\b")).expect("valid regex"));
static DOLLARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\$\s?{NUMBER}(?:\s*(billion|million|bn|b|m)\b)?")).expect("valid regex")
});

/// Anything above this is a misparse (a typo or a fleet-wide total).
const MAX_SITE_MW: f64 = 50_000.0;
/// Dollar figures below this are not capital budgets.
const MIN_PROJECT_DOLLARS: f64 = 1_000_000.0;

fn number(caps: &Captures<'_>) -> Option<f64> {
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

/// First positive stated power figure, in MW.
pub fn stated_mw(texts: &[&str]) -> Option<f64> {
    texts.iter().find_map(|text| {
        MW_RE.captures_iter(text).find_map(|caps| {
            let value = number(&caps)?;
            let unit = caps.get(2)?.as_str().to_lowercase();
            let mw = if unit.starts_with('g') { value * 1000.0 } else { value };
            (mw > 0.0 && mw <= MAX_SITE_MW).then_some(mw)
        })
    })
}

pub fn square_feet(texts: &[&str]) -> Option<f64> {
    texts.iter().find_map(|text| {
        SQFT_RE.captures_iter(text).find_map(|caps| {
            let value = number(&caps)?;
            let scale = if caps.get(2).is_some() { 1_000_000.0 } else { 1.0 };
            let sqft = value * scale;
            (sqft > 0.0).then_some(sqft)
        })
    })
}

pub fn acres(texts: &[&str]) -> Option<f64> {
    texts.iter().find_map(|text| {
        ACRES_RE
            .captures_iter(text)
            .find_map(|caps| number(&caps).filter(|a| *a > 0.0))
    })
}

/// First dollar amount large enough to be a project budget.
pub fn dollars(texts: &[&str]) -> Option<f64> {
    texts.iter().find_map(|text| {
        DOLLARS_RE.captures_iter(text).find_map(|caps| {
            let value = number(&caps)?;
            let scale = match caps.get(2).map(|m| m.as_str().to_lowercase()).as_deref() {
                Some("billion" | "bn" | "b") => 1e9,
                Some("million" | "m") => 1e6,
                _ => 1.0,
            };
            let amount = value * scale;
            (amount >= MIN_PROJECT_DOLLARS).then_some(amount)
        })
    })
}

/// A stated figure when there is one, otherwise a rough estimate from the
/// capital budget, tagged as such.
pub fn megawatts(texts: &[&str], dollars_per_mw: f64) -> Option<MegawattFigure> {
    if let Some(mw) = stated_mw(texts) {
        return Some(MegawattFigure::stated(mw));
    }
    let amount = dollars(texts)?;
    let estimate = (amount / dollars_per_mw * 10.0).round() / 10.0;
    (estimate > 0.0).then(|| MegawattFigure::estimated(estimate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stated_megawatts() {
        assert_eq!(stated_mw(&["...50 MW facility..."]), Some(50.0));
        assert_eq!(stated_mw(&["a 300-megawatt campus"]), Some(300.0));
        assert_eq!(stated_mw(&["up to 1.2 gigawatts"]), Some(1200.0));
        assert_eq!(stated_mw(&["0 MW so far", "then 20 MW"]), Some(20.0));
        assert_eq!(stated_mw(&["no figures"]), None);
    }

    #[test]
    fn area_figures() {
        assert_eq!(square_feet(&["a 250,000-square-foot building"]), Some(250_000.0));
        assert_eq!(square_feet(&["1.2 million square feet"]), Some(1_200_000.0));
        assert_eq!(square_feet(&["400,000 sq. ft."]), Some(400_000.0));
        assert_eq!(acres(&["on 1,400 acres"]), Some(1400.0));
        assert_eq!(acres(&["a 90-acre site"]), Some(90.0));
    }

    #[test]
    fn dollars_are_a_tagged_estimate() {
        let figure = megawatts(&["a $1.5 billion investment"], 10_000_000.0).unwrap();
        assert_eq!(figure.value, 150.0);
        assert!(figure.is_estimate());

        let figure = megawatts(&["a $1.5 billion, 200 MW campus"], 10_000_000.0).unwrap();
        assert_eq!(figure.value, 200.0);
        assert!(!figure.is_estimate());

        assert_eq!(megawatts(&["tickets cost $25"], 10_000_000.0), None);
    }
}
