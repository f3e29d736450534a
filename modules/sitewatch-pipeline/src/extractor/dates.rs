use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};

/// A point in time: optional qualifier, optional month, four-digit year.
const WHEN: &str = r"(?:(?P<qual>early|mid-?|late|(?:the\s+)?end\s+of|(?:the\s+)?(?:first|second)\s+half\s+of|(?:the\s+)?(?:first|second|third|fourth)\s+quarter\s+of|q[1-4])\s*)?(?:(?P<month>january|february|march|april|may|june|july|august|september|october|november|december)\s+)?(?P<year>20\d{2})\b";

static COMPLETION_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:expected|slated|scheduled|set|planned|anticipated|projected|targeted|poised|on\s+track)\s+to\s+(?:be\s+)?(?:completed?|open|finish(?:ed)?|begin\s+operations|be\s+operational|operational|come\s+online|go\s+live|online|start\s+operating)\s+(?:in|by|during)\s+",
        r"(?:completion|opening|operations|commercial\s+operation|first\s+phase)\s+(?:is\s+|are\s+)?(?:expected|slated|scheduled|planned|anticipated|targeted)\s+(?:in|by|for|during)\s+",
        r"(?:operational|online|completed|complete|finished)\s+by\s+",
        r"(?:open|opening|completion|launch)\s+in\s+",
    ]
    .iter()
    .map(|trigger| Regex::new(&format!("(?i){trigger}{WHEN}")).expect("valid regex"))
    .collect()
});

/// Completion-date phrasing with a year inside the sane window.
pub struct CompletionDates {
    first_year: i32,
    last_year: i32,
}

impl CompletionDates {
    /// Accept `today.year()` through `today.year() + window_years`.
    pub fn new(today: NaiveDate, window_years: i32) -> Self {
        Self {
            first_year: today.year(),
            last_year: today.year() + window_years,
        }
    }

    pub fn find(&self, texts: &[&str]) -> Option<NaiveDate> {
        texts.iter().find_map(|text| {
            COMPLETION_RES
                .iter()
                .flat_map(|re| re.captures_iter(text))
                .find_map(|caps| self.parse(&caps))
        })
    }

    fn parse(&self, caps: &Captures<'_>) -> Option<NaiveDate> {
        let year: i32 = caps.name("year")?.as_str().parse().ok()?;
        if year < self.first_year || year > self.last_year {
            return None;
        }
        let month = match caps.name("month") {
            Some(m) => month_number(m.as_str())?,
            None => qualifier_month(caps.name("qual").map(|q| q.as_str())),
        };
        end_of_month(year, month)
    }
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "october", "november", "december",
    ];
    let name = name.to_lowercase();
    MONTHS.iter().position(|m| *m == name).map(|i| i as u32 + 1)
}

/// Vague qualifiers resolve to the end of the period they name; no
/// qualifier means "by the end of the year".
fn qualifier_month(qualifier: Option<&str>) -> u32 {
    let Some(q) = qualifier.map(|q| q.to_lowercase()) else {
        return 12;
    };
    let q = q.split_whitespace().collect::<Vec<_>>().join(" ");
    let q = q.strip_prefix("the ").unwrap_or(&q);
    match q {
        "early" | "q1" | "first quarter of" => 3,
        "mid" | "mid-" | "first half of" | "q2" | "second quarter of" => 6,
        "q3" | "third quarter of" => 9,
        _ => 12,
    }
}

fn end_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> CompletionDates {
        CompletionDates::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), 6)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn phrasings() {
        let r = rules();
        assert_eq!(r.find(&["The campus is expected to be completed in 2027."]), Some(ymd(2027, 12, 31)));
        assert_eq!(r.find(&["slated to open in late 2026"]), Some(ymd(2026, 12, 31)));
        assert_eq!(r.find(&["Completion is expected by mid-2028"]), Some(ymd(2028, 6, 30)));
        assert_eq!(r.find(&["operational by March 2027"]), Some(ymd(2027, 3, 31)));
        assert_eq!(r.find(&["opening in the first quarter of 2026"]), Some(ymd(2026, 3, 31)));
        assert_eq!(r.find(&["slated to open in February 2028"]), Some(ymd(2028, 2, 29)));
    }

    #[test]
    fn years_outside_window_are_rejected() {
        let r = rules();
        assert_eq!(r.find(&["expected to be completed in 2019"]), None);
        assert_eq!(r.find(&["expected to be completed in 2040"]), None);
        assert_eq!(
            r.find(&["expected to open in 2040, first phase is planned for 2027"]),
            Some(ymd(2027, 12, 31))
        );
    }

    #[test]
    fn bare_years_are_not_completion_dates() {
        assert_eq!(rules().find(&["Founded in 2026 by engineers"]), None);
    }
}
