// Test mocks for the pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockFetcher (ArticleSource): HashMap-based URL→article text
// - MockGeocoder (Geocoder): HashMap-based query key→hits, with a call log
// - MockLocator (Locator): fixed coordinate and identity, with call counts
//
// Plus fixture builders for config, mentions and geocoder hits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sitewatch_common::{Coordinates, FileConfig, Mention, PROJECT_ANNOUNCEMENT};

use crate::retry::HttpStatusError;
use crate::traits::{ArticleSource, GeocodeHit, GeocodeQuery, Geocoder, LlmIdentity, Locator};

// ---------------------------------------------------------------------------
// Test constants
// ---------------------------------------------------------------------------

/// Taylor, TX.
pub const TAYLOR: (f64, f64) = (30.5708, -97.4094);
/// Austin, TX (the city).
pub const AUSTIN: (f64, f64) = (30.2672, -97.7431);
/// Austin County, TX centroid. Nowhere near the city.
pub const AUSTIN_COUNTY: (f64, f64) = (29.8867, -96.2772);
/// Hill County, TX centroid.
pub const HILL_COUNTY: (f64, f64) = (31.9905, -97.1323);
/// Cedar Park, TX.
pub const CEDAR_PARK: (f64, f64) = (30.5052, -97.8203);
/// Cedar Rapids, IA. Outside the Texas box.
pub const CEDAR_RAPIDS: (f64, f64) = (41.9779, -91.6656);

/// Today, for extractors built in tests.
pub fn test_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap_or_default()
}

/// A Texas region with a small reference table, one neighborhood, two
/// companies, and fast retries.
pub const TEXAS_CONFIG: &str = r#"
[region]
name = "Texas"
state_names = ["Texas", "TX"]
bbox = { min_lat = 25.8, max_lat = 36.5, min_lng = -106.65, max_lng = -93.5 }

[[reference]]
name = "Austin"
kind = "city"
lat = 30.2672
lng = -97.7431

[[reference]]
name = "Taylor"
kind = "city"
lat = 30.5708
lng = -97.4094

[[reference]]
name = "Austin County"
kind = "county"
lat = 29.8867
lng = -96.2772

[[reference]]
name = "Hill County"
kind = "county"
lat = 31.9905
lng = -97.1323

[[neighborhood]]
name = "Mueller"
city = "Austin"

[companies]
Acme = ["Acme Corp"]
"Blue Owl" = ["Blue Owl Capital"]

[budget]
max_api_calls = 0
deadline_secs = 0
batch_size = 2
max_concurrent_calls = 2
max_calls_per_project = 6

[retry]
max_attempts = 2
base_delay_ms = 1
timeout_secs = 5
"#;

pub fn texas_config() -> FileConfig {
    match FileConfig::from_toml_str(TEXAS_CONFIG) {
        Ok(config) => config,
        Err(e) => panic!("test config is invalid: {e}"),
    }
}

pub fn mention(id: &str, title: &str, snippet: &str) -> Mention {
    Mention {
        mention_id: id.to_string(),
        title: title.to_string(),
        snippet: snippet.to_string(),
        raw_text: None,
        url: String::new(),
        published_at: None,
        classification: PROJECT_ANNOUNCEMENT.to_string(),
    }
}

pub fn hit(point: (f64, f64), place_type: &str, display_name: &str) -> GeocodeHit {
    GeocodeHit {
        lat: point.0,
        lng: point.1,
        place_type: place_type.to_string(),
        display_name: display_name.to_string(),
    }
}

/// Cache key the resolver uses for `text` (and optional city) in Texas.
pub fn texas_key(text: &str, city: Option<&str>) -> String {
    GeocodeQuery {
        text: text.to_string(),
        city: city.map(str::to_string),
        region: "Texas".to_string(),
    }
    .cache_key()
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// URL → article text. Unregistered URLs fail.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), text.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleSource for MockFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("MockFetcher: no page registered for {url}"))
    }
}

// ---------------------------------------------------------------------------
// MockGeocoder
// ---------------------------------------------------------------------------

/// Query cache key → hits. Unregistered queries return no hits. Every call
/// is logged so tests can assert on paid-call counts.
#[derive(Default)]
pub struct MockGeocoder {
    responses: HashMap<String, Vec<GeocodeHit>>,
    fail_with: Option<u16>,
    log: Mutex<Vec<String>>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(mut self, key: &str, hits: Vec<GeocodeHit>) -> Self {
        self.responses.insert(key.to_string(), hits);
        self
    }

    /// Every call fails with this HTTP status.
    pub fn failing(mut self, status: u16) -> Self {
        self.fail_with = Some(status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, query: &GeocodeQuery) -> Result<Vec<GeocodeHit>> {
        let key = query.cache_key();
        if let Ok(mut log) = self.log.lock() {
            log.push(key.clone());
        }
        if let Some(status) = self.fail_with {
            return Err(HttpStatusError {
                service: "geocoder",
                status,
            }
            .into());
        }
        Ok(self.responses.get(&key).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockLocator
// ---------------------------------------------------------------------------

/// Answers every locate with the same coordinate and every identify with
/// the same identity.
#[derive(Default)]
pub struct MockLocator {
    coordinates: Option<Coordinates>,
    identity: LlmIdentity,
    locate_calls: AtomicUsize,
    identify_calls: AtomicUsize,
}

impl MockLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locating(mut self, point: (f64, f64)) -> Self {
        self.coordinates = Some(Coordinates::new(point.0, point.1));
        self
    }

    pub fn identifying(mut self, company: Option<&str>, project_name: Option<&str>) -> Self {
        self.identity = LlmIdentity {
            company: company.map(str::to_string),
            project_name: project_name.map(str::to_string),
        };
        self
    }

    pub fn locate_calls(&self) -> usize {
        self.locate_calls.load(Ordering::SeqCst)
    }

    pub fn identify_calls(&self) -> usize {
        self.identify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Locator for MockLocator {
    async fn locate(&self, _article: &str, _location_hint: Option<&str>) -> Result<Option<Coordinates>> {
        self.locate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.coordinates)
    }

    async fn identify(&self, _article: &str) -> Result<LlmIdentity> {
        self.identify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.identity.clone())
    }
}
