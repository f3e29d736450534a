//! Seams to the outside world. Production uses HTTP implementations; tests
//! use the mocks in `testing`.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sitewatch_common::Coordinates;

/// Fetches readable article text for a mention URL. Free: never counted
/// against the call budget.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_text(&self, url: &str) -> anyhow::Result<String>;
}

#[async_trait]
impl ArticleSource for sitewatch_archive::ArticleFetcher {
    async fn fetch_text(&self, url: &str) -> anyhow::Result<String> {
        Ok(sitewatch_archive::ArticleFetcher::fetch_text(self, url).await?)
    }
}

/// A single geocoder lookup. `text` is the place phrase; `city` narrows
/// streets and neighborhoods; `region` is always appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeQuery {
    pub text: String,
    pub city: Option<String>,
    pub region: String,
}

impl GeocodeQuery {
    pub fn query_string(&self) -> String {
        let mut parts = vec![self.text.trim()];
        if let Some(city) = self.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            parts.push(city);
        }
        parts.push(self.region.trim());
        parts.join(", ")
    }

    /// Cache key. Case and spacing differences are the same lookup.
    pub fn cache_key(&self) -> String {
        self.query_string()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One geocoder result, as cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeHit {
    pub lat: f64,
    pub lng: f64,
    /// Provider place type ("city", "county", "house", ...).
    pub place_type: String,
    pub display_name: String,
}

impl GeocodeHit {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Candidate places for a query, best first. An empty list is a valid
    /// "nothing found" answer, not an error.
    async fn geocode(&self, query: &GeocodeQuery) -> anyhow::Result<Vec<GeocodeHit>>;
}

/// Identity recovered from article text by the language model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LlmIdentity {
    /// The company developing or operating the project, if stated.
    pub company: Option<String>,
    /// The project's name, if the article gives one.
    pub project_name: Option<String>,
}

/// Language-model fallbacks. Every call is paid.
#[async_trait]
pub trait Locator: Send + Sync {
    /// Best-guess coordinate for the project described in `article`, or
    /// `None` when the model declines to answer.
    async fn locate(&self, article: &str, location_hint: Option<&str>) -> anyhow::Result<Option<Coordinates>>;

    async fn identify(&self, article: &str) -> anyhow::Result<LlmIdentity>;
}
