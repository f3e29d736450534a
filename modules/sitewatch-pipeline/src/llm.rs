//! Language-model strategies, backed by Claude.

use std::sync::LazyLock;
use std::time::Duration;

use ai_client::util::{first_json_object, truncate_to_char_boundary};
use ai_client::Claude;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use sitewatch_common::config::LlmConfig;
use sitewatch_common::Coordinates;
use tracing::debug;

use crate::traits::{LlmIdentity, Locator};

const LOCATE_SYSTEM: &str = "You locate planned data center projects described in news articles. \
Reply with a single JSON object {\"lat\": <number>, \"lng\": <number>} giving the project site, \
or the single word UNKNOWN if the article does not say where it is. No other text.";

const IDENTIFY_SYSTEM: &str = "You read news articles about planned data center projects and \
report the developing company and the project's name exactly as the article states them. \
Leave a field empty when the article does not state it; never guess.";

static LAT_LNG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d{1,2}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct LatLng {
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "longitude", alias = "lon")]
    lng: f64,
}

/// Coordinates from a model reply: a JSON object if there is one, else a bare
/// "lat, lng" pair. UNKNOWN and anything unparseable are `None`.
pub fn parse_coordinates(reply: &str) -> Option<Coordinates> {
    if reply.trim().eq_ignore_ascii_case("unknown") {
        return None;
    }
    let parsed = first_json_object(reply)
        .and_then(|json| serde_json::from_str::<LatLng>(json).ok())
        .map(|p| Coordinates::new(p.lat, p.lng))
        .or_else(|| {
            let caps = LAT_LNG_RE.captures(reply)?;
            Some(Coordinates::new(caps[1].parse().ok()?, caps[2].parse().ok()?))
        })?;
    parsed.is_finite().then_some(parsed)
}

pub struct ClaudeLocator {
    claude: Claude,
    max_article_bytes: usize,
}

impl ClaudeLocator {
    pub fn new(api_key: &str, config: &LlmConfig, timeout: Duration) -> Self {
        Self {
            claude: Claude::new(api_key, &config.model).with_timeout(timeout),
            max_article_bytes: config.max_article_bytes,
        }
    }
}

#[async_trait]
impl Locator for ClaudeLocator {
    async fn locate(&self, article: &str, location_hint: Option<&str>) -> anyhow::Result<Option<Coordinates>> {
        let article = truncate_to_char_boundary(article, self.max_article_bytes);
        let prompt = match location_hint {
            Some(hint) => format!("Location mentioned: {hint}\n\nArticle:\n{article}"),
            None => format!("Article:\n{article}"),
        };
        let reply = self.claude.chat_completion(LOCATE_SYSTEM, prompt).await?;
        debug!(reply = %reply, "LLM locate reply");
        Ok(parse_coordinates(&reply))
    }

    async fn identify(&self, article: &str) -> anyhow::Result<LlmIdentity> {
        let article = truncate_to_char_boundary(article, self.max_article_bytes);
        let mut identity: LlmIdentity = self.claude.extract(IDENTIFY_SYSTEM, format!("Article:\n{article}")).await?;
        identity.company = identity.company.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        identity.project_name = identity.project_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        Ok(identity)
    }
}
