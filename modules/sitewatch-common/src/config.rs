use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::error::{Result, SitewatchError};
use crate::geo::{BoundingBox, ReferencePoint};

// ---------------------------------------------------------------------------
// File config (TOML): reviewable, non-secret settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub region: RegionConfig,
    #[serde(default, rename = "reference")]
    pub references: Vec<ReferencePoint>,
    #[serde(default, rename = "neighborhood")]
    pub neighborhoods: Vec<NeighborhoodConfig>,
    /// Canonical company name → aliases. The canonical name is always an
    /// alias of itself.
    #[serde(default)]
    pub companies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    pub name: String,
    /// Names that refer to the whole region ("Texas", "TX"). A location
    /// consisting only of these is treated as vague.
    #[serde(default)]
    pub state_names: Vec<String>,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeighborhoodConfig {
    pub name: String,
    pub city: String,
}

/// Distance and confidence heuristics. These were tuned by hand against
/// observed data and are expected to need recalibration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Moves shorter than this are not a different location.
    pub move_threshold_km: f64,
    /// Moves up to this distance are adopted automatically.
    pub auto_adopt_km: f64,
    /// Replacing a coarse coordinate is allowed up to this distance; anything
    /// further is flagged for review instead.
    pub review_km: f64,
    pub questionable_km: f64,
    pub incorrect_km: f64,
    /// Rough capital cost per megawatt for dollar-to-MW estimates.
    pub dollars_per_mw: f64,
    /// Completion dates beyond `current year + window` are rejected.
    pub completion_window_years: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            move_threshold_km: 1.0,
            auto_adopt_km: 5.0,
            review_km: 40.0,
            questionable_km: 5.0,
            incorrect_km: 20.0,
            dollars_per_mw: 10_000_000.0,
            completion_window_years: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    /// Paid external calls (geocode + LLM) per run. 0 = unlimited.
    pub max_api_calls: u64,
    /// Wall-clock budget per run. 0 = no deadline.
    pub deadline_secs: u64,
    pub batch_size: usize,
    pub max_concurrent_calls: usize,
    pub max_calls_per_project: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_api_calls: 500,
            deadline_secs: 3600,
            batch_size: 25,
            max_concurrent_calls: 4,
            max_calls_per_project: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub max_results: u32,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "sitewatch/0.1".to_string(),
            max_results: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub model: String,
    /// Article text sent to the model is truncated to this many bytes.
    pub max_article_bytes: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4-5".to_string(),
            max_article_bytes: 12_000,
        }
    }
}

impl FileConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FileConfig = toml::from_str(content)
            .map_err(|e| SitewatchError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SitewatchError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if !self.region.bbox.is_valid() {
            return Err(SitewatchError::Config(format!(
                "region bounding box is not a valid lat/lng rectangle: {:?}",
                self.region.bbox
            )));
        }
        let t = &self.thresholds;
        if t.questionable_km > t.incorrect_km {
            return Err(SitewatchError::Config(
                "thresholds.questionable_km must not exceed thresholds.incorrect_km".into(),
            ));
        }
        if t.auto_adopt_km > t.review_km {
            return Err(SitewatchError::Config(
                "thresholds.auto_adopt_km must not exceed thresholds.review_km".into(),
            ));
        }
        if t.dollars_per_mw <= 0.0 {
            return Err(SitewatchError::Config(
                "thresholds.dollars_per_mw must be positive".into(),
            ));
        }
        if self.budget.batch_size == 0 || self.budget.max_concurrent_calls == 0 {
            return Err(SitewatchError::Config(
                "budget.batch_size and budget.max_concurrent_calls must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SitewatchError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Environment config: secrets and deployment paths
// ---------------------------------------------------------------------------

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub anthropic_api_key: Option<String>,
    pub geocoder_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            config_path: env::var("SITEWATCH_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/sitewatch.toml")),
            data_dir: env::var("SITEWATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            geocoder_api_key: optional_env("GEOCODER_API_KEY"),
        }
    }

    /// The LLM strategy was requested; its credential is now mandatory.
    pub fn require_anthropic_key(&self) -> Result<&str> {
        self.anthropic_api_key.as_deref().ok_or_else(|| {
            SitewatchError::Config(
                "ANTHROPIC_API_KEY environment variable is required for the LLM strategy".into(),
            )
        })
    }

    pub fn log_redacted(&self) {
        info!(
            config_path = %self.config_path.display(),
            data_dir = %self.data_dir.display(),
            anthropic_api_key = redact(self.anthropic_api_key.as_deref()),
            geocoder_api_key = redact(self.geocoder_api_key.as_deref()),
            "Configuration"
        );
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn redact(value: Option<&str>) -> &'static str {
    match value {
        Some(_) => "[set]",
        None => "[unset]",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [region]
        name = "Texas"
        state_names = ["Texas", "TX"]
        bbox = { min_lat = 25.8, max_lat = 36.5, min_lng = -106.65, max_lng = -93.5 }

        [[reference]]
        name = "Taylor"
        kind = "city"
        lat = 30.5708
        lng = -97.4094

        [companies]
        Acme = ["Acme Corp"]
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = FileConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.region.state_names, vec!["Texas", "TX"]);
        assert_eq!(config.references.len(), 1);
        assert_eq!(config.companies["Acme"], vec!["Acme Corp"]);
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn shipped_config_parses() {
        let config = FileConfig::from_toml_str(include_str!("../../../config/sitewatch.toml")).unwrap();
        assert_eq!(config.region.name, "Texas");
        assert!(config.references.iter().any(|r| r.name == "Hill County"));
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.budget, BudgetConfig::default());
    }

    #[test]
    fn missing_bbox_is_fatal() {
        let err = FileConfig::from_toml_str("[region]\nname = \"Texas\"\n").unwrap_err();
        assert!(matches!(err, SitewatchError::Config(_)));
        assert!(err.to_string().contains("bbox"));
    }

    #[test]
    fn inverted_bbox_is_rejected() {
        let bad = MINIMAL.replace("min_lat = 25.8, max_lat = 36.5", "min_lat = 36.5, max_lat = 25.8");
        assert!(FileConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let bad = format!("{MINIMAL}\n[thresholds]\nwhatever_km = 3.0\n");
        assert!(FileConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let config = Config {
            config_path: PathBuf::from("x.toml"),
            data_dir: PathBuf::from("data"),
            anthropic_api_key: None,
            geocoder_api_key: None,
        };
        assert!(config.require_anthropic_key().is_err());
    }
}
