use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinates;

/// Classification label for mentions the pipeline acts on.
pub const PROJECT_ANNOUNCEMENT: &str = "project_announcement";

// --- Mention ---

/// One observed article or snippet referencing a potential project.
/// Owned by the ingestion system; only `raw_text` is ever written here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub mention_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub published_at: Option<NaiveDate>,
    #[serde(default)]
    pub classification: String,
}

impl Mention {
    pub fn is_project_announcement(&self) -> bool {
        self.classification == PROJECT_ANNOUNCEMENT
    }

    pub fn raw_text(&self) -> Option<&str> {
        self.raw_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

// --- Enums ---

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityScore {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ProbabilityScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbabilityScore::Unknown => write!(f, "unknown"),
            ProbabilityScore::Low => write!(f, "low"),
            ProbabilityScore::Medium => write!(f, "medium"),
            ProbabilityScore::High => write!(f, "high"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionConfidence {
    #[default]
    Low,
    Medium,
    High,
}

impl ExtractionConfidence {
    /// ≥4 filled fields is high, ≥2 medium, anything less low.
    pub fn from_filled_fields(filled: usize) -> Self {
        match filled {
            n if n >= 4 => ExtractionConfidence::High,
            n if n >= 2 => ExtractionConfidence::Medium,
            _ => ExtractionConfidence::Low,
        }
    }
}

impl std::fmt::Display for ExtractionConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionConfidence::Low => write!(f, "low"),
            ExtractionConfidence::Medium => write!(f, "medium"),
            ExtractionConfidence::High => write!(f, "high"),
        }
    }
}

/// Geocode confidence tier, ordered by specificity (`Address` is the most
/// specific, `Unknown` the least).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeConfidence {
    #[default]
    Unknown,
    Area,
    County,
    City,
    Neighborhood,
    Address,
}

impl GeocodeConfidence {
    pub fn is_coarse(self) -> bool {
        matches!(self, GeocodeConfidence::Area | GeocodeConfidence::County)
    }
}

impl std::fmt::Display for GeocodeConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeocodeConfidence::Unknown => write!(f, "unknown"),
            GeocodeConfidence::Area => write!(f, "area"),
            GeocodeConfidence::County => write!(f, "county"),
            GeocodeConfidence::City => write!(f, "city"),
            GeocodeConfidence::Neighborhood => write!(f, "neighborhood"),
            GeocodeConfidence::Address => write!(f, "address"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeStrategy {
    Geocoder,
    CachedGeocoder,
    Llm,
}

impl std::fmt::Display for GeocodeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeocodeStrategy::Geocoder => write!(f, "geocoder"),
            GeocodeStrategy::CachedGeocoder => write!(f, "cached_geocoder"),
            GeocodeStrategy::Llm => write!(f, "llm"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Incorrect,
    Questionable,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Incorrect => write!(f, "incorrect"),
            Severity::Questionable => write!(f, "questionable"),
        }
    }
}

// --- Project Card ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeProvenance {
    /// The article states a megawatt figure.
    Stated,
    /// Derived from a dollar amount with a rough multiplier.
    EstimatedFromDollars,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MegawattFigure {
    pub value: f64,
    pub provenance: SizeProvenance,
}

impl MegawattFigure {
    pub fn stated(value: f64) -> Self {
        Self {
            value,
            provenance: SizeProvenance::Stated,
        }
    }

    pub fn estimated(value: f64) -> Self {
        Self {
            value,
            provenance: SizeProvenance::EstimatedFromDollars,
        }
    }

    pub fn is_estimate(&self) -> bool {
        self.provenance == SizeProvenance::EstimatedFromDollars
    }
}

/// The extraction result for exactly one mention. Every field is nullable on
/// its own; `extraction_confidence` is derived from how many are filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectCard {
    pub mention_id: String,
    pub project_name: Option<String>,
    pub company: Option<String>,
    pub location_text: Option<String>,
    pub site_hint: Option<String>,
    pub size_mw: Option<MegawattFigure>,
    pub size_sqft: Option<f64>,
    pub size_acres: Option<f64>,
    pub announced_date: Option<NaiveDate>,
    pub expected_completion_date: Option<NaiveDate>,
    #[serde(default)]
    pub probability_score: ProbabilityScore,
    #[serde(default)]
    pub extraction_confidence: ExtractionConfidence,
}

impl ProjectCard {
    pub fn filled_fields(&self) -> usize {
        [
            self.project_name.is_some(),
            self.company.is_some(),
            self.location_text.is_some(),
            self.site_hint.is_some(),
            self.size_mw.is_some(),
            self.size_sqft.is_some(),
            self.size_acres.is_some(),
            self.announced_date.is_some(),
            self.expected_completion_date.is_some(),
        ]
        .into_iter()
        .filter(|filled| *filled)
        .count()
    }

    pub fn recompute_confidence(&mut self) {
        self.extraction_confidence = ExtractionConfidence::from_filled_fields(self.filled_fields());
    }

    /// No company or no project name could be resolved.
    pub fn is_unknown_identity(&self) -> bool {
        self.company.is_none() || self.project_name.is_none()
    }
}

// --- Project ---

/// An audited coordinate change. Appended for every move, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateChange {
    pub from: Option<Coordinates>,
    pub to: Coordinates,
    pub from_confidence: GeocodeConfidence,
    pub to_confidence: GeocodeConfidence,
    pub strategy: GeocodeStrategy,
    pub reason: String,
    pub distance_km: Option<f64>,
    pub at: DateTime<Utc>,
}

impl CoordinateChange {
    pub fn is_downgrade(&self) -> bool {
        self.to_confidence < self.from_confidence
    }
}

/// The canonical, deduplicated entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: Uuid,
    pub company: Option<String>,
    pub project_name: Option<String>,
    pub location_text: Option<String>,
    #[serde(default)]
    pub site_hint: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default)]
    pub geocode_confidence: GeocodeConfidence,
    pub mention_ids: Vec<String>,
    pub source_urls: Vec<String>,
    /// Confidence of the card whose scalar fields the project currently holds.
    #[serde(default)]
    pub card_confidence: ExtractionConfidence,
    #[serde(default)]
    pub superseded_by: Option<Uuid>,
    /// Creation order; the lower value survives a merge.
    #[serde(default)]
    pub created_seq: u64,
    /// `location_text` changed since the coordinate was assigned.
    #[serde(default)]
    pub needs_geocode: bool,
    #[serde(default)]
    pub identity_from_llm: bool,
    #[serde(default)]
    pub coordinate_history: Vec<CoordinateChange>,
}

impl Project {
    /// An empty project seeded from its first contributing mention.
    pub fn new(first_mention_id: &str, created_seq: u64) -> Self {
        Self {
            project_id: Self::id_for_mention(first_mention_id),
            company: None,
            project_name: None,
            location_text: None,
            site_hint: None,
            lat: None,
            lng: None,
            geocode_confidence: GeocodeConfidence::Unknown,
            mention_ids: Vec::new(),
            source_urls: Vec::new(),
            card_confidence: ExtractionConfidence::Low,
            superseded_by: None,
            created_seq,
            needs_geocode: false,
            identity_from_llm: false,
            coordinate_history: Vec::new(),
        }
    }

    /// Stable identifier derived from the first contributing mention.
    pub fn id_for_mention(mention_id: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("sitewatch:mention:{mention_id}").as_bytes())
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    pub fn is_unknown_identity(&self) -> bool {
        self.company.is_none() || self.project_name.is_none()
    }

    /// Human-readable label for logs and reports.
    pub fn label(&self) -> String {
        match (&self.project_name, &self.company) {
            (Some(name), _) => name.clone(),
            (None, Some(company)) => format!("{company} (unnamed)"),
            (None, None) => "Unknown".to_string(),
        }
    }

    /// Union-in a mention, keeping insertion order and uniqueness.
    pub fn add_mention(&mut self, mention_id: &str, url: Option<&str>) {
        if !self.mention_ids.iter().any(|m| m == mention_id) {
            self.mention_ids.push(mention_id.to_string());
        }
        if let Some(url) = url.filter(|u| !u.is_empty()) {
            if !self.source_urls.iter().any(|u| u == url) {
                self.source_urls.push(url.to_string());
            }
        }
    }

    /// Record and apply a coordinate change. The only way coordinates move.
    pub fn apply_coordinates(
        &mut self,
        to: Coordinates,
        confidence: GeocodeConfidence,
        strategy: GeocodeStrategy,
        reason: impl Into<String>,
    ) -> CoordinateChange {
        let from = self.coordinates();
        let change = CoordinateChange {
            from,
            to,
            from_confidence: self.geocode_confidence,
            to_confidence: confidence,
            strategy,
            reason: reason.into(),
            distance_km: from.map(|f| f.distance_km(&to)),
            at: Utc::now(),
        };
        self.lat = Some(to.lat);
        self.lng = Some(to.lng);
        self.geocode_confidence = confidence;
        self.needs_geocode = false;
        self.coordinate_history.push(change.clone());
        change
    }
}

// --- Ephemeral values ---

/// A possible coordinate for a project, produced during resolution and never
/// persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeCandidate {
    pub text_span: String,
    pub strategy: GeocodeStrategy,
    pub coordinates: Coordinates,
    pub confidence: GeocodeConfidence,
    pub source_snippet: Option<String>,
}

/// A derived flag: the project's coordinate disagrees with the place its
/// text names. Recomputed on every validation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub project_id: Uuid,
    pub severity: Severity,
    pub distance_km: f64,
    pub expected_reference: String,
    pub current_coords: Coordinates,
    pub location_text: Option<String>,
    /// A named site can legitimately sit far from a city centroid; surfaced
    /// for the reviewer, never used to suppress the issue.
    pub site_hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_with(fields: usize) -> ProjectCard {
        let mut card = ProjectCard {
            mention_id: "m1".into(),
            ..Default::default()
        };
        let setters: [fn(&mut ProjectCard); 5] = [
            |c| c.company = Some("Acme".into()),
            |c| c.location_text = Some("Taylor".into()),
            |c| c.size_mw = Some(MegawattFigure::stated(50.0)),
            |c| c.project_name = Some("Acme Taylor".into()),
            |c| c.size_acres = Some(120.0),
        ];
        for set in setters.iter().take(fields) {
            set(&mut card);
        }
        card.recompute_confidence();
        card
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(card_with(0).extraction_confidence, ExtractionConfidence::Low);
        assert_eq!(card_with(1).extraction_confidence, ExtractionConfidence::Low);
        assert_eq!(card_with(2).extraction_confidence, ExtractionConfidence::Medium);
        assert_eq!(card_with(3).extraction_confidence, ExtractionConfidence::Medium);
        assert_eq!(card_with(4).extraction_confidence, ExtractionConfidence::High);
    }

    #[test]
    fn confidence_is_monotonic_in_filled_fields() {
        for a in 0..=5 {
            for b in a..=5 {
                assert!(card_with(b).extraction_confidence >= card_with(a).extraction_confidence);
            }
        }
    }

    #[test]
    fn geocode_tiers_order_by_specificity() {
        use GeocodeConfidence::*;
        let tiers = [Unknown, Area, County, City, Neighborhood, Address];
        assert!(tiers.windows(2).all(|w| w[0] < w[1]));
        assert!(Area.is_coarse() && County.is_coarse());
        assert!(!City.is_coarse() && !Unknown.is_coarse());
    }

    #[test]
    fn project_id_is_stable_per_mention() {
        assert_eq!(Project::id_for_mention("m-1"), Project::id_for_mention("m-1"));
        assert_ne!(Project::id_for_mention("m-1"), Project::id_for_mention("m-2"));
    }

    #[test]
    fn mention_union_keeps_order() {
        let mut project = Project::new("a", 0);
        project.add_mention("a", Some("https://x/a"));
        project.add_mention("b", Some(""));
        project.add_mention("a", Some("https://x/a"));
        assert_eq!(project.mention_ids, vec!["a", "b"]);
        assert_eq!(project.source_urls, vec!["https://x/a"]);

        let change = project.apply_coordinates(
            Coordinates::new(30.57, -97.41),
            GeocodeConfidence::City,
            GeocodeStrategy::Geocoder,
            "first assignment",
        );
        assert!(change.from.is_none());
        assert!(!change.is_downgrade());
        assert_eq!(project.coordinate_history.len(), 1);
    }
}
