//! Per-stage JSON reports written to `<data dir>/reports/`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sitewatch_common::{Coordinates, GeocodeCandidate, GeocodeConfidence, ValidationIssue};
use uuid::Uuid;

use crate::budget::StageOutcome;
use crate::resolver::ResolutionState;
use crate::validator::ValidationPass;

pub const EXTRACTION_REPORT: &str = "extraction_report";
pub const CANONICALIZATION_REPORT: &str = "canonicalization_report";
pub const RESOLUTION_REPORT: &str = "resolution_report";
pub const ACCURACY_REPORT: &str = "coordinate_accuracy_report";
pub const TRIAGE_REPORT: &str = "triage_report";

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub generated_at: DateTime<Utc>,
    pub outcome: StageOutcome,
    pub processed: usize,
    pub articles_fetched: usize,
    /// Extraction confidence → card count.
    pub by_confidence: BTreeMap<String, usize>,
    pub unknown_identity: usize,
    pub with_location: usize,
    pub estimated_mw: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanonicalizationReport {
    pub generated_at: DateTime<Utc>,
    pub outcome: StageOutcome,
    pub processed: usize,
    pub projects_created: usize,
    /// Projects marked superseded by a merge during this stage.
    pub projects_absorbed: usize,
    pub live_projects: usize,
    pub superseded_projects: usize,
}

/// A resolved coordinate the update policy would not apply on its own.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewFlag {
    pub project_id: Uuid,
    pub label: String,
    pub location_text: Option<String>,
    pub current_coords: Option<Coordinates>,
    pub current_confidence: GeocodeConfidence,
    pub candidate: GeocodeCandidate,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionEntry {
    pub project_id: Uuid,
    pub label: String,
    pub trail: Vec<ResolutionState>,
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub generated_at: DateTime<Utc>,
    pub outcome: StageOutcome,
    pub processed: usize,
    pub resolved: usize,
    pub updated: usize,
    pub downgraded: usize,
    pub unresolved: usize,
    /// Projects that skipped a paid strategy because the budget ran out.
    pub degraded: usize,
    pub discarded_hits: usize,
    pub geocode_calls: u64,
    pub llm_calls: u64,
    pub write_back: bool,
    pub review_flags: Vec<ReviewFlag>,
    pub entries: Vec<ResolutionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccuracyReport {
    pub generated_at: DateTime<Utc>,
    pub checked: usize,
    pub matched_reference: usize,
    pub incorrect: usize,
    pub questionable: usize,
    pub issues: Vec<ValidationIssue>,
}

impl AccuracyReport {
    pub fn from_pass(pass: &ValidationPass) -> Self {
        use sitewatch_common::Severity;
        Self {
            generated_at: Utc::now(),
            checked: pass.checked,
            matched_reference: pass.matched,
            incorrect: pass.count(Severity::Incorrect),
            questionable: pass.count(Severity::Questionable),
            issues: pass.issues.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageReason {
    IncorrectCoordinate,
    UnknownIdentity,
    Unresolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriageEntry {
    pub project_id: Uuid,
    pub reason: TriageReason,
    pub label_before: String,
    pub label_after: String,
    pub reextracted: bool,
    pub llm_identity: bool,
    pub resolution: Vec<ResolutionState>,
    pub coordinate_updated: bool,
    pub still_flagged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriageReport {
    pub generated_at: DateTime<Utc>,
    pub outcome: StageOutcome,
    pub targets: usize,
    pub processed: usize,
    pub improved_by_reextraction: usize,
    pub identified_by_llm: usize,
    pub coordinates_updated: usize,
    pub still_unknown: usize,
    pub still_incorrect: usize,
    pub review_flags: Vec<ReviewFlag>,
    pub entries: Vec<TriageEntry>,
}
