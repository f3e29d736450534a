//! Location resolution: text candidates, then the geocoder, then the
//! language model, each result checked against the region and the update
//! policy before it can touch a project.

pub mod candidates;
pub mod geocoder;
pub mod policy;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sitewatch_common::text::{normalize_place, phrase_contains};
use sitewatch_common::{
    BoundingBox, CoordinateChange, Coordinates, FileConfig, GeocodeCandidate, GeocodeConfidence, GeocodeStrategy,
    Mention, Project, Result, Severity,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::{CallBudget, PaidCall};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::traits::{GeocodeHit, GeocodeQuery, Geocoder, Locator};
use crate::validator::CoordinateValidator;

use candidates::{CandidateKind, CandidateRules, TextCandidate};
use geocoder::classify;
use policy::{Proposal, UpdateDecision, UpdatePolicy};

/// Normalized query → hits. Persisted between runs; lookups here are free.
pub type GeocodeCache = BTreeMap<String, Vec<GeocodeHit>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "confidence", rename_all = "snake_case")]
pub enum ResolutionState {
    NoLocation,
    TextCandidateFound,
    Geocoded(GeocodeConfidence),
    GeocodeFailed,
    LlmFallback,
    Resolved,
    Unresolved,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    pub allow_llm: bool,
    /// Explicit retry of a project that has failed before; unlocks the
    /// language model even when a coordinate exists.
    pub retry: bool,
}

/// The texts a project's mentions carry, gathered once per resolution.
#[derive(Debug, Clone, Default)]
pub struct ProjectTexts {
    pub texts: Vec<String>,
    /// Longest article body, or the snippets when no body was fetched.
    pub article: String,
}

impl ProjectTexts {
    pub fn from_mentions<'a>(mentions: impl IntoIterator<Item = &'a Mention>) -> Self {
        let mut texts = Vec::new();
        let mut longest: Option<&str> = None;
        let mut short = Vec::new();
        for mention in mentions {
            if let Some(body) = mention.raw_text() {
                texts.push(body.to_string());
                if longest.is_none_or(|l| body.len() > l.len()) {
                    longest = Some(body);
                }
            }
            for text in [mention.snippet.as_str(), mention.title.as_str()] {
                if !text.trim().is_empty() {
                    texts.push(text.to_string());
                    short.push(text);
                }
            }
        }
        let article = longest.map(str::to_string).unwrap_or_else(|| short.join("\n"));
        Self { texts, article }
    }
}

/// What one resolution did. The project itself is untouched until
/// [`LocationResolver::apply`].
#[derive(Debug)]
pub struct Resolution {
    pub project_id: Uuid,
    pub trail: Vec<ResolutionState>,
    pub candidate: Option<GeocodeCandidate>,
    pub decision: Option<UpdateDecision>,
    pub cache_updates: Vec<(String, Vec<GeocodeHit>)>,
    /// The allotment handed in, with whatever was spent.
    pub budget: CallBudget,
    /// A paid strategy was skipped for lack of budget.
    pub degraded: bool,
    /// Hits thrown away by the region or name checks.
    pub discarded_hits: usize,
    pub errors: Vec<String>,
}

impl Resolution {
    fn new(project_id: Uuid, budget: CallBudget) -> Self {
        Self {
            project_id,
            trail: vec![ResolutionState::NoLocation],
            candidate: None,
            decision: None,
            cache_updates: Vec::new(),
            budget,
            degraded: false,
            discarded_hits: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.trail.last() == Some(&ResolutionState::Resolved)
    }

    pub fn needs_review(&self) -> bool {
        self.decision.as_ref().is_some_and(UpdateDecision::is_review)
    }

    fn finish(mut self, candidate: Option<GeocodeCandidate>, decision: Option<UpdateDecision>) -> Self {
        let resolved = matches!(
            decision,
            Some(UpdateDecision::Adopt { .. } | UpdateDecision::Keep { .. })
        );
        self.candidate = candidate;
        self.decision = decision;
        self.trail.push(if resolved {
            ResolutionState::Resolved
        } else {
            ResolutionState::Unresolved
        });
        self
    }
}

/// What [`LocationResolver::apply`] did to the project.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Updated(CoordinateChange),
    Confirmed,
    Flagged,
    Unchanged,
}

pub struct LocationResolver {
    rules: CandidateRules,
    validator: CoordinateValidator,
    policy: UpdatePolicy,
    bbox: BoundingBox,
    region: String,
    state_names: Vec<String>,
    retry: RetryPolicy,
    max_article_bytes: usize,
    geocoder: Option<Arc<dyn Geocoder>>,
    locator: Option<Arc<dyn Locator>>,
}

impl LocationResolver {
    pub fn new(
        config: &FileConfig,
        geocoder: Option<Arc<dyn Geocoder>>,
        locator: Option<Arc<dyn Locator>>,
    ) -> Result<Self> {
        Ok(Self {
            rules: CandidateRules::new(&config.neighborhoods, &config.region.state_names)?,
            validator: CoordinateValidator::from_config(config),
            policy: UpdatePolicy::new(config.thresholds.clone()),
            bbox: config.region.bbox,
            region: config.region.name.clone(),
            state_names: config.region.state_names.clone(),
            retry: RetryPolicy::from_config(&config.retry),
            max_article_bytes: config.llm.max_article_bytes,
            geocoder,
            locator,
        })
    }

    pub fn validator(&self) -> &CoordinateValidator {
        &self.validator
    }

    pub fn has_locator(&self) -> bool {
        self.locator.is_some()
    }

    /// Live projects with no coordinate, a stale one, or a coarse one.
    pub fn wants(&self, project: &Project) -> bool {
        !project.is_superseded()
            && (project.coordinates().is_none() || project.needs_geocode || project.geocode_confidence.is_coarse())
    }

    /// Walk the cascade for one project. Spends only from `budget`, which
    /// comes back inside the result.
    pub async fn resolve(
        &self,
        project: &Project,
        texts: &ProjectTexts,
        cache: &GeocodeCache,
        budget: CallBudget,
        opts: ResolveOptions,
    ) -> Resolution {
        let mut r = Resolution::new(project.project_id, budget);
        let text_refs: Vec<&str> = texts.texts.iter().map(String::as_str).collect();
        let candidates = self.rules.extract(project, &text_refs);

        let existing = project.coordinates().map(|c| (c, project.geocode_confidence));
        let existing_issue = self.validator.validate(project).map(|i| i.severity);
        let mut held_for_review: Option<(GeocodeCandidate, UpdateDecision)> = None;

        if !candidates.is_empty() {
            r.trail.push(ResolutionState::TextCandidateFound);
        }
        for text_candidate in &candidates {
            let Some(candidate) = self.geocode_candidate(text_candidate, cache, &mut r).await else {
                continue;
            };
            r.trail.push(ResolutionState::Geocoded(candidate.confidence));
            let decision = self.decide(project, existing, existing_issue, &candidate);
            debug!(
                project_id = %project.project_id,
                candidate = %candidate.text_span,
                decision = decision.reason(),
                "Candidate evaluated"
            );
            if !decision.is_review() {
                return r.finish(Some(candidate), Some(decision));
            }
            // A project without a place looks further down the list for
            // something that checks out; one with a place stops at the flag.
            held_for_review.get_or_insert((candidate, decision));
            if existing.is_some() {
                break;
            }
        }
        if !candidates.is_empty() {
            r.trail.push(ResolutionState::GeocodeFailed);
        }

        if opts.allow_llm && (existing.is_none() || opts.retry) {
            if let Some(candidate) = self.llm_candidate(project, texts, &mut r).await {
                let decision = self.decide(project, existing, existing_issue, &candidate);
                if !decision.is_review() {
                    return r.finish(Some(candidate), Some(decision));
                }
                held_for_review.get_or_insert((candidate, decision));
            }
        }

        match held_for_review {
            Some((candidate, decision)) => r.finish(Some(candidate), Some(decision)),
            None => r.finish(None, None),
        }
    }

    fn decide(
        &self,
        project: &Project,
        existing: Option<(Coordinates, GeocodeConfidence)>,
        existing_issue: Option<Severity>,
        candidate: &GeocodeCandidate,
    ) -> UpdateDecision {
        let candidate_issue = self
            .validator
            .check(project.location_text.as_deref(), candidate.coordinates)
            .and_then(|c| c.severity);
        self.policy.decide(&Proposal {
            existing,
            existing_issue,
            candidate,
            candidate_issue,
            has_site_hint: project.site_hint.is_some(),
        })
    }

    /// Cache first, then a paid lookup. Returns the first hit that lies in
    /// the region and names the same place.
    async fn geocode_candidate(
        &self,
        text_candidate: &TextCandidate,
        cache: &GeocodeCache,
        r: &mut Resolution,
    ) -> Option<GeocodeCandidate> {
        let query = GeocodeQuery {
            text: text_candidate.text.clone(),
            city: text_candidate.city.clone(),
            region: self.region.clone(),
        };
        let key = query.cache_key();

        let pending = r.cache_updates.iter().find(|(k, _)| *k == key).map(|(_, h)| h.clone());
        let (hits, strategy) = match cache.get(&key).cloned().or(pending) {
            Some(hits) => (hits, GeocodeStrategy::CachedGeocoder),
            None => {
                let geocoder = self.geocoder.as_ref()?;
                if !r.budget.try_spend(PaidCall::Geocode) {
                    r.degraded = true;
                    return None;
                }
                match retry_with_backoff(&self.retry, "geocode", || geocoder.geocode(&query)).await {
                    Ok(hits) => {
                        r.cache_updates.push((key, hits.clone()));
                        (hits, GeocodeStrategy::Geocoder)
                    }
                    Err(e) => {
                        warn!(query = %query.query_string(), error = %e, "Geocode failed");
                        r.errors.push(format!("geocode {:?}: {e:#}", query.query_string()));
                        return None;
                    }
                }
            }
        };

        let Some(pos) = hits.iter().position(|hit| self.accept_hit(text_candidate, hit)) else {
            r.discarded_hits += hits.len();
            debug!(candidate = %text_candidate.text, hits = hits.len(), "No acceptable geocode hit");
            return None;
        };
        r.discarded_hits += pos;
        let hit = &hits[pos];

        Some(GeocodeCandidate {
            text_span: text_candidate.text.clone(),
            strategy,
            coordinates: hit.coordinates(),
            confidence: classify(&hit.place_type),
            source_snippet: text_candidate.snippet.clone(),
        })
    }

    /// The region box is a hard filter. Past it, the hit's display name has
    /// to name the candidate's place at a compatible tier: a county
    /// candidate only takes county hits, and nothing else takes them.
    fn accept_hit(&self, candidate: &TextCandidate, hit: &GeocodeHit) -> bool {
        let coords = hit.coordinates();
        if !coords.is_finite() || !self.bbox.contains(&coords) {
            return false;
        }
        let tier = classify(&hit.place_type);
        let display = normalize_place(&hit.display_name, &[]);
        match candidate.kind {
            CandidateKind::County => {
                tier == GeocodeConfidence::County
                    && phrase_contains(&display, &normalize_place(&candidate.text, &self.state_names))
            }
            CandidateKind::AddressWithCity | CandidateKind::Address => {
                tier != GeocodeConfidence::County && phrase_contains(&display, &street_core(&candidate.text))
            }
            CandidateKind::Neighborhood | CandidateKind::Place => {
                matches!(tier, GeocodeConfidence::City | GeocodeConfidence::Neighborhood)
                    && phrase_contains(&display, &normalize_place(&candidate.text, &self.state_names))
            }
            CandidateKind::Area => phrase_contains(&display, &normalize_place(&candidate.text, &[])),
        }
    }

    async fn llm_candidate(
        &self,
        project: &Project,
        texts: &ProjectTexts,
        r: &mut Resolution,
    ) -> Option<GeocodeCandidate> {
        let locator = self.locator.as_ref()?;
        if texts.article.trim().is_empty() {
            return None;
        }
        if !r.budget.try_spend(PaidCall::Llm) {
            r.degraded = true;
            return None;
        }
        r.trail.push(ResolutionState::LlmFallback);

        let article = ai_client::util::truncate_to_char_boundary(&texts.article, self.max_article_bytes);
        let hint = project.location_text.as_deref();
        match retry_with_backoff(&self.retry, "llm locate", || locator.locate(article, hint)).await {
            Ok(Some(coords)) if coords.is_finite() && self.bbox.contains(&coords) => Some(GeocodeCandidate {
                text_span: hint.unwrap_or("article text").to_string(),
                strategy: GeocodeStrategy::Llm,
                coordinates: coords,
                confidence: GeocodeConfidence::Area,
                source_snippet: None,
            }),
            Ok(Some(coords)) => {
                warn!(project_id = %project.project_id, lat = coords.lat, lng = coords.lng, "LLM coordinate outside region, discarded");
                r.discarded_hits += 1;
                None
            }
            Ok(None) => {
                debug!(project_id = %project.project_id, "LLM declined to locate");
                None
            }
            Err(e) => {
                warn!(project_id = %project.project_id, error = %e, "LLM locate failed");
                r.errors.push(format!("llm locate: {e:#}"));
                None
            }
        }
    }

    /// Write an adopted coordinate. Downgrades are applied only with the
    /// policy's stated reason and are logged as such.
    pub fn apply(&self, project: &mut Project, resolution: &Resolution) -> Applied {
        match (&resolution.candidate, &resolution.decision) {
            (Some(candidate), Some(UpdateDecision::Adopt { reason })) => {
                if !self.bbox.contains(&candidate.coordinates) {
                    return Applied::Unchanged;
                }
                let change = project.apply_coordinates(
                    candidate.coordinates,
                    candidate.confidence,
                    candidate.strategy,
                    reason.clone(),
                );
                if change.is_downgrade() {
                    warn!(
                        project_id = %project.project_id,
                        from = %change.from_confidence,
                        to = %change.to_confidence,
                        reason = %change.reason,
                        "Geocode confidence downgraded"
                    );
                } else {
                    info!(
                        project_id = %project.project_id,
                        confidence = %change.to_confidence,
                        strategy = %change.strategy,
                        distance_km = ?change.distance_km,
                        "Coordinate updated"
                    );
                }
                Applied::Updated(change)
            }
            (Some(_), Some(UpdateDecision::Keep { .. })) => {
                project.needs_geocode = false;
                Applied::Confirmed
            }
            (_, Some(UpdateDecision::Review { reason })) => {
                info!(project_id = %project.project_id, reason = %reason, "Coordinate held for review");
                Applied::Flagged
            }
            _ => Applied::Unchanged,
        }
    }
}

/// Street name of an address: "1200 N Main Street" → "main".
fn street_core(address: &str) -> String {
    let normalized = normalize_place(address, &[]);
    let mut tokens: Vec<&str> = normalized
        .split(' ')
        .skip_while(|t| t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !matches!(*t, "n" | "s" | "e" | "w"))
        .collect();
    if tokens.len() > 1 {
        tokens.pop();
    }
    tokens.join(" ")
}
