//! Re-work for projects the first pass left unknown, unresolved, or
//! flagged incorrect. Escalates cheap to expensive: re-extract from the full
//! article, then ask the language model for identity, then resolve again
//! with the model allowed.

use chrono::Utc;
use sitewatch_common::{Project, Result, Severity};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::{PaidCall, RunContext, StageOutcome};
use crate::canonicalize::Canonicalizer;
use crate::extractor::CardExtractor;
use crate::pipeline::{company_key, project_texts, review_flag};
use crate::report::{TriageEntry, TriageReason, TriageReport, TRIAGE_REPORT};
use crate::resolver::{Applied, LocationResolver, ResolveOptions};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::stats::RunStats;
use crate::store::JsonStore;
use crate::traits::{ArticleSource, Locator};
use crate::validator::ValidationPass;

pub struct Triage<'a> {
    pub extractor: &'a CardExtractor,
    pub canonicalizer: &'a Canonicalizer,
    pub resolver: &'a LocationResolver,
    pub articles: Option<&'a dyn ArticleSource>,
    pub locator: Option<&'a dyn Locator>,
    pub retry: &'a RetryPolicy,
    pub calls_per_project: u64,
    pub batch_size: usize,
    pub allow_llm: bool,
    pub write_back: bool,
    pub dry_run: bool,
}

/// Why a project needs another look. Incorrect coordinates go first.
pub fn triage_reason(project: &Project, pass: &ValidationPass) -> Option<TriageReason> {
    if project.is_superseded() {
        return None;
    }
    if pass.severity_of(project) == Some(Severity::Incorrect) {
        Some(TriageReason::IncorrectCoordinate)
    } else if project.is_unknown_identity() {
        Some(TriageReason::UnknownIdentity)
    } else if project.coordinates().is_none() {
        Some(TriageReason::Unresolved)
    } else {
        None
    }
}

impl Triage<'_> {
    pub async fn run(
        &self,
        store: &mut JsonStore,
        ctx: &mut RunContext,
        pass: &ValidationPass,
        stats: &mut RunStats,
    ) -> Result<StageOutcome> {
        let mut targets: Vec<(TriageReason, String, Uuid)> = store
            .projects
            .iter()
            .filter_map(|p| Some((triage_reason(p, pass)?, company_key(p), p.project_id)))
            .collect();
        targets.sort();
        let total = targets.len();
        targets.truncate(ctx.remaining_items());
        info!(targets = total, "Triage starting");

        let mut report = TriageReport {
            generated_at: Utc::now(),
            outcome: StageOutcome::Completed,
            targets: total,
            processed: 0,
            improved_by_reextraction: 0,
            identified_by_llm: 0,
            coordinates_updated: 0,
            still_unknown: 0,
            still_incorrect: 0,
            review_flags: Vec::new(),
            entries: Vec::new(),
        };

        for (reason, _, project_id) in targets {
            if let Some(stop) = ctx.should_stop() {
                report.outcome = StageOutcome::StoppedEarly(stop);
                break;
            }
            let Some(index) = store.projects.iter().position(|p| p.project_id == project_id) else {
                continue;
            };
            let entry = self.triage_one(store, ctx, index, reason, &mut report).await;
            if entry.reextracted {
                report.improved_by_reextraction += 1;
            }
            if entry.llm_identity {
                report.identified_by_llm += 1;
            }
            if entry.coordinate_updated {
                report.coordinates_updated += 1;
            }
            report.entries.push(entry);
            report.processed += 1;
            ctx.record_processed(1);
            if !self.dry_run && report.processed % self.batch_size == 0 {
                store.commit()?;
            }
        }

        let live = || store.projects.iter().filter(|p| !p.is_superseded());
        report.still_unknown = live().filter(|p| p.is_unknown_identity()).count();
        report.still_incorrect = live()
            .filter(|p| {
                self.resolver
                    .validator()
                    .validate(p)
                    .is_some_and(|i| i.severity == Severity::Incorrect)
            })
            .count();

        stats.triaged += report.processed as u32;
        stats.triage_improved += report
            .entries
            .iter()
            .filter(|e| e.reextracted || e.llm_identity || e.coordinate_updated)
            .count() as u32;
        stats.flagged_for_review += report.review_flags.len() as u32;
        info!(
            processed = report.processed,
            reextracted = report.improved_by_reextraction,
            llm_identified = report.identified_by_llm,
            updated = report.coordinates_updated,
            still_unknown = report.still_unknown,
            still_incorrect = report.still_incorrect,
            "Triage finished"
        );
        let outcome = report.outcome;
        store.write_report(TRIAGE_REPORT, &report)?;
        Ok(outcome)
    }

    async fn triage_one(
        &self,
        store: &mut JsonStore,
        ctx: &mut RunContext,
        index: usize,
        reason: TriageReason,
        report: &mut TriageReport,
    ) -> TriageEntry {
        let project_id = store.projects[index].project_id;
        let label_before = store.projects[index].label();
        debug!(%project_id, ?reason, label = %label_before, "Triaging project");

        // Step 1: free. Re-read every mention against its full article.
        let mut reextracted = false;
        for mention_id in store.projects[index].mention_ids.clone() {
            let Some(mention) = store.mention_mut(&mention_id) else {
                continue;
            };
            let extraction = self.extractor.reextract(mention, self.articles, self.retry).await;
            let url = mention.url.clone();
            let known = store.cards.get(&mention_id).map_or(0, |c| c.filled_fields());
            if extraction.card.filled_fields() > known {
                self.canonicalizer
                    .apply_card(&mut store.projects[index], &extraction.card, Some(&url));
                store.cards.insert(mention_id, extraction.card);
                reextracted = true;
            }
        }

        let mut budget = ctx.budget.allot(self.calls_per_project);

        // Step 2: paid, and only while the identity is still unknown.
        let mut llm_identity = false;
        if self.allow_llm && store.projects[index].is_unknown_identity() {
            if let Some(locator) = self.locator {
                let texts = project_texts(store, &store.projects[index]);
                if texts.article.trim().is_empty() {
                    debug!(%project_id, "No text to identify from");
                } else if budget.try_spend(PaidCall::Llm) {
                    match retry_with_backoff(self.retry, "llm identify", || locator.identify(&texts.article)).await {
                        Ok(identity) => {
                            llm_identity = self.apply_identity(&mut store.projects[index], identity);
                        }
                        Err(e) => warn!(%project_id, error = %e, "LLM identify failed"),
                    }
                } else {
                    debug!(%project_id, "Budget exhausted, skipping LLM identify");
                }
            }
        }

        // Step 3: resolve again, with the model unlocked for this retry.
        let texts = project_texts(store, &store.projects[index]);
        let opts = ResolveOptions {
            allow_llm: self.allow_llm,
            retry: true,
        };
        let mut resolution = self
            .resolver
            .resolve(&store.projects[index], &texts, &store.geocode_cache, budget, opts)
            .await;
        for (key, hits) in resolution.cache_updates.drain(..) {
            store.geocode_cache.insert(key, hits);
        }
        let project = &mut store.projects[index];
        if let Some(flag) = review_flag(project, &resolution) {
            report.review_flags.push(flag);
        }
        let coordinate_updated = self.write_back
            && matches!(self.resolver.apply(project, &resolution), Applied::Updated(_));
        let trail = resolution.trail.clone();
        ctx.budget.settle(resolution.budget);

        let project = &store.projects[index];
        let still_flagged = project.is_unknown_identity()
            || project.coordinates().is_none()
            || self
                .resolver
                .validator()
                .validate(project)
                .is_some_and(|i| i.severity == Severity::Incorrect);

        TriageEntry {
            project_id,
            reason,
            label_before,
            label_after: project.label(),
            reextracted,
            llm_identity,
            resolution: trail,
            coordinate_updated,
            still_flagged,
        }
    }

    /// Fill only what is missing. A project name the model did not give is
    /// synthesized from the company, as extraction would.
    fn apply_identity(&self, project: &mut Project, identity: crate::traits::LlmIdentity) -> bool {
        let mut changed = false;
        if project.company.is_none() {
            if let Some(company) = identity.company {
                project.company = Some(self.extractor.canonical_company(&company).unwrap_or(company));
                changed = true;
            }
        }
        if project.project_name.is_none() {
            if let Some(name) = identity.project_name {
                project.project_name = Some(name);
                changed = true;
            } else if let Some(company) = &project.company {
                project.project_name = Some(format!("{company} Data Center"));
                changed = true;
            }
        }
        if changed {
            project.identity_from_llm = true;
            info!(project_id = %project.project_id, label = %project.label(), "Identity recovered by LLM");
        }
        changed
    }
}
