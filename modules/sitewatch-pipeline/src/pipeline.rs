//! Stage drivers: each stage walks its items in a stable order, checks the
//! run limits between items (or batches), commits at batch boundaries, and
//! writes its report.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use sitewatch_common::{FileConfig, Project, Result, Severity};
use tracing::{info, warn};

use crate::budget::{CallBudget, RunContext, StageOutcome};
use crate::canonicalize::{live_owner, Assignment, Canonicalizer};
use crate::extractor::CardExtractor;
use crate::report::{
    AccuracyReport, CanonicalizationReport, ExtractionReport, ResolutionEntry, ResolutionReport, ReviewFlag,
    ACCURACY_REPORT, CANONICALIZATION_REPORT, EXTRACTION_REPORT, RESOLUTION_REPORT,
};
use crate::resolver::{Applied, LocationResolver, ProjectTexts, Resolution, ResolveOptions};
use crate::retry::RetryPolicy;
use crate::stats::RunStats;
use crate::store::JsonStore;
use crate::traits::{ArticleSource, Geocoder, Locator};
use crate::triage::Triage;
use crate::validator::ValidationPass;

/// External collaborators. Any of them may be absent; the stages fall back
/// to whatever is free.
#[derive(Clone, Default)]
pub struct Services {
    pub articles: Option<Arc<dyn ArticleSource>>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
    pub locator: Option<Arc<dyn Locator>>,
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Items per stage.
    pub limit: Option<usize>,
    /// Compute and report, never commit.
    pub dry_run: bool,
    /// Write resolver results back to projects.
    pub write_back: bool,
    pub allow_llm: bool,
    /// Overrides `budget.max_api_calls`.
    pub max_api_calls: Option<u64>,
    /// Overrides `budget.deadline_secs`.
    pub deadline: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limit: None,
            dry_run: false,
            write_back: true,
            allow_llm: false,
            max_api_calls: None,
            deadline: None,
        }
    }
}

pub struct Pipeline {
    config: FileConfig,
    extractor: CardExtractor,
    canonicalizer: Canonicalizer,
    resolver: LocationResolver,
    articles: Option<Arc<dyn ArticleSource>>,
    locator: Option<Arc<dyn Locator>>,
    retry: RetryPolicy,
    opts: RunOptions,
}

impl Pipeline {
    /// `today` anchors the completion-date window.
    pub fn new(config: FileConfig, services: Services, opts: RunOptions, today: NaiveDate) -> Result<Self> {
        let locator = services.locator.filter(|_| opts.allow_llm);
        Ok(Self {
            extractor: CardExtractor::new(&config, today)?,
            canonicalizer: Canonicalizer::new(&config.region.state_names),
            resolver: LocationResolver::new(&config, services.geocoder, locator.clone())?,
            articles: services.articles,
            locator,
            retry: RetryPolicy::from_config(&config.retry),
            opts,
            config,
        })
    }

    /// Run-wide limits from config, with CLI overrides applied.
    pub fn context(&self) -> RunContext {
        let budget = &self.config.budget;
        let max_calls = self.opts.max_api_calls.unwrap_or(budget.max_api_calls);
        let deadline = self
            .opts
            .deadline
            .or_else(|| (budget.deadline_secs > 0).then(|| Duration::from_secs(budget.deadline_secs)));
        RunContext::new(CallBudget::new(max_calls), deadline, self.opts.limit)
    }

    pub fn options(&self) -> &RunOptions {
        &self.opts
    }

    fn checkpoint(&self, store: &JsonStore) -> Result<()> {
        if self.opts.dry_run {
            return Ok(());
        }
        store.commit()
    }

    // --- Extract ---

    /// Cards for every announcement that does not have one yet.
    pub async fn extract(
        &self,
        store: &mut JsonStore,
        ctx: &mut RunContext,
        stats: &mut RunStats,
    ) -> Result<StageOutcome> {
        ctx.start_stage();
        let pending: Vec<String> = store
            .announcements()
            .filter(|m| !store.cards.contains_key(&m.mention_id))
            .map(|m| m.mention_id.clone())
            .collect();
        info!(pending = pending.len(), "Extracting project cards");

        let batch_size = self.config.budget.batch_size;
        let mut outcome = StageOutcome::Completed;
        let mut processed = 0;
        let mut fetched = 0;
        for mention_id in pending {
            if let Some(reason) = ctx.should_stop() {
                outcome = StageOutcome::StoppedEarly(reason);
                break;
            }
            let Some(mention) = store.mention_mut(&mention_id) else {
                continue;
            };
            let extraction = self
                .extractor
                .extract_with_backfill(mention, self.articles.as_deref(), &self.retry)
                .await;
            if extraction.fetched_article {
                fetched += 1;
            }
            store.cards.insert(mention_id, extraction.card);
            ctx.record_processed(1);
            processed += 1;
            if processed % batch_size == 0 {
                self.checkpoint(store)?;
            }
        }
        self.checkpoint(store)?;

        stats.mentions_extracted += processed as u32;
        stats.articles_fetched += fetched as u32;
        stats.record_outcome(outcome);

        let mut by_confidence = BTreeMap::new();
        for card in store.cards.values() {
            *by_confidence.entry(card.extraction_confidence.to_string()).or_insert(0) += 1;
        }
        let report = ExtractionReport {
            generated_at: Utc::now(),
            outcome,
            processed,
            articles_fetched: fetched,
            by_confidence,
            unknown_identity: store.cards.values().filter(|c| c.is_unknown_identity()).count(),
            with_location: store.cards.values().filter(|c| c.location_text.is_some()).count(),
            estimated_mw: store
                .cards
                .values()
                .filter(|c| c.size_mw.is_some_and(|mw| mw.is_estimate()))
                .count(),
        };
        store.write_report(EXTRACTION_REPORT, &report)?;
        info!(processed, fetched, ?outcome, "Extraction finished");
        Ok(outcome)
    }

    // --- Canonicalize ---

    /// Assign every card that no live project holds yet, in store order.
    pub fn canonicalize(
        &self,
        store: &mut JsonStore,
        ctx: &mut RunContext,
        stats: &mut RunStats,
    ) -> Result<StageOutcome> {
        ctx.start_stage();
        let pending: Vec<String> = store
            .announcements()
            .filter(|m| store.cards.contains_key(&m.mention_id))
            .filter(|m| live_owner(&store.projects, &m.mention_id).is_none())
            .map(|m| m.mention_id.clone())
            .collect();
        info!(pending = pending.len(), "Canonicalizing cards");

        let batch_size = self.config.budget.batch_size;
        let mut outcome = StageOutcome::Completed;
        let (mut processed, mut created, mut absorbed) = (0usize, 0usize, 0usize);
        for mention_id in pending {
            if let Some(reason) = ctx.should_stop() {
                outcome = StageOutcome::StoppedEarly(reason);
                break;
            }
            let Some(card) = store.cards.get(&mention_id).cloned() else {
                continue;
            };
            let url = store.mention(&mention_id).map(|m| m.url.clone());
            match self.canonicalizer.assign(&mut store.projects, &card, url.as_deref()) {
                Assignment::Created(_) => created += 1,
                Assignment::Merged { absorbed: gone, .. } => absorbed += gone.len(),
                Assignment::Relinked(_) => {}
            }
            ctx.record_processed(1);
            processed += 1;
            if processed % batch_size == 0 {
                self.checkpoint(store)?;
            }
        }
        self.checkpoint(store)?;

        stats.cards_assigned += processed as u32;
        stats.projects_created += created as u32;
        stats.projects_absorbed += absorbed as u32;
        stats.record_outcome(outcome);

        let report = CanonicalizationReport {
            generated_at: Utc::now(),
            outcome,
            processed,
            projects_created: created,
            projects_absorbed: absorbed,
            live_projects: store.projects.iter().filter(|p| !p.is_superseded()).count(),
            superseded_projects: store.projects.iter().filter(|p| p.is_superseded()).count(),
        };
        store.write_report(CANONICALIZATION_REPORT, &report)?;
        info!(processed, created, absorbed, ?outcome, "Canonicalization finished");
        Ok(outcome)
    }

    // --- Resolve ---

    pub async fn resolve(
        &self,
        store: &mut JsonStore,
        ctx: &mut RunContext,
        stats: &mut RunStats,
    ) -> Result<StageOutcome> {
        ctx.start_stage();
        let mut targets: Vec<usize> = store
            .projects
            .iter()
            .enumerate()
            .filter(|(_, p)| self.resolver.wants(p))
            .map(|(i, _)| i)
            .collect();
        targets.sort_by(|&a, &b| resolve_order(&store.projects[a], &store.projects[b]));
        targets.truncate(ctx.remaining_items());
        info!(targets = targets.len(), write_back = self.opts.write_back, "Resolving project locations");

        let budget_cfg = &self.config.budget;
        let opts = ResolveOptions {
            allow_llm: self.opts.allow_llm,
            retry: false,
        };
        let mut outcome = StageOutcome::Completed;
        let mut report = ResolutionReport {
            generated_at: Utc::now(),
            outcome,
            processed: 0,
            resolved: 0,
            updated: 0,
            downgraded: 0,
            unresolved: 0,
            degraded: 0,
            discarded_hits: 0,
            geocode_calls: 0,
            llm_calls: 0,
            write_back: self.opts.write_back,
            review_flags: Vec::new(),
            entries: Vec::new(),
        };

        for batch in targets.chunks(budget_cfg.batch_size) {
            if let Some(reason) = ctx.should_stop() {
                outcome = StageOutcome::StoppedEarly(reason);
                break;
            }
            let jobs: Vec<(usize, Project, ProjectTexts, CallBudget)> = batch
                .iter()
                .map(|&i| {
                    let project = store.projects[i].clone();
                    let texts = project_texts(store, &project);
                    (i, project, texts, ctx.budget.allot(budget_cfg.max_calls_per_project))
                })
                .collect();

            let cache = &store.geocode_cache;
            let resolver = &self.resolver;
            let results: Vec<(usize, Resolution)> = stream::iter(jobs.into_iter().map(|(i, project, texts, budget)| async move {
                (i, resolver.resolve(&project, &texts, cache, budget, opts).await)
            }))
            .buffered(budget_cfg.max_concurrent_calls)
            .collect()
            .await;

            for (i, resolution) in results {
                self.record_resolution(store, i, resolution, ctx, &mut report);
            }
            ctx.record_processed(batch.len());
            self.checkpoint(store)?;
        }

        ctx.budget.log_status();
        stats.projects_resolved += report.processed as u32;
        stats.coordinates_updated += report.updated as u32;
        stats.coordinates_downgraded += report.downgraded as u32;
        stats.flagged_for_review += report.review_flags.len() as u32;
        stats.unresolved += report.unresolved as u32;
        stats.record_budget(&ctx.budget);
        stats.record_outcome(outcome);

        report.outcome = outcome;
        report.geocode_calls = ctx.budget.geocode_calls();
        report.llm_calls = ctx.budget.llm_calls();
        info!(
            processed = report.processed,
            resolved = report.resolved,
            updated = report.updated,
            unresolved = report.unresolved,
            flagged = report.review_flags.len(),
            ?outcome,
            "Resolution finished"
        );
        store.write_report(RESOLUTION_REPORT, &report)?;
        Ok(outcome)
    }

    /// Fold one finished resolution back in: cache, project, budget, report.
    fn record_resolution(
        &self,
        store: &mut JsonStore,
        index: usize,
        mut resolution: Resolution,
        ctx: &mut RunContext,
        report: &mut ResolutionReport,
    ) {
        for (key, hits) in resolution.cache_updates.drain(..) {
            store.geocode_cache.insert(key, hits);
        }
        let project = &mut store.projects[index];

        report.processed += 1;
        report.discarded_hits += resolution.discarded_hits;
        if resolution.degraded {
            report.degraded += 1;
        }
        if resolution.is_resolved() {
            report.resolved += 1;
        } else {
            report.unresolved += 1;
        }
        if let Some(flag) = review_flag(project, &resolution) {
            report.review_flags.push(flag);
        }
        if self.opts.write_back {
            if let Applied::Updated(change) = self.resolver.apply(project, &resolution) {
                report.updated += 1;
                if change.is_downgrade() {
                    report.downgraded += 1;
                }
            }
        }
        report.entries.push(ResolutionEntry {
            project_id: project.project_id,
            label: project.label(),
            trail: resolution.trail.clone(),
            decision: resolution.decision.as_ref().map(|d| d.reason().to_string()),
            errors: std::mem::take(&mut resolution.errors),
        });
        ctx.budget.settle(resolution.budget);
    }

    // --- Validate ---

    /// One validation pass over every live project. Issues are reported, not
    /// corrected.
    pub fn validate(&self, store: &mut JsonStore, stats: &mut RunStats) -> Result<ValidationPass> {
        let pass = self.resolver.validator().validate_all(&store.projects);
        stats.validation_incorrect = pass.count(Severity::Incorrect) as u32;
        stats.validation_questionable = pass.count(Severity::Questionable) as u32;
        info!(
            checked = pass.checked,
            matched = pass.matched,
            incorrect = stats.validation_incorrect,
            questionable = stats.validation_questionable,
            "Validation finished"
        );
        store.write_report(ACCURACY_REPORT, &AccuracyReport::from_pass(&pass))?;
        Ok(pass)
    }

    // --- Triage ---

    /// Re-work projects that are unknown, unresolved or flagged incorrect,
    /// then refresh the accuracy report.
    pub async fn triage(
        &self,
        store: &mut JsonStore,
        ctx: &mut RunContext,
        stats: &mut RunStats,
    ) -> Result<StageOutcome> {
        ctx.start_stage();
        let pass = self.resolver.validator().validate_all(&store.projects);
        let triage = Triage {
            extractor: &self.extractor,
            canonicalizer: &self.canonicalizer,
            resolver: &self.resolver,
            articles: self.articles.as_deref(),
            locator: self.locator.as_deref(),
            retry: &self.retry,
            calls_per_project: self.config.budget.max_calls_per_project,
            batch_size: self.config.budget.batch_size,
            allow_llm: self.opts.allow_llm,
            write_back: self.opts.write_back,
            dry_run: self.opts.dry_run,
        };
        let outcome = triage.run(store, ctx, &pass, stats).await?;
        self.checkpoint(store)?;
        ctx.budget.log_status();
        stats.record_budget(&ctx.budget);
        stats.record_outcome(outcome);
        self.validate(store, stats)?;
        Ok(outcome)
    }

    // --- All ---

    /// Every stage in order. A stage cut short by the deadline leaves the
    /// later stages to stop at their first check, still writing reports.
    pub async fn run_all(&self, store: &mut JsonStore, ctx: &mut RunContext, stats: &mut RunStats) -> Result<()> {
        self.extract(store, ctx, stats).await?;
        self.canonicalize(store, ctx, stats)?;
        self.resolve(store, ctx, stats).await?;
        self.triage(store, ctx, stats).await?;
        if stats.stopped_early.is_some() {
            warn!(reason = ?stats.stopped_early, "Run stopped early; progress so far is saved");
        }
        Ok(())
    }
}

/// Texts of every mention a project holds, in mention order.
pub(crate) fn project_texts(store: &JsonStore, project: &Project) -> ProjectTexts {
    ProjectTexts::from_mentions(project.mention_ids.iter().filter_map(|id| store.mention(id)))
}

pub(crate) fn review_flag(project: &Project, resolution: &Resolution) -> Option<ReviewFlag> {
    if !resolution.needs_review() {
        return None;
    }
    let candidate = resolution.candidate.clone()?;
    Some(ReviewFlag {
        project_id: project.project_id,
        label: project.label(),
        location_text: project.location_text.clone(),
        current_coords: project.coordinates(),
        current_confidence: project.geocode_confidence,
        candidate,
        reason: resolution.decision.as_ref().map(|d| d.reason().to_string()).unwrap_or_default(),
    })
}

/// No coordinate first, then stale, then coarse; company and id break ties.
fn resolve_order(a: &Project, b: &Project) -> Ordering {
    fn class(p: &Project) -> u8 {
        if p.coordinates().is_none() {
            0
        } else if p.needs_geocode {
            1
        } else {
            2
        }
    }
    class(a)
        .cmp(&class(b))
        .then_with(|| company_key(a).cmp(&company_key(b)))
        .then_with(|| a.project_id.cmp(&b.project_id))
}

pub(crate) fn company_key(p: &Project) -> String {
    p.company.as_deref().unwrap_or_default().to_lowercase()
}
