//! Card extraction: one mention in, one project card out.
//!
//! Every field rule is an independent pure function over the mention's
//! texts and fails closed to `None`. The only effect is the optional article
//! backfill in [`CardExtractor::extract_with_backfill`].

pub mod company;
pub mod dates;
pub mod location;
pub mod name;
pub mod probability;
pub mod size;

use std::collections::HashMap;

use chrono::NaiveDate;
use sitewatch_common::{FileConfig, Mention, ProjectCard, Result, SitewatchError};
use tracing::{debug, info, warn};

use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::traits::ArticleSource;

use company::{url_slug, CompanyMatcher};
use dates::CompletionDates;
use location::{find_site_hint, is_vague, LocationRules};
use name::CompanyIdentifiers;

/// Result of extracting one mention, possibly after fetching its article.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub card: ProjectCard,
    /// The article body was fetched during this extraction and written back
    /// to the mention.
    pub fetched_article: bool,
}

pub struct CardExtractor {
    companies: CompanyMatcher,
    identifiers: HashMap<String, CompanyIdentifiers>,
    locations: LocationRules,
    completion: CompletionDates,
    dollars_per_mw: f64,
}

impl CardExtractor {
    /// `today` anchors the completion-date window; pass it in so repeated
    /// runs over the same input agree.
    pub fn new(config: &FileConfig, today: NaiveDate) -> Result<Self> {
        let bad_pattern = |e: regex::Error| SitewatchError::Config(format!("invalid extraction pattern: {e}"));

        let companies = CompanyMatcher::new(&config.companies).map_err(bad_pattern)?;
        let mut identifiers = HashMap::new();
        for canonical in config.companies.keys() {
            let aliases = companies.aliases_of(canonical);
            identifiers.insert(
                canonical.clone(),
                CompanyIdentifiers::new(&aliases).map_err(bad_pattern)?,
            );
        }
        let locations =
            LocationRules::new(&config.region.state_names, companies.alias_keys()).map_err(bad_pattern)?;

        Ok(Self {
            companies,
            identifiers,
            locations,
            completion: CompletionDates::new(today, config.thresholds.completion_window_years),
            dollars_per_mw: config.thresholds.dollars_per_mw,
        })
    }

    /// Pure extraction over whatever text the mention carries right now.
    pub fn extract(&self, mention: &Mention) -> ProjectCard {
        let title = mention.title.as_str();
        let snippet = mention.snippet.as_str();
        let slug = url_slug(&mention.url);
        let full = mention.raw_text();

        let mut texts = vec![title, snippet];
        texts.extend(full);

        let company = [title, slug.as_str(), snippet]
            .into_iter()
            .chain(full)
            .find_map(|text| self.companies.find(text))
            .map(str::to_string);

        let location_text = self.locations.find(texts.iter().copied());
        let project_name = self.project_name(&texts, company.as_deref(), location_text.as_deref());

        let mut card = ProjectCard {
            mention_id: mention.mention_id.clone(),
            project_name,
            company,
            location_text,
            site_hint: find_site_hint(texts.iter().copied()),
            size_mw: size::megawatts(&texts, self.dollars_per_mw),
            size_sqft: size::square_feet(&texts),
            size_acres: size::acres(&texts),
            announced_date: mention.published_at,
            expected_completion_date: self.completion.find(&texts),
            probability_score: probability::score(&texts),
            ..Default::default()
        };
        card.recompute_confidence();
        card
    }

    fn project_name(&self, texts: &[&str], company: Option<&str>, location: Option<&str>) -> Option<String> {
        if let Some(quoted) = name::quoted_name(texts) {
            return Some(quoted);
        }
        let company = company?;
        if let Some(codename) = name::codename(texts) {
            return Some(codename);
        }
        if let Some(found) = self.identifiers.get(company).and_then(|ids| ids.find(texts)) {
            return Some(found);
        }
        Some(match location {
            Some(loc) if !is_vague(loc, self.locations.state_names()) => format!("{company} {loc}"),
            _ => format!("{company} Data Center"),
        })
    }

    /// The short texts left identity or place open and there is a URL to
    /// read the full story from.
    fn wants_article(&self, mention: &Mention, card: &ProjectCard) -> bool {
        mention.raw_text().is_none()
            && !mention.url.trim().is_empty()
            && (card.company.is_none() || card.location_text.is_none())
    }

    /// Extract, fetching the article body first when the title and snippet
    /// are not enough. A fetched body is written back to `mention`; fetch
    /// failures just leave the short-text card in place.
    pub async fn extract_with_backfill(
        &self,
        mention: &mut Mention,
        source: Option<&dyn ArticleSource>,
        retry: &RetryPolicy,
    ) -> Extraction {
        let card = self.extract(mention);
        if !self.wants_article(mention, &card) {
            return Extraction {
                card,
                fetched_article: false,
            };
        }
        self.with_article(mention, source, retry, card).await
    }

    /// Triage path: fetch the article whenever it is missing, however
    /// complete the short-text card already looks.
    pub async fn reextract(
        &self,
        mention: &mut Mention,
        source: Option<&dyn ArticleSource>,
        retry: &RetryPolicy,
    ) -> Extraction {
        let card = self.extract(mention);
        if mention.raw_text().is_some() || mention.url.trim().is_empty() {
            return Extraction {
                card,
                fetched_article: false,
            };
        }
        self.with_article(mention, source, retry, card).await
    }

    async fn with_article(
        &self,
        mention: &mut Mention,
        source: Option<&dyn ArticleSource>,
        retry: &RetryPolicy,
        card: ProjectCard,
    ) -> Extraction {
        let unchanged = |card| Extraction {
            card,
            fetched_article: false,
        };
        let Some(source) = source else {
            return unchanged(card);
        };

        let url = mention.url.clone();
        match retry_with_backoff(retry, "article fetch", || source.fetch_text(&url)).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(mention_id = %mention.mention_id, chars = text.len(), "Backfilled article text");
                mention.raw_text = Some(text);
                Extraction {
                    card: self.extract(mention),
                    fetched_article: true,
                }
            }
            Ok(_) => {
                debug!(mention_id = %mention.mention_id, "Article fetch returned no text");
                unchanged(card)
            }
            Err(e) => {
                warn!(mention_id = %mention.mention_id, url, error = %e, "Article fetch failed");
                unchanged(card)
            }
        }
    }

    /// Canonical name for a company string from elsewhere (the language
    /// model), if it is one of the configured companies.
    pub fn canonical_company(&self, name: &str) -> Option<String> {
        self.companies.find(name).map(str::to_string)
    }

    pub fn location_rules(&self) -> &LocationRules {
        &self.locations
    }
}
