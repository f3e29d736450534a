//! Card → Project assignment.
//!
//! Matching is conservative: same normalized company and overlapping
//! normalized location, or a mention already linked to a project. Distinct
//! projects left unmerged are preferred over one wrong merge.

use sitewatch_common::text::{is_county_name, normalize_company, normalize_place, phrase_contains};
use sitewatch_common::{GeocodeStrategy, Project, ProjectCard};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Created(Uuid),
    /// Joined an existing project; `absorbed` projects were superseded by it.
    Merged { project_id: Uuid, absorbed: Vec<Uuid> },
    /// The mention was already linked; the project was refreshed from it.
    Relinked(Uuid),
}

impl Assignment {
    pub fn project_id(&self) -> Uuid {
        match self {
            Assignment::Created(id) | Assignment::Relinked(id) => *id,
            Assignment::Merged { project_id, .. } => *project_id,
        }
    }
}

pub struct Canonicalizer {
    state_names: Vec<String>,
}

impl Canonicalizer {
    pub fn new(state_names: &[String]) -> Self {
        Self {
            state_names: state_names.to_vec(),
        }
    }

    pub fn assign(&self, projects: &mut Vec<Project>, card: &ProjectCard, url: Option<&str>) -> Assignment {
        if let Some(idx) = live_owner(projects, &card.mention_id) {
            self.apply_card(&mut projects[idx], card, url);
            debug!(mention_id = %card.mention_id, project_id = %projects[idx].project_id, "Relinked card");
            return Assignment::Relinked(projects[idx].project_id);
        }

        let mut matches: Vec<usize> = projects
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_superseded() && self.is_match(p, card))
            .map(|(i, _)| i)
            .collect();

        if matches.is_empty() {
            let seq = projects.iter().map(|p| p.created_seq + 1).max().unwrap_or(0);
            let mut project = Project::new(&card.mention_id, seq);
            self.apply_card(&mut project, card, url);
            let id = project.project_id;
            info!(project_id = %id, label = %project.label(), "Created project");
            projects.push(project);
            return Assignment::Created(id);
        }

        matches.sort_by_key(|&i| projects[i].created_seq);
        let survivor = matches[0];
        let mut absorbed = Vec::new();
        // A vague card overlaps everything; it may join a project but never
        // justifies collapsing several.
        if !self.is_vague(card.location_text.as_deref()) {
            for &other in &matches[1..] {
                absorbed.push(self.absorb(projects, survivor, other));
            }
        }
        self.apply_card(&mut projects[survivor], card, url);

        let project_id = projects[survivor].project_id;
        info!(
            project_id = %project_id,
            mention_id = %card.mention_id,
            absorbed = absorbed.len(),
            "Merged card into project"
        );
        Assignment::Merged { project_id, absorbed }
    }

    fn is_match(&self, project: &Project, card: &ProjectCard) -> bool {
        let (Some(a), Some(b)) = (project.company.as_deref(), card.company.as_deref()) else {
            return false;
        };
        let a = normalize_company(a);
        !a.is_empty()
            && a == normalize_company(b)
            && self.locations_overlap(project.location_text.as_deref(), card.location_text.as_deref())
    }

    /// Equal, or one contains the other as whole words with the same
    /// county-ness ("Austin County" never overlaps "Austin"). A vague side
    /// overlaps anything.
    pub fn locations_overlap(&self, a: Option<&str>, b: Option<&str>) -> bool {
        let na = normalize_place(a.unwrap_or_default(), &self.state_names);
        let nb = normalize_place(b.unwrap_or_default(), &self.state_names);
        if na.is_empty() || nb.is_empty() {
            return true;
        }
        if is_county_name(&na) != is_county_name(&nb) {
            return false;
        }
        na == nb || phrase_contains(&na, &nb) || phrase_contains(&nb, &na)
    }

    fn is_vague(&self, location: Option<&str>) -> bool {
        normalize_place(location.unwrap_or_default(), &self.state_names).is_empty()
    }

    /// Merge rule: the higher-confidence side's values win, ties go to the
    /// incoming card. The losing side only fills gaps. Mentions are unioned.
    pub fn apply_card(&self, project: &mut Project, card: &ProjectCard, url: Option<&str>) {
        let wins = project.mention_ids.is_empty() || card.extraction_confidence >= project.card_confidence;
        let before = project.location_text.clone();

        merge_field(&mut project.company, &card.company, wins);
        merge_field(&mut project.project_name, &card.project_name, wins);
        self.merge_location(&mut project.location_text, &card.location_text, wins);
        merge_field(&mut project.site_hint, &card.site_hint, wins);
        if wins {
            project.card_confidence = card.extraction_confidence;
        }
        project.add_mention(&card.mention_id, url);
        self.flag_location_change(project, before.as_deref());
    }

    /// Fold `other` into `survivor` and mark it superseded. Ties keep the
    /// survivor's values.
    fn absorb(&self, projects: &mut [Project], survivor: usize, other: usize) -> Uuid {
        let donor = projects[other].clone();
        let target = &mut projects[survivor];
        let wins = donor.card_confidence > target.card_confidence;
        let before = target.location_text.clone();

        merge_field(&mut target.company, &donor.company, wins);
        merge_field(&mut target.project_name, &donor.project_name, wins);
        self.merge_location(&mut target.location_text, &donor.location_text, wins);
        merge_field(&mut target.site_hint, &donor.site_hint, wins);
        if wins {
            target.card_confidence = donor.card_confidence;
        }
        for mention_id in &donor.mention_ids {
            target.add_mention(mention_id, None);
        }
        for url in &donor.source_urls {
            if !target.source_urls.contains(url) {
                target.source_urls.push(url.clone());
            }
        }

        if let Some(coords) = donor.coordinates() {
            match target.coordinates() {
                None => {
                    let strategy = donor
                        .coordinate_history
                        .last()
                        .map(|c| c.strategy)
                        .unwrap_or(GeocodeStrategy::Geocoder);
                    target.apply_coordinates(
                        coords,
                        donor.geocode_confidence,
                        strategy,
                        format!("inherited from merged project {}", donor.project_id),
                    );
                }
                // Coordinates only move through the resolver's acceptance test.
                Some(_) if donor.geocode_confidence > target.geocode_confidence => {
                    target.needs_geocode = true;
                }
                Some(_) => {}
            }
        }
        self.flag_location_change(target, before.as_deref());

        let survivor_id = target.project_id;
        projects[other].superseded_by = Some(survivor_id);
        info!(superseded = %donor.project_id, survivor = %survivor_id, "Project superseded by merge");
        donor.project_id
    }

    /// Like any scalar, except a vague location never replaces a specific
    /// one, whatever the confidence.
    fn merge_location(&self, slot: &mut Option<String>, value: &Option<String>, wins: bool) {
        let demotes = self.is_vague(value.as_deref()) && !self.is_vague(slot.as_deref());
        merge_field(slot, value, wins && !demotes);
    }

    fn flag_location_change(&self, project: &mut Project, before: Option<&str>) {
        let old = normalize_place(before.unwrap_or_default(), &self.state_names);
        let new = normalize_place(project.location_text.as_deref().unwrap_or_default(), &self.state_names);
        if old != new || (project.coordinates().is_none() && !new.is_empty()) {
            project.needs_geocode = true;
        }
    }
}

fn merge_field(slot: &mut Option<String>, value: &Option<String>, wins: bool) {
    if let Some(v) = value {
        if wins || slot.is_none() {
            *slot = Some(v.clone());
        }
    }
}

/// The live project currently holding `mention_id`, following supersession.
pub fn live_owner(projects: &[Project], mention_id: &str) -> Option<usize> {
    let mut idx = projects
        .iter()
        .position(|p| p.mention_ids.iter().any(|m| m == mention_id))?;
    // Supersession chains are short and acyclic; the bound guards bad data.
    for _ in 0..projects.len() {
        let Some(next) = projects[idx].superseded_by else {
            return Some(idx);
        };
        idx = projects.iter().position(|p| p.project_id == next)?;
    }
    None
}
