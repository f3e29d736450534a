//! Single-writer JSON store: one directory, one file per collection.
//!
//! Everything is loaded at open, mutated in memory, and written back with
//! write-to-temp-then-rename on [`JsonStore::commit`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sitewatch_common::{Mention, Project, ProjectCard, Result, SitewatchError};
use tracing::{debug, info};

use crate::resolver::GeocodeCache;

const MENTIONS: &str = "mentions.json";
const CARDS: &str = "cards.json";
const PROJECTS: &str = "projects.json";
const GEOCODE_CACHE: &str = "geocode_cache.json";
const REPORTS: &str = "reports";

pub struct JsonStore {
    /// `None` for an in-memory store, which never touches disk.
    dir: Option<PathBuf>,
    mentions: Vec<Mention>,
    mention_index: HashMap<String, usize>,
    /// Keyed by mention id: one card per mention.
    pub cards: BTreeMap<String, ProjectCard>,
    pub projects: Vec<Project>,
    pub geocode_cache: GeocodeCache,
    reports: BTreeMap<String, serde_json::Value>,
}

impl JsonStore {
    /// `mentions.json` must exist; every other file starts empty when absent.
    pub fn open(dir: &Path) -> Result<Self> {
        let mentions_path = dir.join(MENTIONS);
        if !mentions_path.is_file() {
            return Err(SitewatchError::MissingStore(mentions_path));
        }
        let mentions: Vec<Mention> = read_json(&mentions_path)?;
        let cards = read_optional(&dir.join(CARDS))?;
        let projects = read_optional(&dir.join(PROJECTS))?;
        let geocode_cache = read_optional(&dir.join(GEOCODE_CACHE))?;

        let mut store = Self::build(Some(dir.to_path_buf()), mentions)?;
        store.cards = cards;
        store.projects = projects;
        store.geocode_cache = geocode_cache;
        info!(
            dir = %dir.display(),
            mentions = store.mentions.len(),
            cards = store.cards.len(),
            projects = store.projects.len(),
            cached_queries = store.geocode_cache.len(),
            "Store opened"
        );
        Ok(store)
    }

    pub fn in_memory(mentions: Vec<Mention>) -> Result<Self> {
        Self::build(None, mentions)
    }

    fn build(dir: Option<PathBuf>, mentions: Vec<Mention>) -> Result<Self> {
        let mut mention_index = HashMap::with_capacity(mentions.len());
        for (i, mention) in mentions.iter().enumerate() {
            if mention_index.insert(mention.mention_id.clone(), i).is_some() {
                return Err(SitewatchError::Store(format!(
                    "duplicate mention_id {:?} in {MENTIONS}",
                    mention.mention_id
                )));
            }
        }
        Ok(Self {
            dir,
            mentions,
            mention_index,
            cards: BTreeMap::new(),
            projects: Vec::new(),
            geocode_cache: GeocodeCache::new(),
            reports: BTreeMap::new(),
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn mentions(&self) -> &[Mention] {
        &self.mentions
    }

    pub fn mention(&self, mention_id: &str) -> Option<&Mention> {
        self.mention_index.get(mention_id).map(|&i| &self.mentions[i])
    }

    /// The only sanctioned mention mutation is the article backfill.
    pub fn mention_mut(&mut self, mention_id: &str) -> Option<&mut Mention> {
        self.mention_index.get(mention_id).map(|&i| &mut self.mentions[i])
    }

    /// Mentions classified as project announcements, in store order.
    pub fn announcements(&self) -> impl Iterator<Item = &Mention> {
        self.mentions.iter().filter(|m| m.is_project_announcement())
    }

    pub fn project(&self, project_id: uuid::Uuid) -> Option<&Project> {
        self.projects.iter().find(|p| p.project_id == project_id)
    }

    /// Persist every collection. A no-op for in-memory stores.
    pub fn commit(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        write_json_atomic(&dir.join(MENTIONS), &self.mentions)?;
        write_json_atomic(&dir.join(CARDS), &self.cards)?;
        write_json_atomic(&dir.join(PROJECTS), &self.projects)?;
        write_json_atomic(&dir.join(GEOCODE_CACHE), &self.geocode_cache)?;
        debug!(dir = %dir.display(), "Store committed");
        Ok(())
    }

    /// Reports are written even on dry runs; they describe, not mutate.
    pub fn write_report<T: Serialize>(&mut self, name: &str, report: &T) -> Result<Option<PathBuf>> {
        let value = serde_json::to_value(report)?;
        let path = match &self.dir {
            Some(dir) => {
                let reports = dir.join(REPORTS);
                fs::create_dir_all(&reports)?;
                let path = reports.join(format!("{name}.json"));
                write_json_atomic(&path, &value)?;
                info!(path = %path.display(), "Report written");
                Some(path)
            }
            None => None,
        };
        self.reports.insert(name.to_string(), value);
        Ok(path)
    }

    /// Last report written under `name` during this run.
    pub fn report(&self, name: &str) -> Option<&serde_json::Value> {
        self.reports.get(name)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| SitewatchError::Store(format!("failed to parse {}: {e}", path.display())))
}

fn read_optional<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if path.is_file() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp)?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(id: &str, classification: &str) -> Mention {
        Mention {
            mention_id: id.into(),
            title: "Title".into(),
            snippet: String::new(),
            raw_text: None,
            url: String::new(),
            published_at: None,
            classification: classification.into(),
        }
    }

    #[test]
    fn missing_mentions_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        match JsonStore::open(dir.path()) {
            Err(SitewatchError::MissingStore(path)) => assert!(path.ends_with(MENTIONS)),
            other => panic!("expected MissingStore, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn commit_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mentions = vec![
            mention("m-1", sitewatch_common::PROJECT_ANNOUNCEMENT),
            mention("m-2", "other"),
        ];
        fs::write(dir.path().join(MENTIONS), serde_json::to_string(&mentions).unwrap()).unwrap();

        let mut store = JsonStore::open(dir.path()).unwrap();
        assert_eq!(store.announcements().count(), 1);
        store.mention_mut("m-1").unwrap().raw_text = Some("body".into());
        store.projects.push(Project::new("m-1", 1));
        store.commit().unwrap();

        let reopened = JsonStore::open(dir.path()).unwrap();
        assert_eq!(reopened.mention("m-1").unwrap().raw_text.as_deref(), Some("body"));
        assert_eq!(reopened.projects.len(), 1);
        assert!(!dir.path().join("projects.json.tmp").exists());
    }

    #[test]
    fn duplicate_mention_ids_are_rejected() {
        let result = JsonStore::in_memory(vec![mention("m-1", "x"), mention("m-1", "x")]);
        assert!(matches!(result, Err(SitewatchError::Store(_))));
    }

    #[test]
    fn in_memory_reports_are_kept() {
        let mut store = JsonStore::in_memory(vec![]).unwrap();
        let path = store.write_report("extraction_report", &serde_json::json!({"processed": 3})).unwrap();
        assert!(path.is_none());
        assert_eq!(store.report("extraction_report").unwrap()["processed"], 3);
    }
}
