//! Stage drivers over a real store directory: commits, dry runs, limits,
//! deadlines and the call budget.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sitewatch_common::{GeocodeConfidence, Mention, Project, SitewatchError};
use sitewatch_pipeline::budget::{StageOutcome, StopReason};
use sitewatch_pipeline::pipeline::{Pipeline, RunOptions, Services};
use sitewatch_pipeline::report::{
    ACCURACY_REPORT, CANONICALIZATION_REPORT, EXTRACTION_REPORT, RESOLUTION_REPORT, TRIAGE_REPORT,
};
use sitewatch_pipeline::stats::RunStats;
use sitewatch_pipeline::store::JsonStore;
use sitewatch_pipeline::testing::*;

fn mentions() -> Vec<Mention> {
    let mut other = mention("m-3", "Power prices climb in Taylor, Texas", "Grid operators warn of demand.");
    other.classification = "market_news".to_string();
    vec![
        mention(
            "m-1",
            "Acme Data Center breaks ground in Taylor, Texas",
            "...50 MW facility...",
        ),
        mention(
            "m-2",
            "Acme expands its campus",
            "Acme Corp is adding 100 MW in Taylor, Texas.",
        ),
        other,
        mention("m-4", "Blue Owl Capital plans data center in Hill County", ""),
    ]
}

fn geocoder() -> Arc<MockGeocoder> {
    Arc::new(
        MockGeocoder::new()
            .on_query(
                &texas_key("Taylor", None),
                vec![hit(TAYLOR, "city", "Taylor, Williamson County, Texas, United States")],
            )
            .on_query(
                &texas_key("Hill County", None),
                vec![hit(HILL_COUNTY, "county", "Hill County, Texas, United States")],
            ),
    )
}

fn pipeline(geocoder: Arc<MockGeocoder>, opts: RunOptions) -> Pipeline {
    let services = Services {
        geocoder: Some(geocoder),
        ..Default::default()
    };
    Pipeline::new(texas_config(), services, opts, test_today()).unwrap()
}

fn seed_store(dir: &Path) {
    let json = serde_json::to_string_pretty(&mentions()).unwrap();
    std::fs::write(dir.join("mentions.json"), json).unwrap();
}

fn live(store: &JsonStore) -> Vec<&Project> {
    store.projects.iter().filter(|p| !p.is_superseded()).collect()
}

fn by_company<'a>(store: &'a JsonStore, company: &str) -> &'a Project {
    live(store)
        .into_iter()
        .find(|p| p.company.as_deref() == Some(company))
        .unwrap()
}

#[test]
fn missing_mentions_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    match JsonStore::open(dir.path()) {
        Err(SitewatchError::MissingStore(path)) => assert!(path.ends_with("mentions.json")),
        other => panic!("expected MissingStore, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn full_run_commits_projects_cache_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    seed_store(dir.path());
    let geocoder = geocoder();
    let pipeline = pipeline(geocoder.clone(), RunOptions::default());

    let mut store = JsonStore::open(dir.path()).unwrap();
    let mut ctx = pipeline.context();
    let mut stats = RunStats::default();
    pipeline.run_all(&mut store, &mut ctx, &mut stats).await.unwrap();

    assert_eq!(stats.mentions_extracted, 3);
    assert_eq!(stats.projects_resolved, 2);
    assert_eq!(stats.coordinates_updated, 2);
    assert_eq!(stats.stopped_early, None);
    assert_eq!(geocoder.calls().len(), 2);

    let reopened = JsonStore::open(dir.path()).unwrap();
    assert_eq!(reopened.cards.len(), 3);
    assert_eq!(live(&reopened).len(), 2);
    assert_eq!(reopened.geocode_cache.len(), 2);

    let acme = by_company(&reopened, "Acme");
    assert_eq!(acme.mention_ids, vec!["m-1", "m-2"]);
    assert_eq!(acme.lat, Some(TAYLOR.0));
    assert_eq!(acme.lng, Some(TAYLOR.1));
    assert_eq!(acme.geocode_confidence, GeocodeConfidence::City);
    assert_eq!(acme.coordinate_history.len(), 1);
    assert!(!acme.needs_geocode);

    let blue_owl = by_company(&reopened, "Blue Owl");
    assert_eq!(blue_owl.location_text.as_deref(), Some("Hill County"));
    assert_eq!(blue_owl.geocode_confidence, GeocodeConfidence::County);

    for name in [
        EXTRACTION_REPORT,
        CANONICALIZATION_REPORT,
        RESOLUTION_REPORT,
        ACCURACY_REPORT,
        TRIAGE_REPORT,
    ] {
        assert!(dir.path().join("reports").join(format!("{name}.json")).is_file(), "{name} missing");
    }
    let accuracy = store.report(ACCURACY_REPORT).unwrap();
    assert_eq!(accuracy["incorrect"], 0);
    assert_eq!(accuracy["matched_reference"], 2);
}

#[tokio::test]
async fn second_run_is_free_and_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    seed_store(dir.path());
    let geocoder = geocoder();

    let first = pipeline(geocoder.clone(), RunOptions::default());
    let mut store = JsonStore::open(dir.path()).unwrap();
    first
        .run_all(&mut store, &mut first.context(), &mut RunStats::default())
        .await
        .unwrap();
    let before = store.projects.clone();

    let second = pipeline(geocoder.clone(), RunOptions::default());
    let mut store = JsonStore::open(dir.path()).unwrap();
    let mut stats = RunStats::default();
    second
        .run_all(&mut store, &mut second.context(), &mut stats)
        .await
        .unwrap();

    assert_eq!(stats.mentions_extracted, 0);
    assert_eq!(stats.cards_assigned, 0);
    assert_eq!(stats.coordinates_updated, 0);
    assert_eq!(geocoder.calls().len(), 2);
    assert_eq!(store.projects, before);
}

#[tokio::test]
async fn dry_run_writes_reports_but_no_data() {
    let dir = tempfile::tempdir().unwrap();
    seed_store(dir.path());
    let mentions_before = std::fs::read_to_string(dir.path().join("mentions.json")).unwrap();
    let pipeline = pipeline(
        geocoder(),
        RunOptions {
            dry_run: true,
            ..Default::default()
        },
    );

    let mut store = JsonStore::open(dir.path()).unwrap();
    let mut stats = RunStats {
        dry_run: true,
        ..Default::default()
    };
    pipeline
        .run_all(&mut store, &mut pipeline.context(), &mut stats)
        .await
        .unwrap();

    // Computed in memory...
    assert_eq!(live(&store).len(), 2);
    // ...but nothing committed.
    for file in ["cards.json", "projects.json", "geocode_cache.json"] {
        assert!(!dir.path().join(file).exists(), "{file} should not exist");
    }
    assert_eq!(
        std::fs::read_to_string(dir.path().join("mentions.json")).unwrap(),
        mentions_before
    );
    assert!(dir.path().join("reports").join(format!("{RESOLUTION_REPORT}.json")).is_file());
    assert!(stats.to_string().contains("dry run"));
}

#[tokio::test]
async fn limit_stops_a_stage_early() {
    let pipeline = pipeline(
        geocoder(),
        RunOptions {
            limit: Some(1),
            ..Default::default()
        },
    );
    let mut store = JsonStore::in_memory(mentions()).unwrap();
    let mut ctx = pipeline.context();
    let mut stats = RunStats::default();

    let outcome = pipeline.extract(&mut store, &mut ctx, &mut stats).await.unwrap();

    assert_eq!(outcome, StageOutcome::StoppedEarly(StopReason::Limit));
    assert_eq!(store.cards.len(), 1);
    assert_eq!(stats.stopped_early, Some(StopReason::Limit));
    let report = store.report(EXTRACTION_REPORT).unwrap();
    assert_eq!(report["processed"], 1);
}

#[tokio::test]
async fn elapsed_deadline_stops_before_any_work() {
    let geocoder = geocoder();
    let pipeline = pipeline(
        geocoder.clone(),
        RunOptions {
            deadline: Some(Duration::ZERO),
            ..Default::default()
        },
    );
    let mut store = JsonStore::in_memory(mentions()).unwrap();
    let mut ctx = pipeline.context();
    let mut stats = RunStats::default();

    pipeline.run_all(&mut store, &mut ctx, &mut stats).await.unwrap();

    assert_eq!(stats.stopped_early, Some(StopReason::Deadline));
    assert!(store.cards.is_empty());
    assert!(store.projects.is_empty());
    assert!(geocoder.calls().is_empty());
    // Every stage still reported.
    assert!(store.report(TRIAGE_REPORT).is_some());
}

#[tokio::test]
async fn exhausted_budget_degrades_instead_of_stopping() {
    let geocoder = geocoder();
    let pipeline = pipeline(
        geocoder.clone(),
        RunOptions {
            max_api_calls: Some(1),
            ..Default::default()
        },
    );
    let mut store = JsonStore::in_memory(mentions()).unwrap();
    let mut ctx = pipeline.context();
    let mut stats = RunStats::default();

    pipeline.extract(&mut store, &mut ctx, &mut stats).await.unwrap();
    pipeline.canonicalize(&mut store, &mut ctx, &mut stats).unwrap();
    let outcome = pipeline.resolve(&mut store, &mut ctx, &mut stats).await.unwrap();

    assert_eq!(outcome, StageOutcome::Completed);
    assert_eq!(geocoder.calls().len(), 1);
    assert!(stats.budget_exhausted);
    assert_eq!(stats.projects_resolved, 2);
    // Ordered by company: Acme got the one call.
    assert!(by_company(&store, "Acme").lat.is_some());
    assert!(by_company(&store, "Blue Owl").lat.is_none());
    let report = store.report(RESOLUTION_REPORT).unwrap();
    assert_eq!(report["degraded"], 1);
    assert_eq!(report["geocode_calls"], 1);
}

#[tokio::test]
async fn no_update_reports_without_writing_back() {
    let pipeline = pipeline(
        geocoder(),
        RunOptions {
            write_back: false,
            ..Default::default()
        },
    );
    let mut store = JsonStore::in_memory(mentions()).unwrap();
    let mut ctx = pipeline.context();
    let mut stats = RunStats::default();

    pipeline.extract(&mut store, &mut ctx, &mut stats).await.unwrap();
    pipeline.canonicalize(&mut store, &mut ctx, &mut stats).unwrap();
    pipeline.resolve(&mut store, &mut ctx, &mut stats).await.unwrap();

    assert!(live(&store).iter().all(|p| p.coordinates().is_none()));
    let report = store.report(RESOLUTION_REPORT).unwrap();
    assert_eq!(report["resolved"], 2);
    assert_eq!(report["updated"], 0);
    assert_eq!(report["write_back"], false);
    // Lookups are still cached for the next run.
    assert_eq!(store.geocode_cache.len(), 2);
}
