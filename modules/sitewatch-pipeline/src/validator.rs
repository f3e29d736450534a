//! Sanity checks for assigned coordinates against the reference centroid
//! table.

use std::collections::HashMap;

use sitewatch_common::config::Thresholds;
use sitewatch_common::text::normalize_place;
use sitewatch_common::{Coordinates, FileConfig, Project, ReferencePoint, Severity, ValidationIssue};
use tracing::debug;

/// Result of comparing one coordinate with the place its text names.
#[derive(Debug, Clone, PartialEq)]
pub struct Check<'a> {
    pub reference: &'a ReferencePoint,
    pub distance_km: f64,
    pub severity: Option<Severity>,
}

/// Output of one validation pass over every live project.
#[derive(Debug, Clone, Default)]
pub struct ValidationPass {
    /// Live projects with a coordinate.
    pub checked: usize,
    /// Of those, how many named a place in the reference table.
    pub matched: usize,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationPass {
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn severity_of(&self, project: &Project) -> Option<Severity> {
        self.issues
            .iter()
            .find(|i| i.project_id == project.project_id)
            .map(|i| i.severity)
    }
}

#[derive(Debug, Clone)]
pub struct CoordinateValidator {
    references: HashMap<String, ReferencePoint>,
    state_names: Vec<String>,
    questionable_km: f64,
    incorrect_km: f64,
}

impl CoordinateValidator {
    pub fn new(references: &[ReferencePoint], state_names: &[String], thresholds: &Thresholds) -> Self {
        Self {
            references: references.iter().map(|r| (r.key(), r.clone())).collect(),
            state_names: state_names.to_vec(),
            questionable_km: thresholds.questionable_km,
            incorrect_km: thresholds.incorrect_km,
        }
    }

    pub fn from_config(config: &FileConfig) -> Self {
        Self::new(&config.references, &config.region.state_names, &config.thresholds)
    }

    /// The reference a location names. The whole text is tried first, then
    /// each comma-separated part ("Taylor, Williamson County").
    pub fn reference_for(&self, location_text: &str) -> Option<&ReferencePoint> {
        let whole = normalize_place(location_text, &self.state_names);
        if let Some(found) = self.references.get(&whole) {
            return Some(found);
        }
        location_text
            .split(',')
            .map(|part| normalize_place(part, &self.state_names))
            .filter(|key| !key.is_empty())
            .find_map(|key| self.references.get(&key))
    }

    pub fn classify(&self, distance_km: f64) -> Option<Severity> {
        if distance_km > self.incorrect_km {
            Some(Severity::Incorrect)
        } else if distance_km > self.questionable_km {
            Some(Severity::Questionable)
        } else {
            None
        }
    }

    /// `None` when the text names nothing in the reference table.
    pub fn check(&self, location_text: Option<&str>, coords: Coordinates) -> Option<Check<'_>> {
        let reference = self.reference_for(location_text?)?;
        let distance_km = coords.distance_km(&reference.coordinates());
        Some(Check {
            reference,
            distance_km,
            severity: self.classify(distance_km),
        })
    }

    /// Site hints are carried into the issue for the reviewer; they never
    /// suppress it.
    pub fn validate(&self, project: &Project) -> Option<ValidationIssue> {
        let coords = project.coordinates()?;
        let check = self.check(project.location_text.as_deref(), coords)?;
        let severity = check.severity?;
        debug!(
            project_id = %project.project_id,
            %severity,
            distance_km = check.distance_km,
            reference = %check.reference.name,
            "Coordinate disagrees with stated location"
        );
        Some(ValidationIssue {
            project_id: project.project_id,
            severity,
            distance_km: check.distance_km,
            expected_reference: check.reference.name.clone(),
            current_coords: coords,
            location_text: project.location_text.clone(),
            site_hint: project.site_hint.clone(),
        })
    }

    /// Issues are ordered worst first, then by distance.
    pub fn validate_all(&self, projects: &[Project]) -> ValidationPass {
        let mut pass = ValidationPass::default();
        for project in projects.iter().filter(|p| !p.is_superseded()) {
            let Some(coords) = project.coordinates() else { continue };
            pass.checked += 1;
            if self.check(project.location_text.as_deref(), coords).is_some() {
                pass.matched += 1;
            }
            pass.issues.extend(self.validate(project));
        }
        pass.issues.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then(b.distance_km.total_cmp(&a.distance_km))
                .then(a.project_id.cmp(&b.project_id))
        });
        pass
    }
}

#[cfg(test)]
mod tests {
    use sitewatch_common::{GeocodeConfidence, GeocodeStrategy, ReferenceKind};

    use super::*;

    fn validator() -> CoordinateValidator {
        CoordinateValidator::new(
            &[
                ReferencePoint {
                    name: "Austin".into(),
                    kind: ReferenceKind::City,
                    lat: 30.2672,
                    lng: -97.7431,
                },
                ReferencePoint {
                    name: "Hill".into(),
                    kind: ReferenceKind::County,
                    lat: 32.0,
                    lng: -97.13,
                },
            ],
            &["Texas".into(), "TX".into()],
            &Thresholds::default(),
        )
    }

    fn project_at(location: &str, lat: f64, lng: f64) -> Project {
        let mut p = Project::new(location, 0);
        p.location_text = Some(location.into());
        p.apply_coordinates(Coordinates::new(lat, lng), GeocodeConfidence::City, GeocodeStrategy::Geocoder, "test");
        p
    }

    #[test]
    fn severity_bands() {
        // Calibration: questionable above 5 km, incorrect above 20 km.
        let v = validator();
        assert_eq!(v.classify(4.9), None);
        assert_eq!(v.classify(5.1), Some(Severity::Questionable));
        assert_eq!(v.classify(20.0), Some(Severity::Questionable));
        assert_eq!(v.classify(20.1), Some(Severity::Incorrect));
    }

    #[test]
    fn county_and_city_of_the_same_name_are_distinct() {
        let v = validator();
        assert_eq!(v.reference_for("Hill County").map(|r| r.name.as_str()), Some("Hill"));
        assert!(v.reference_for("Hill").is_none());
        assert!(v.reference_for("Austin County").is_none());
        assert_eq!(v.reference_for("Austin, TX").map(|r| r.name.as_str()), Some("Austin"));
    }

    #[test]
    fn comma_parts_are_tried() {
        let v = validator();
        assert_eq!(
            v.reference_for("Mueller, Austin").map(|r| r.name.as_str()),
            Some("Austin")
        );
    }

    #[test]
    fn unmatched_locations_are_not_issues() {
        let v = validator();
        let pass = v.validate_all(&[project_at("Marfa", 30.3, -104.0)]);
        assert_eq!(pass.checked, 1);
        assert_eq!(pass.matched, 0);
        assert!(pass.issues.is_empty());
    }

    #[test]
    fn site_hint_is_surfaced_not_suppressing() {
        let v = validator();
        let mut p = project_at("Austin", 30.36, -97.74);
        p.site_hint = Some("Robinson Ranch".into());
        let issue = v.validate(&p).unwrap();
        assert_eq!(issue.severity, Severity::Questionable);
        assert_eq!(issue.site_hint.as_deref(), Some("Robinson Ranch"));
    }

    #[test]
    fn superseded_projects_are_skipped() {
        let v = validator();
        let mut p = project_at("Austin", 31.5, -97.74);
        p.superseded_by = Some(uuid::Uuid::nil());
        assert_eq!(v.validate_all(&[p]).checked, 0);
    }
}
