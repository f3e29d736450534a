//! When a freshly resolved coordinate may replace the one a project holds.

use serde::Serialize;
use sitewatch_common::config::Thresholds;
use sitewatch_common::{Coordinates, GeocodeCandidate, GeocodeConfidence, Severity};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum UpdateDecision {
    /// Write the candidate to the project.
    Adopt { reason: String },
    /// The current coordinate stands.
    Keep { reason: String },
    /// Plausible but not safe to apply unattended.
    Review { reason: String },
}

impl UpdateDecision {
    pub fn reason(&self) -> &str {
        match self {
            UpdateDecision::Adopt { reason } | UpdateDecision::Keep { reason } | UpdateDecision::Review { reason } => {
                reason
            }
        }
    }

    pub fn is_review(&self) -> bool {
        matches!(self, UpdateDecision::Review { .. })
    }
}

/// Everything the policy looks at for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct Proposal<'a> {
    pub existing: Option<(Coordinates, GeocodeConfidence)>,
    /// Validator verdict on the coordinate the project holds now.
    pub existing_issue: Option<Severity>,
    pub candidate: &'a GeocodeCandidate,
    /// Validator verdict on the candidate, checked against the same text.
    pub candidate_issue: Option<Severity>,
    pub has_site_hint: bool,
}

#[derive(Debug, Clone)]
pub struct UpdatePolicy {
    thresholds: Thresholds,
}

impl UpdatePolicy {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn decide(&self, p: &Proposal<'_>) -> UpdateDecision {
        let t = &self.thresholds;
        let new = p.candidate.coordinates;
        let new_conf = p.candidate.confidence;

        // A candidate the validator calls incorrect is never written, not
        // even as a first coordinate.
        if p.candidate_issue == Some(Severity::Incorrect) {
            return UpdateDecision::Review {
                reason: format!("{} result for {:?} fails validation", p.candidate.strategy, p.candidate.text_span),
            };
        }

        let (old, old_conf) = match p.existing {
            Some((old, old_conf)) if old_conf != GeocodeConfidence::Unknown => (old, old_conf),
            _ => {
                return UpdateDecision::Adopt {
                    reason: format!("first {new_conf} coordinate from {:?}", p.candidate.text_span),
                };
            }
        };

        let distance = old.distance_km(&new);
        if distance <= t.move_threshold_km {
            return if new_conf > old_conf {
                UpdateDecision::Adopt {
                    reason: format!("refines {old_conf} to {new_conf} at the same place"),
                }
            } else {
                UpdateDecision::Keep {
                    reason: format!("within {} km of the current coordinate", t.move_threshold_km),
                }
            };
        }

        // Every replacement has to validate cleanly. A named site explains a
        // questionable distance; nothing else does.
        let clean = match p.candidate_issue {
            None => true,
            Some(Severity::Questionable) => p.has_site_hint,
            Some(Severity::Incorrect) => false,
        };
        if !clean {
            return UpdateDecision::Review {
                reason: format!("replacement {distance:.1} km away is questionable against the stated location"),
            };
        }

        if p.existing_issue == Some(Severity::Incorrect) {
            return UpdateDecision::Adopt {
                reason: downgrade_note("replaces a coordinate that failed validation".into(), old_conf, new_conf),
            };
        }

        if old_conf.is_coarse() {
            return if distance <= t.review_km {
                UpdateDecision::Adopt {
                    reason: downgrade_note(format!("replaces coarse {old_conf} coordinate"), old_conf, new_conf),
                }
            } else {
                UpdateDecision::Review {
                    reason: format!("{distance:.1} km from the coarse coordinate, beyond {} km", t.review_km),
                }
            };
        }

        if new_conf < old_conf {
            return UpdateDecision::Keep {
                reason: format!("{new_conf} result would downgrade the {old_conf} coordinate"),
            };
        }

        if distance <= t.auto_adopt_km {
            UpdateDecision::Adopt {
                reason: format!("moved {distance:.1} km to a materially different {new_conf} location"),
            }
        } else {
            UpdateDecision::Review {
                reason: format!("{distance:.1} km move exceeds the {} km auto-adopt band", t.auto_adopt_km),
            }
        }
    }
}

fn downgrade_note(reason: String, from: GeocodeConfidence, to: GeocodeConfidence) -> String {
    if to < from {
        format!("{reason}; downgrades {from} to {to}")
    } else {
        reason
    }
}

#[cfg(test)]
mod tests {
    use sitewatch_common::GeocodeStrategy;

    use super::*;

    const TAYLOR: Coordinates = Coordinates {
        lat: 30.5708,
        lng: -97.4094,
    };

    fn candidate(lat: f64, lng: f64, confidence: GeocodeConfidence) -> GeocodeCandidate {
        GeocodeCandidate {
            text_span: "Taylor".into(),
            strategy: GeocodeStrategy::Geocoder,
            coordinates: Coordinates::new(lat, lng),
            confidence,
            source_snippet: None,
        }
    }

    fn decide(
        existing: Option<(Coordinates, GeocodeConfidence)>,
        existing_issue: Option<Severity>,
        candidate: &GeocodeCandidate,
        candidate_issue: Option<Severity>,
    ) -> UpdateDecision {
        UpdatePolicy::new(Thresholds::default()).decide(&Proposal {
            existing,
            existing_issue,
            candidate,
            candidate_issue,
            has_site_hint: false,
        })
    }

    #[test]
    fn first_coordinate_is_adopted() {
        let c = candidate(30.57, -97.41, GeocodeConfidence::City);
        assert!(matches!(decide(None, None, &c, None), UpdateDecision::Adopt { .. }));
    }

    #[test]
    fn incorrect_candidate_is_never_adopted() {
        let c = candidate(30.57, -97.41, GeocodeConfidence::Address);
        assert!(decide(None, None, &c, Some(Severity::Incorrect)).is_review());
    }

    #[test]
    fn same_place_only_refines() {
        let better = candidate(30.5712, -97.4090, GeocodeConfidence::Address);
        let worse = candidate(30.5712, -97.4090, GeocodeConfidence::County);
        let existing = Some((TAYLOR, GeocodeConfidence::City));
        assert!(matches!(decide(existing, None, &better, None), UpdateDecision::Adopt { .. }));
        assert!(matches!(decide(existing, None, &worse, None), UpdateDecision::Keep { .. }));
    }

    #[test]
    fn coarse_coordinates_are_replaced_within_review_band() {
        // Calibration: review_km = 40.
        let existing = Some((Coordinates::new(30.65, -97.60), GeocodeConfidence::County));
        let c = candidate(30.5708, -97.4094, GeocodeConfidence::City);
        assert!(matches!(decide(existing, None, &c, None), UpdateDecision::Adopt { .. }));

        let far = candidate(32.7767, -96.7970, GeocodeConfidence::City);
        assert!(decide(existing, None, &far, None).is_review());
    }

    #[test]
    fn specific_coordinates_move_only_within_auto_adopt_band() {
        // Calibration: auto_adopt_km = 5.
        let existing = Some((TAYLOR, GeocodeConfidence::City));
        let near = candidate(30.60, -97.40, GeocodeConfidence::Address);
        let far = candidate(30.75, -97.40, GeocodeConfidence::Address);
        assert!(matches!(decide(existing, None, &near, None), UpdateDecision::Adopt { .. }));
        assert!(decide(existing, None, &far, None).is_review());
    }

    #[test]
    fn questionable_replacement_needs_a_site_hint() {
        let existing = Some((Coordinates::new(30.70, -97.60), GeocodeConfidence::County));
        let c = candidate(30.60, -97.40, GeocodeConfidence::Address);
        assert!(decide(existing, None, &c, Some(Severity::Questionable)).is_review());

        let hinted = UpdatePolicy::new(Thresholds::default()).decide(&Proposal {
            existing,
            existing_issue: None,
            candidate: &c,
            candidate_issue: Some(Severity::Questionable),
            has_site_hint: true,
        });
        assert!(matches!(hinted, UpdateDecision::Adopt { .. }));
    }

    #[test]
    fn incorrect_coordinate_is_replaced_by_a_clean_one() {
        let existing = Some((Coordinates::new(29.76, -95.37), GeocodeConfidence::City));
        let c = candidate(30.5708, -97.4094, GeocodeConfidence::City);
        assert!(decide(existing, None, &c, None).is_review());
        assert!(matches!(
            decide(existing, Some(Severity::Incorrect), &c, None),
            UpdateDecision::Adopt { .. }
        ));

        // Even past the review band of a coarse coordinate.
        let coarse = Some((Coordinates::new(32.39, -97.13), GeocodeConfidence::County));
        let county = candidate(31.99, -97.13, GeocodeConfidence::County);
        assert!(decide(coarse, None, &county, None).is_review());
        assert!(matches!(
            decide(coarse, Some(Severity::Incorrect), &county, None),
            UpdateDecision::Adopt { .. }
        ));
    }

    #[test]
    fn downgrades_out_of_a_specific_tier_are_refused() {
        let existing = Some((TAYLOR, GeocodeConfidence::Address));
        let c = candidate(30.60, -97.40, GeocodeConfidence::City);
        assert!(matches!(decide(existing, None, &c, None), UpdateDecision::Keep { .. }));
    }
}
