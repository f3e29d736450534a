use serde::Serialize;

use crate::budget::{CallBudget, StageOutcome, StopReason};

/// Counters for one CLI invocation, across however many stages it ran.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    pub mentions_extracted: u32,
    pub articles_fetched: u32,
    pub cards_assigned: u32,
    pub projects_created: u32,
    pub projects_absorbed: u32,
    pub projects_resolved: u32,
    pub coordinates_updated: u32,
    pub coordinates_downgraded: u32,
    pub flagged_for_review: u32,
    pub unresolved: u32,
    pub validation_incorrect: u32,
    pub validation_questionable: u32,
    pub triaged: u32,
    pub triage_improved: u32,
    pub failed: u32,
    pub geocode_calls: u64,
    pub llm_calls: u64,
    pub budget_exhausted: bool,
    pub stopped_early: Option<StopReason>,
    pub dry_run: bool,
}

impl RunStats {
    pub fn record_outcome(&mut self, outcome: StageOutcome) {
        if let StageOutcome::StoppedEarly(reason) = outcome {
            self.stopped_early.get_or_insert(reason);
        }
    }

    pub fn record_budget(&mut self, budget: &CallBudget) {
        self.geocode_calls = budget.geocode_calls();
        self.llm_calls = budget.llm_calls();
        self.budget_exhausted = !budget.has_budget();
    }

    pub fn processed(&self) -> u32 {
        self.mentions_extracted + self.projects_resolved + self.triaged
    }

    pub fn updated(&self) -> u32 {
        self.coordinates_updated + self.triage_improved
    }

    pub fn flagged(&self) -> u32 {
        self.flagged_for_review + self.validation_incorrect + self.validation_questionable
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stopped_early {
            Some(reason) => writeln!(f, "\n=== Sitewatch Run Stopped Early ({reason}) ===")?,
            None => writeln!(f, "\n=== Sitewatch Run Complete ===")?,
        }
        if self.dry_run {
            writeln!(f, "(dry run: nothing was saved)")?;
        }
        writeln!(f, "Processed:          {}", self.processed())?;
        writeln!(f, "Updated:            {}", self.updated())?;
        writeln!(f, "Flagged:            {}", self.flagged())?;
        writeln!(f, "Failed:             {}", self.failed)?;
        writeln!(f, "\nExtraction:")?;
        writeln!(f, "  Mentions:         {}", self.mentions_extracted)?;
        writeln!(f, "  Articles fetched: {}", self.articles_fetched)?;
        writeln!(f, "\nCanonicalization:")?;
        writeln!(f, "  Cards assigned:   {}", self.cards_assigned)?;
        writeln!(f, "  Projects created: {}", self.projects_created)?;
        writeln!(f, "  Merged away:      {}", self.projects_absorbed)?;
        writeln!(f, "\nResolution:")?;
        writeln!(f, "  Projects:         {}", self.projects_resolved)?;
        writeln!(f, "  Coords updated:   {}", self.coordinates_updated)?;
        writeln!(f, "  Downgrades:       {}", self.coordinates_downgraded)?;
        writeln!(f, "  Held for review:  {}", self.flagged_for_review)?;
        writeln!(f, "  Unresolved:       {}", self.unresolved)?;
        writeln!(f, "\nValidation:")?;
        writeln!(f, "  Incorrect:        {}", self.validation_incorrect)?;
        writeln!(f, "  Questionable:     {}", self.validation_questionable)?;
        writeln!(f, "\nTriage:")?;
        writeln!(f, "  Projects:         {}", self.triaged)?;
        writeln!(f, "  Improved:         {}", self.triage_improved)?;
        writeln!(f, "\nPaid calls:")?;
        writeln!(f, "  Geocoder:         {}", self.geocode_calls)?;
        write!(f, "  LLM:              {}", self.llm_calls)?;
        if self.budget_exhausted {
            write!(f, "\n  (budget exhausted; remaining work used free strategies only)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_stop_reason_is_kept() {
        let mut stats = RunStats::default();
        stats.record_outcome(StageOutcome::Completed);
        stats.record_outcome(StageOutcome::StoppedEarly(StopReason::Limit));
        stats.record_outcome(StageOutcome::StoppedEarly(StopReason::Deadline));
        assert_eq!(stats.stopped_early, Some(StopReason::Limit));
        assert!(stats.to_string().contains("Stopped Early (item limit reached)"));
    }

    #[test]
    fn summary_totals() {
        let stats = RunStats {
            mentions_extracted: 4,
            projects_resolved: 2,
            coordinates_updated: 1,
            flagged_for_review: 1,
            validation_incorrect: 1,
            ..Default::default()
        };
        assert_eq!(stats.processed(), 6);
        assert_eq!(stats.updated(), 1);
        assert_eq!(stats.flagged(), 2);
    }
}
