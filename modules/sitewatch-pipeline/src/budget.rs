use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

/// Kinds of paid external call. Cache hits and article fetches are free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidCall {
    Geocode,
    Llm,
}

/// Per-run cap on paid calls. Passed by value into the work that spends it;
/// concurrent work gets an allotment carved out of the parent and settles
/// back when done, so no shared counter is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallBudget {
    /// `None` = unlimited.
    remaining: Option<u64>,
    geocode_calls: u64,
    llm_calls: u64,
}

impl CallBudget {
    /// 0 means unlimited, matching the config convention.
    pub fn new(max_calls: u64) -> Self {
        Self {
            remaining: (max_calls > 0).then_some(max_calls),
            geocode_calls: 0,
            llm_calls: 0,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn has_budget(&self) -> bool {
        self.remaining.is_none_or(|r| r > 0)
    }

    /// Take one call. Returns false (and records nothing) when exhausted.
    pub fn try_spend(&mut self, call: PaidCall) -> bool {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return false;
            }
            *remaining -= 1;
        }
        match call {
            PaidCall::Geocode => self.geocode_calls += 1,
            PaidCall::Llm => self.llm_calls += 1,
        }
        true
    }

    /// Carve out up to `cap` calls for one unit of work.
    pub fn allot(&mut self, cap: u64) -> CallBudget {
        let granted = match self.remaining.as_mut() {
            Some(remaining) => {
                let granted = cap.min(*remaining);
                *remaining -= granted;
                granted
            }
            None => cap,
        };
        CallBudget {
            remaining: Some(granted),
            geocode_calls: 0,
            llm_calls: 0,
        }
    }

    /// Return an allotment: unspent calls go back, spent ones are counted.
    pub fn settle(&mut self, child: CallBudget) {
        if let (Some(remaining), Some(unspent)) = (self.remaining.as_mut(), child.remaining) {
            *remaining += unspent;
        }
        self.geocode_calls += child.geocode_calls;
        self.llm_calls += child.llm_calls;
    }

    pub fn spent(&self) -> u64 {
        self.geocode_calls + self.llm_calls
    }

    pub fn geocode_calls(&self) -> u64 {
        self.geocode_calls
    }

    pub fn llm_calls(&self) -> u64 {
        self.llm_calls
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    pub fn log_status(&self) {
        info!(
            geocode_calls = self.geocode_calls,
            llm_calls = self.llm_calls,
            remaining = ?self.remaining,
            "Call budget status"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Deadline,
    Limit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Deadline => write!(f, "deadline reached"),
            StopReason::Limit => write!(f, "item limit reached"),
        }
    }
}

/// How a stage ended. Stopping early is not an error: whatever finished
/// before the stop has already been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    StoppedEarly(StopReason),
}

impl StageOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, StageOutcome::Completed)
    }
}

/// Run-wide limits: wall clock, item count, paid calls. Checked between
/// items and batches, never mid-item.
#[derive(Debug)]
pub struct RunContext {
    pub budget: CallBudget,
    deadline: Option<Instant>,
    limit: Option<usize>,
    processed: usize,
}

impl RunContext {
    pub fn new(budget: CallBudget, deadline: Option<Duration>, limit: Option<usize>) -> Self {
        Self {
            budget,
            deadline: deadline.map(|d| Instant::now() + d),
            limit,
            processed: 0,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(CallBudget::unlimited(), None, None)
    }

    /// Reason to stop before starting the next item, if any. Budget
    /// exhaustion is not a stop: stages degrade to free strategies instead.
    pub fn should_stop(&self) -> Option<StopReason> {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(processed = self.processed, "Deadline reached, stopping");
            return Some(StopReason::Deadline);
        }
        if self.limit.is_some_and(|l| self.processed >= l) {
            info!(processed = self.processed, "Item limit reached, stopping");
            return Some(StopReason::Limit);
        }
        None
    }

    /// Items that may still be processed under `--limit`.
    pub fn remaining_items(&self) -> usize {
        self.limit
            .map(|l| l.saturating_sub(self.processed))
            .unwrap_or(usize::MAX)
    }

    /// Item limits count per stage; the deadline and budget span the run.
    pub fn start_stage(&mut self) {
        self.processed = 0;
    }

    pub fn record_processed(&mut self, n: usize) {
        self.processed += n;
    }

    pub fn processed(&self) -> usize {
        self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_budget_always_spends() {
        let mut budget = CallBudget::unlimited();
        for _ in 0..1000 {
            assert!(budget.try_spend(PaidCall::Geocode));
        }
        assert!(budget.has_budget());
        assert_eq!(budget.spent(), 1000);
        assert_eq!(budget.remaining(), None);
    }

    #[test]
    fn limited_budget_refuses_when_exhausted() {
        let mut budget = CallBudget::new(2);
        assert!(budget.try_spend(PaidCall::Geocode));
        assert!(budget.try_spend(PaidCall::Llm));
        assert!(!budget.try_spend(PaidCall::Geocode));
        assert!(!budget.has_budget());
        assert_eq!(budget.geocode_calls(), 1);
        assert_eq!(budget.llm_calls(), 1);
    }

    #[test]
    fn allotments_settle_back() {
        let mut parent = CallBudget::new(10);
        let mut a = parent.allot(6);
        let b = parent.allot(6);
        assert_eq!(a.remaining(), Some(6));
        assert_eq!(b.remaining(), Some(4));
        assert_eq!(parent.remaining(), Some(0));

        assert!(a.try_spend(PaidCall::Geocode));
        assert!(a.try_spend(PaidCall::Geocode));
        parent.settle(a);
        parent.settle(b);
        assert_eq!(parent.remaining(), Some(8));
        assert_eq!(parent.geocode_calls(), 2);
    }

    #[test]
    fn allotment_from_unlimited_is_capped_per_item() {
        let mut parent = CallBudget::unlimited();
        let mut child = parent.allot(1);
        assert!(child.try_spend(PaidCall::Llm));
        assert!(!child.try_spend(PaidCall::Llm));
        parent.settle(child);
        assert_eq!(parent.remaining(), None);
        assert_eq!(parent.llm_calls(), 1);
    }

    #[test]
    fn limit_stops_after_processed_items() {
        let mut ctx = RunContext::new(CallBudget::unlimited(), None, Some(2));
        assert_eq!(ctx.should_stop(), None);
        ctx.record_processed(2);
        assert_eq!(ctx.should_stop(), Some(StopReason::Limit));
        assert_eq!(ctx.remaining_items(), 0);
    }

    #[test]
    fn elapsed_deadline_stops() {
        let ctx = RunContext::new(CallBudget::unlimited(), Some(Duration::ZERO), None);
        assert_eq!(ctx.should_stop(), Some(StopReason::Deadline));
    }
}
