use std::sync::Mutex;

use ostool_common::RunStage;

/// Tracks the stage a cleanup run has reached.
///
/// Shared between the run and the deadline guard so a timeout can say where
/// the run was when it expired.
pub struct StageTracker {
    current: Mutex<RunStage>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(RunStage::Configuring),
        }
    }

    pub fn current(&self) -> RunStage {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Move to `to`. Returns false (and stays put) on a backwards transition.
    pub fn advance(&self, to: RunStage) -> bool {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        let from = *current;
        if !is_allowed(from, to) {
            tracing::warn!(%from, %to, "ignoring invalid run stage transition");
            return false;
        }
        tracing::debug!(%from, %to, "run stage transition");
        *current = to;
        true
    }
}

fn is_allowed(from: RunStage, to: RunStage) -> bool {
    use RunStage::*;
    matches!(
        (from, to),
        (Configuring, Authenticating)
            | (Authenticating, ResolvingHypervisor)
            | (ResolvingHypervisor, FetchingInventories)
            | (FetchingInventories, Reconciling)
            | (Reconciling, Reporting)
            | (Reporting, Idle)
            | (Reporting, Cleaning)
            | (Idle, Done)
            | (Cleaning, Done)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cleaning_path() {
        let t = StageTracker::new();
        assert_eq!(t.current(), RunStage::Configuring);
        for stage in [
            RunStage::Authenticating,
            RunStage::ResolvingHypervisor,
            RunStage::FetchingInventories,
            RunStage::Reconciling,
            RunStage::Reporting,
            RunStage::Cleaning,
            RunStage::Done,
        ] {
            assert!(t.advance(stage), "transition to {stage} rejected");
        }
        assert_eq!(t.current(), RunStage::Done);
    }

    #[test]
    fn idle_path_and_rejected_jumps() {
        let t = StageTracker::new();
        assert!(!t.advance(RunStage::Reconciling));
        assert_eq!(t.current(), RunStage::Configuring);

        t.advance(RunStage::Authenticating);
        t.advance(RunStage::ResolvingHypervisor);
        t.advance(RunStage::FetchingInventories);
        t.advance(RunStage::Reconciling);
        t.advance(RunStage::Reporting);
        assert!(t.advance(RunStage::Idle));
        assert!(!t.advance(RunStage::Cleaning));
        assert!(t.advance(RunStage::Done));
    }
}
