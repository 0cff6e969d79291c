//! Decides what, if anything, to push to a tracker after local playback.
//!
//! Pure function of the remote state, the local observation, and policy.
//! Every call yields at most one update.

use chrono::NaiveDate;
use kiroku_api::traits::{WatchState, WatchStatus};

/// Local playback facts for one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub progress: u32,
    pub total: Option<u32>,
}

impl Observation {
    pub fn new(progress: u32, total: Option<u32>) -> Self {
        // A total of 0 is how hosts spell "unknown".
        let total = total.filter(|t| *t > 0);
        let progress = match total {
            Some(total) => progress.min(total),
            None => progress,
        };
        Self { progress, total }
    }

    fn finished(&self) -> bool {
        self.total.is_some_and(|t| self.progress >= t)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Re-open a Completed entry as a new watch cycle when playback restarts.
    pub rewatch_completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    NotAhead,
    RewatchDisabled,
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Push(WatchState),
    NoOp(NoOpReason),
}

/// Compare the remote state with local progress and pick the update.
///
/// `today` stamps started/completed dates.
pub fn reconcile(
    remote: Option<&WatchState>,
    observed: Observation,
    policy: ReconcilePolicy,
    today: NaiveDate,
) -> Decision {
    let Some(remote) = remote else {
        return first_entry(observed, today);
    };

    if remote.status == WatchStatus::Completed {
        return completed_entry(remote, observed, policy, today);
    }

    if observed.progress <= remote.progress {
        return Decision::NoOp(NoOpReason::NotAhead);
    }

    let mut next = remote.clone();
    next.progress = observed.progress;

    if observed.finished() {
        next.status = WatchStatus::Completed;
        next.completed_at = Some(today);
    } else if remote.status == WatchStatus::Planning {
        next.status = WatchStatus::Watching;
        next.started_at.get_or_insert(today);
    }

    Decision::Push(next)
}

fn first_entry(observed: Observation, today: NaiveDate) -> Decision {
    let mut state = WatchState::new(WatchStatus::Watching, observed.progress);
    state.started_at = Some(today);
    if observed.finished() {
        state.status = WatchStatus::Completed;
        state.completed_at = Some(today);
    }
    Decision::Push(state)
}

/// A completed entry only moves again when playback restarted below the
/// recorded progress, which is read as a rewatch.
fn completed_entry(
    remote: &WatchState,
    observed: Observation,
    policy: ReconcilePolicy,
    today: NaiveDate,
) -> Decision {
    let restarted = observed.progress > 0 && observed.progress < remote.progress;
    if !restarted {
        return Decision::NoOp(NoOpReason::NotAhead);
    }
    if !policy.rewatch_completed {
        return Decision::NoOp(NoOpReason::RewatchDisabled);
    }

    Decision::Push(WatchState {
        status: WatchStatus::Watching,
        progress: observed.progress,
        repeat_count: remote.repeat_count.saturating_add(1),
        started_at: Some(today),
        completed_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn remote(status: WatchStatus, progress: u32) -> WatchState {
        WatchState {
            status,
            progress,
            repeat_count: 1,
            started_at: NaiveDate::from_ymd_opt(2024, 1, 1),
            completed_at: None,
        }
    }

    const POLICY: ReconcilePolicy = ReconcilePolicy {
        rewatch_completed: false,
    };

    #[test]
    fn test_new_entry_watching() {
        let decision = reconcile(None, Observation::new(3, Some(12)), POLICY, today());
        let Decision::Push(state) = decision else {
            panic!("expected push, got {decision:?}");
        };
        assert_eq!(state.status, WatchStatus::Watching);
        assert_eq!(state.progress, 3);
        assert_eq!(state.repeat_count, 0);
        assert_eq!(state.started_at, Some(today()));
        assert_eq!(state.completed_at, None);
    }

    #[test]
    fn test_new_entry_unknown_total_stays_watching() {
        let decision = reconcile(None, Observation::new(500, None), POLICY, today());
        assert!(matches!(decision, Decision::Push(s) if s.status == WatchStatus::Watching && s.progress == 500));
    }

    #[test]
    fn test_new_entry_finished_is_completed_with_total() {
        let decision = reconcile(None, Observation::new(14, Some(12)), POLICY, today());
        let Decision::Push(state) = decision else {
            panic!("expected push");
        };
        assert_eq!(state.status, WatchStatus::Completed);
        assert_eq!(state.progress, 12);
        assert_eq!(state.completed_at, Some(today()));
    }

    #[test]
    fn test_new_entry_at_zero_progress_is_created() {
        let decision = reconcile(None, Observation::new(0, Some(12)), POLICY, today());
        let Decision::Push(state) = decision else {
            panic!("expected push, got {decision:?}");
        };
        assert_eq!(state.status, WatchStatus::Watching);
        assert_eq!(state.progress, 0);
        assert_eq!(state.repeat_count, 0);
        assert_eq!(state.started_at, Some(today()));
    }

    #[test]
    fn test_progress_not_ahead_is_noop() {
        for status in [WatchStatus::Watching, WatchStatus::Paused, WatchStatus::Dropped] {
            for observed in [0, 4, 5] {
                assert_eq!(
                    reconcile(Some(&remote(status, 5)), Observation::new(observed, Some(12)), POLICY, today()),
                    Decision::NoOp(NoOpReason::NotAhead),
                    "{status:?} observed {observed}"
                );
            }
        }
    }

    #[test]
    fn test_progress_ahead_keeps_status() {
        let current = remote(WatchStatus::Paused, 5);
        let decision = reconcile(Some(&current), Observation::new(6, Some(12)), POLICY, today());
        let Decision::Push(state) = decision else {
            panic!("expected push");
        };
        assert_eq!(state.status, WatchStatus::Paused);
        assert_eq!(state.progress, 6);
        assert_eq!(state.repeat_count, 1);
        assert_eq!(state.started_at, current.started_at);
    }

    #[test]
    fn test_reaching_total_promotes_to_completed() {
        let current = remote(WatchStatus::Watching, 11);
        let decision = reconcile(Some(&current), Observation::new(12, Some(12)), POLICY, today());
        let Decision::Push(state) = decision else {
            panic!("expected push");
        };
        assert_eq!(state.status, WatchStatus::Completed);
        assert_eq!(state.progress, 12);
        assert_eq!(state.completed_at, Some(today()));
        assert_eq!(state.repeat_count, 1);
    }

    #[test]
    fn test_planning_starts_watching() {
        let mut current = remote(WatchStatus::Planning, 0);
        current.started_at = None;
        let decision = reconcile(Some(&current), Observation::new(1, Some(12)), POLICY, today());
        let Decision::Push(state) = decision else {
            panic!("expected push");
        };
        assert_eq!(state.status, WatchStatus::Watching);
        assert_eq!(state.started_at, Some(today()));
    }

    #[test]
    fn test_repeating_finish_completes() {
        let current = remote(WatchStatus::Repeating, 11);
        let decision = reconcile(Some(&current), Observation::new(12, Some(12)), POLICY, today());
        assert!(matches!(decision, Decision::Push(s) if s.status == WatchStatus::Completed && s.repeat_count == 1));
    }

    #[test]
    fn test_completed_rewatch_disabled() {
        let current = remote(WatchStatus::Completed, 12);
        assert_eq!(
            reconcile(Some(&current), Observation::new(1, Some(12)), POLICY, today()),
            Decision::NoOp(NoOpReason::RewatchDisabled)
        );
    }

    #[test]
    fn test_completed_rewatch_enabled() {
        let mut current = remote(WatchStatus::Completed, 12);
        current.completed_at = NaiveDate::from_ymd_opt(2024, 2, 1);
        let policy = ReconcilePolicy {
            rewatch_completed: true,
        };

        let decision = reconcile(Some(&current), Observation::new(1, Some(12)), policy, today());
        assert_eq!(
            decision,
            Decision::Push(WatchState {
                status: WatchStatus::Watching,
                progress: 1,
                repeat_count: 2,
                started_at: Some(today()),
                completed_at: None,
            })
        );
    }

    #[test]
    fn test_completed_replay_of_finale_is_noop() {
        let current = remote(WatchStatus::Completed, 12);
        let policy = ReconcilePolicy {
            rewatch_completed: true,
        };
        assert_eq!(
            reconcile(Some(&current), Observation::new(12, Some(12)), policy, today()),
            Decision::NoOp(NoOpReason::NotAhead)
        );
    }

    #[test]
    fn test_rewatch_count_saturates() {
        let mut current = remote(WatchStatus::Completed, 12);
        current.repeat_count = u32::MAX;
        let policy = ReconcilePolicy {
            rewatch_completed: true,
        };
        let decision = reconcile(Some(&current), Observation::new(2, Some(12)), policy, today());
        assert!(matches!(decision, Decision::Push(s) if s.repeat_count == u32::MAX));
    }
}
