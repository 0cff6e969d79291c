use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use kiroku_api::error::ApiError;
use kiroku_api::traits::{AnimeTracker, Provider};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{PlaybackEvent, SyncOutcome, SyncRequest};
use crate::queue::SyncHandler;
use crate::reconcile::{reconcile, Decision, Observation, ReconcilePolicy};
use crate::resolver::{IdentityResolver, LocalSeries};

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Pushes playback to every tracker account configured for the user.
///
/// Per account: resolve the series, look up the account, load the remote
/// entry, reconcile, and issue at most one update.
pub struct SyncService<T> {
    resolver: IdentityResolver,
    accounts: HashMap<String, Vec<T>>,
    policy: ReconcilePolicy,
    today: Clock,
    cancel: CancellationToken,
}

impl<T: AnimeTracker> SyncService<T> {
    pub fn new(resolver: IdentityResolver, policy: ReconcilePolicy) -> Self {
        Self {
            resolver,
            accounts: HashMap::new(),
            policy,
            today: Arc::new(|| Utc::now().date_naive()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_account(mut self, user_id: impl Into<String>, tracker: T) -> Self {
        self.add_account(user_id, tracker);
        self
    }

    /// Date source for started/completed stamps.
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    /// Update calls are skipped once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn add_account(&mut self, user_id: impl Into<String>, tracker: T) {
        self.accounts.entry(user_id.into()).or_default().push(tracker);
    }

    pub fn accounts(&self, user_id: &str) -> &[T] {
        self.accounts.get(user_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Sync one playback event against all of the user's accounts.
    pub async fn sync_event(&self, event: &PlaybackEvent) -> Vec<SyncOutcome> {
        let accounts = self.accounts(&event.user_id);
        if accounts.is_empty() {
            debug!(user = %event.user_id, "no tracker accounts configured");
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(accounts.len());
        for tracker in accounts {
            let outcome = self.sync_account(tracker, event).await;
            log_outcome(event, &outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn sync_account(&self, tracker: &T, event: &PlaybackEvent) -> SyncOutcome {
        let provider = tracker.provider();
        let local = LocalSeries {
            item_id: &event.item_id,
            anidb_id: event.anidb_id,
            title: &event.title,
        };

        let identity = match self.resolver.resolve(tracker, local).await {
            Ok(identity) => identity,
            Err(e) => {
                return SyncOutcome::Unresolved {
                    provider,
                    reason: e.to_string(),
                }
            }
        };
        let remote_id = identity.remote_id;

        let user = match tracker.get_user().await {
            Ok(user) => user,
            Err(e) => return failed(provider, "get_user", e),
        };

        let remote = match tracker.get_list_entry(&user, remote_id).await {
            Ok(remote) => remote,
            Err(e) => return failed(provider, "get_list_entry", e),
        };

        let observed = Observation::new(event.progress, event.total_episodes);
        let state = match reconcile(remote.as_ref(), observed, self.policy, (self.today)()) {
            Decision::Push(state) => state,
            Decision::NoOp(reason) => {
                debug!(%provider, remote_id, ?reason, "nothing to push");
                return SyncOutcome::NoChange {
                    provider,
                    remote_id,
                };
            }
        };

        if self.cancel.is_cancelled() {
            return SyncOutcome::Failed {
                provider,
                reason: "cancelled before update".into(),
            };
        }

        match tracker.update_status(&user, remote_id, &state).await {
            Ok(()) => SyncOutcome::Updated {
                provider,
                remote_id,
                state,
            },
            Err(e) => failed(provider, "update_status", e),
        }
    }
}

impl<T: AnimeTracker> SyncHandler for SyncService<T> {
    async fn process(&self, request: &SyncRequest) -> Vec<SyncOutcome> {
        self.sync_event(&request.event).await
    }
}

fn failed(provider: Provider, step: &str, error: ApiError) -> SyncOutcome {
    SyncOutcome::Failed {
        provider,
        reason: format!("{step}: {error}"),
    }
}

fn log_outcome(event: &PlaybackEvent, outcome: &SyncOutcome) {
    let user = event.user_id.as_str();
    let item = event.item_id.as_str();
    match outcome {
        SyncOutcome::Updated {
            provider,
            remote_id,
            state,
        } => info!(
            user,
            item,
            %provider,
            remote_id,
            status = %state.status,
            progress = state.progress,
            "tracker updated"
        ),
        SyncOutcome::NoChange {
            provider,
            remote_id,
        } => debug!(user, item, %provider, remote_id, "tracker already current"),
        SyncOutcome::Unresolved { provider, reason } => {
            warn!(user, item, %provider, reason = %reason, "series not resolved")
        }
        SyncOutcome::Failed { provider, reason } => {
            warn!(user, item, %provider, reason = %reason, "tracker sync failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kiroku_api::traits::{WatchState, WatchStatus};

    use super::*;
    use crate::crossref::{CrossReferenceDb, CrossReferenceRecord, CrossReferenceStore};
    use crate::queue::SyncQueue;
    use crate::testing::{media, FakeTracker};
    use crate::throttle::Throttle;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn resolver() -> IdentityResolver {
        let db = CrossReferenceDb::from_records([CrossReferenceRecord {
            anidb_id: Some(500),
            anilist_id: Some(9000),
            kitsu_id: Some(42),
            ..Default::default()
        }]);
        IdentityResolver::new(Arc::new(CrossReferenceStore::fixed(db)))
    }

    fn build(policy: ReconcilePolicy) -> SyncService<FakeTracker> {
        SyncService::new(resolver(), policy).with_clock(today)
    }

    fn event(progress: u32) -> PlaybackEvent {
        PlaybackEvent {
            user_id: "alice".into(),
            item_id: "item-500".into(),
            anidb_id: Some(500),
            title: "Local Title".into(),
            progress,
            total_episodes: Some(12),
            planned: false,
        }
    }

    #[tokio::test]
    async fn test_finished_series_without_remote_entry() {
        let tracker = FakeTracker::new(Provider::AniList);
        let service = build(ReconcilePolicy::default()).with_account("alice", tracker.clone());

        let outcomes = service.sync_event(&event(12)).await;

        let expected = WatchState {
            status: WatchStatus::Completed,
            progress: 12,
            repeat_count: 0,
            started_at: Some(today()),
            completed_at: Some(today()),
        };
        assert_eq!(tracker.updates(), vec![(9000, expected.clone())]);
        assert_eq!(
            outcomes,
            vec![SyncOutcome::Updated {
                provider: Provider::AniList,
                remote_id: 9000,
                state: expected,
            }]
        );
        assert!(tracker.searches().is_empty());
    }

    #[tokio::test]
    async fn test_remote_ahead_sends_nothing() {
        let tracker = FakeTracker::new(Provider::AniList)
            .with_entry(9000, WatchState::new(WatchStatus::Watching, 8));
        let service = build(ReconcilePolicy::default()).with_account("alice", tracker.clone());

        let outcomes = service.sync_event(&event(6)).await;
        assert!(tracker.updates().is_empty());
        assert_eq!(
            outcomes,
            vec![SyncOutcome::NoChange {
                provider: Provider::AniList,
                remote_id: 9000
            }]
        );
    }

    #[tokio::test]
    async fn test_every_account_is_synced() {
        let anilist = FakeTracker::new(Provider::AniList);
        let kitsu = FakeTracker::new(Provider::Kitsu);
        let service = build(ReconcilePolicy::default())
            .with_account("alice", anilist.clone())
            .with_account("alice", kitsu.clone());

        let outcomes = service.sync_event(&event(3)).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(anilist.updates()[0].0, 9000);
        assert_eq!(kitsu.updates()[0].0, 42);
        assert_eq!(kitsu.updates()[0].1.status, WatchStatus::Watching);
    }

    #[tokio::test]
    async fn test_unmapped_tracker_falls_back_to_search() {
        let annict = FakeTracker::new(Provider::Annict)
            .with_catalog(vec![media(77, "Local Title", Some(12))]);
        let service = build(ReconcilePolicy::default()).with_account("alice", annict.clone());

        service.sync_event(&event(2)).await;
        assert_eq!(annict.searches(), vec!["Local Title".to_string()]);
        assert_eq!(annict.updates()[0].0, 77);
    }

    #[tokio::test]
    async fn test_unresolved_and_failed_do_not_stop_other_accounts() {
        let unresolved = FakeTracker::new(Provider::Annict);
        let broken = FakeTracker::new(Provider::Kitsu).failing_updates();
        let healthy = FakeTracker::new(Provider::AniList);
        let service = build(ReconcilePolicy::default())
            .with_account("alice", unresolved)
            .with_account("alice", broken)
            .with_account("alice", healthy.clone());

        let outcomes = service.sync_event(&event(1)).await;
        assert!(matches!(outcomes[0], SyncOutcome::Unresolved { provider: Provider::Annict, .. }));
        assert!(matches!(outcomes[1], SyncOutcome::Failed { provider: Provider::Kitsu, .. }));
        assert!(matches!(outcomes[2], SyncOutcome::Updated { provider: Provider::AniList, .. }));
        assert_eq!(healthy.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_credential_failure_is_reported() {
        let tracker = FakeTracker::new(Provider::AniList).failing_user();
        let service = build(ReconcilePolicy::default()).with_account("alice", tracker.clone());

        let outcomes = service.sync_event(&event(1)).await;
        let [SyncOutcome::Failed { reason, .. }] = outcomes.as_slice() else {
            panic!("expected one failure, got {outcomes:?}");
        };
        assert!(reason.starts_with("get_user"));
        assert!(tracker.updates().is_empty());
    }

    #[tokio::test]
    async fn test_rewatch_follows_policy() {
        let mut completed = WatchState::new(WatchStatus::Completed, 12);
        completed.completed_at = NaiveDate::from_ymd_opt(2024, 1, 1);

        let tracker = FakeTracker::new(Provider::AniList).with_entry(9000, completed.clone());
        let service = build(ReconcilePolicy::default()).with_account("alice", tracker.clone());
        service.sync_event(&event(1)).await;
        assert!(tracker.updates().is_empty());

        let tracker = FakeTracker::new(Provider::AniList).with_entry(9000, completed);
        let service = build(ReconcilePolicy {
            rewatch_completed: true,
        })
        .with_account("alice", tracker.clone());
        service.sync_event(&event(1)).await;
        let (_, state) = &tracker.updates()[0];
        assert_eq!(state.status, WatchStatus::Watching);
        assert_eq!(state.repeat_count, 1);
        assert_eq!(state.completed_at, None);
    }

    #[tokio::test]
    async fn test_unknown_user_is_ignored() {
        let service = build(ReconcilePolicy::default())
            .with_account("bob", FakeTracker::new(Provider::AniList));
        assert!(service.sync_event(&event(1)).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_service_skips_update() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let tracker = FakeTracker::new(Provider::AniList);
        let service = build(ReconcilePolicy::default())
            .with_cancellation(cancel)
            .with_account("alice", tracker.clone());

        let outcomes = service.sync_event(&event(1)).await;
        assert!(matches!(outcomes[0], SyncOutcome::Failed { .. }));
        assert!(tracker.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_through_service_is_throttled() {
        let tracker = FakeTracker::new(Provider::AniList);
        let service = build(ReconcilePolicy::default()).with_account("alice", tracker.clone());
        let queue = SyncQueue::new();

        let mut first = event(1);
        first.item_id = "a".into();
        let mut second = event(2);
        second.item_id = "b".into();
        second.anidb_id = None;
        second.title = "Other".into();

        queue.enqueue(SyncRequest::new(first, Utc::now()));
        queue.enqueue(SyncRequest::new(event(3), Utc::now()));
        queue.enqueue(SyncRequest::new(second, Utc::now()));

        let throttle = Throttle::new(Duration::from_secs(5));
        let report = queue
            .drain(&service, &throttle, &CancellationToken::new())
            .await;

        assert_eq!(report.processed, 3);
        // "Other" has no mapping and no catalog hit.
        assert!(matches!(report.outcomes[2], SyncOutcome::Unresolved { .. }));
        let times = tracker.update_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_secs(5));
    }
}
