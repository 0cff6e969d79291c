pub mod logging;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kiroku_api::auth::StaticToken;
use kiroku_api::delay::TokioDelay;
use kiroku_api::paging::Paginator;
use kiroku_api::traits::{AnimeTracker, Media, Provider};
use kiroku_api::tracker::{ClientOptions, Tracker};
use kiroku_core::config::AppConfig;
use kiroku_core::crossref::refresh::{refresh_snapshot, RefreshOutcome};
use kiroku_core::crossref::CrossReferenceStore;
use kiroku_core::error::KirokuError;
use kiroku_core::models::{AnimeIdentity, PlaybackEvent, SyncRequest};
use kiroku_core::orchestrator::SyncService;
use kiroku_core::queue::{DrainReport, Enqueued, SyncQueue};
use kiroku_core::reconcile::ReconcilePolicy;
use kiroku_core::resolver::{IdentityResolver, LocalSeries};
use kiroku_core::throttle::Throttle;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("invalid playback event on line {line}: {message}")]
    Event { line: usize, message: String },
    #[error(transparent)]
    Core(#[from] KirokuError),
}

/// What happened to a playback event handed to [`Runtime::on_playback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted(Enqueued),
    /// Filtered out by `sync.plan_to_watch_only`.
    Skipped,
}

/// Host-facing entry point: owns the queue, the throttle and one tracker
/// client per configured account.
pub struct Runtime {
    config: AppConfig,
    service: SyncService<Tracker>,
    queue: SyncQueue,
    throttle: Throttle,
    draining: Mutex<()>,
    cancel: CancellationToken,
    pager: Paginator,
    options: ClientOptions,
    http: reqwest::Client,
}

impl Runtime {
    pub fn new(config: AppConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        let cancel = CancellationToken::new();
        let crossref = Arc::new(CrossReferenceStore::open(config.crossref_path()));
        let pager = Paginator::new(TokioDelay::shared(), cancel.clone())
            .with_page_delay(config.sync.page_delay())
            .with_limits(config.sync.max_pages, config.sync.max_offset);
        let options = ClientOptions {
            simkl_client_id: config.services.simkl_client_id.clone(),
            user_agent: config.services.user_agent.clone(),
        };
        let policy = ReconcilePolicy {
            rewatch_completed: config.sync.rewatch_completed,
        };

        let mut service = SyncService::new(IdentityResolver::new(crossref), policy)
            .with_cancellation(cancel.clone());
        for user in &config.users {
            for account in &user.trackers {
                let provider = account.provider()?;
                let credentials = StaticToken::new(account.token.clone()).shared();
                service.add_account(
                    user.id.clone(),
                    Tracker::new(provider, credentials, pager.clone(), &options),
                );
                debug!(user = %user.id, %provider, "tracker account registered");
            }
        }

        Ok(Self {
            throttle: Throttle::new(config.sync.min_interval()),
            config,
            service,
            queue: SyncQueue::new(),
            draining: Mutex::new(()),
            cancel,
            pager,
            options,
            http: reqwest::Client::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue a playback event. Does not start a drain.
    pub fn on_playback(&self, event: PlaybackEvent) -> Admission {
        if self.config.sync.plan_to_watch_only && !event.planned {
            debug!(user = %event.user_id, item = %event.item_id, "not on plan-to-watch, skipping");
            return Admission::Skipped;
        }
        Admission::Accepted(self.queue.enqueue(SyncRequest::new(event, Utc::now())))
    }

    /// Queue a playback event and drain in the background.
    pub fn submit(self: &Arc<Self>, event: PlaybackEvent) -> Admission {
        let admission = self.on_playback(event);
        if matches!(admission, Admission::Accepted(_)) {
            let runtime = Arc::clone(self);
            tokio::spawn(async move {
                runtime.drain().await;
            });
        }
        admission
    }

    /// Drain the queue unless another drain is already running.
    ///
    /// Returns `None` when the call found a drain in progress; that drain
    /// picks up whatever this caller enqueued.
    pub async fn drain(&self) -> Option<DrainReport> {
        let mut combined: Option<DrainReport> = None;
        loop {
            let Ok(guard) = self.draining.try_lock() else {
                return combined;
            };
            let report = self
                .queue
                .drain(&self.service, &self.throttle, &self.cancel)
                .await;
            drop(guard);

            let stop = report.cancelled || self.queue.is_empty();
            let total = combined.get_or_insert_with(DrainReport::default);
            total.processed += report.processed;
            total.outcomes.extend(report.outcomes);
            total.cancelled |= report.cancelled;
            if stop {
                return combined;
            }
        }
    }

    /// Download the cross-reference snapshot and install it if it changed.
    pub async fn refresh_mapping(&self) -> Result<RefreshOutcome, RuntimeError> {
        let dest = self.config.crossref_path();
        info!(url = %self.config.crossref.url, path = %dest.display(), "refreshing cross-reference");
        Ok(refresh_snapshot(&self.http, &self.config.crossref.url, &dest).await?)
    }

    /// Resolve a series on one tracker, as the sync loop would.
    pub async fn resolve(
        &self,
        provider: Provider,
        anidb_id: Option<u64>,
        title: &str,
    ) -> Result<AnimeIdentity, RuntimeError> {
        let tracker = self.tracker(provider);
        let local = LocalSeries {
            item_id: "cli",
            anidb_id,
            title,
        };
        Ok(self
            .service
            .resolver()
            .resolve(&tracker, local)
            .await
            .map_err(KirokuError::from)?)
    }

    pub async fn search(&self, provider: Provider, query: &str) -> Vec<Media> {
        self.tracker(provider).search(query).await
    }

    /// Stop draining and paging at the next suspension point.
    pub fn shutdown(&self) {
        info!(pending = self.queue.len(), "shutting down");
        self.cancel.cancel();
    }

    /// A client for `provider` using the first configured token, if any.
    fn tracker(&self, provider: Provider) -> Tracker {
        let token = self
            .config
            .users
            .iter()
            .flat_map(|u| &u.trackers)
            .find(|a| a.provider().ok() == Some(provider))
            .map(|a| StaticToken::new(a.token.clone()))
            .unwrap_or_else(StaticToken::missing);
        Tracker::new(provider, token.shared(), self.pager.clone(), &self.options)
    }
}

/// Parse newline-delimited playback events. Blank lines are ignored.
pub fn parse_events(content: &str) -> Result<Vec<PlaybackEvent>, RuntimeError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| RuntimeError::Event {
                line: idx + 1,
                message: e.to_string(),
            })
        })
        .collect()
}
