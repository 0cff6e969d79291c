use chrono::{DateTime, Utc};
use kiroku_api::traits::{Provider, WatchState};
use serde::{Deserialize, Serialize};

/// One playback observation handed over by the host library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    pub user_id: String,
    pub item_id: String,
    /// AniDB id scraped from library metadata, when known.
    #[serde(default)]
    pub anidb_id: Option<u64>,
    pub title: String,
    /// Episodes watched so far.
    pub progress: u32,
    #[serde(default)]
    pub total_episodes: Option<u32>,
    /// Host flag: the item is on the user's plan-to-watch shelf.
    #[serde(default)]
    pub planned: bool,
}

/// Queue identity: one pending request per (user, library item).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncKey {
    pub user_id: String,
    pub item_id: String,
}

/// A pending sync for one (user, item) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub user_id: String,
    pub item_id: String,
    pub requested_at: DateTime<Utc>,
    pub event: PlaybackEvent,
}

impl SyncRequest {
    pub fn new(event: PlaybackEvent, requested_at: DateTime<Utc>) -> Self {
        Self {
            user_id: event.user_id.clone(),
            item_id: event.item_id.clone(),
            requested_at,
            event,
        }
    }

    pub fn key(&self) -> SyncKey {
        SyncKey {
            user_id: self.user_id.clone(),
            item_id: self.item_id.clone(),
        }
    }

    pub fn same_key(&self, other: &SyncRequest) -> bool {
        self.user_id == other.user_id && self.item_id == other.item_id
    }
}

/// What one tracker account ended up doing for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// An update was accepted by the tracker.
    Updated {
        provider: Provider,
        remote_id: u64,
        state: WatchState,
    },
    /// The remote state already covers the playback.
    NoChange { provider: Provider, remote_id: u64 },
    /// The item could not be mapped onto the tracker's catalog.
    Unresolved { provider: Provider, reason: String },
    /// A tracker call failed; the item waits for the next playback.
    Failed { provider: Provider, reason: String },
}

impl SyncOutcome {
    pub fn provider(&self) -> Provider {
        match self {
            Self::Updated { provider, .. }
            | Self::NoChange { provider, .. }
            | Self::Unresolved { provider, .. }
            | Self::Failed { provider, .. } => *provider,
        }
    }
}
