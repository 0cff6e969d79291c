//! One concrete type over every supported tracker.

use std::sync::Arc;

use crate::anilist::AniListClient;
use crate::annict::AnnictClient;
use crate::auth::Credentials;
use crate::error::ApiError;
use crate::kitsu::KitsuClient;
use crate::paging::Paginator;
use crate::shikimori::ShikimoriClient;
use crate::simkl::SimklClient;
use crate::traits::{AnimeTracker, ListEntry, Media, Provider, UserIdentity, WatchState, WatchStatus};

/// Settings some trackers need beyond a bearer token.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Simkl application client id, sent as `simkl-api-key`.
    pub simkl_client_id: String,
    /// Shikimori requires an identifying user agent.
    pub user_agent: String,
}

/// A tracker client chosen at runtime.
pub enum Tracker {
    AniList(AniListClient),
    Kitsu(KitsuClient),
    Annict(AnnictClient),
    Simkl(SimklClient),
    Shikimori(ShikimoriClient),
}

impl Tracker {
    pub fn new(
        provider: Provider,
        credentials: Arc<dyn Credentials>,
        pager: Paginator,
        options: &ClientOptions,
    ) -> Self {
        match provider {
            Provider::AniList => Self::AniList(AniListClient::new(credentials, pager)),
            Provider::Kitsu => Self::Kitsu(KitsuClient::new(credentials, pager)),
            Provider::Annict => Self::Annict(AnnictClient::new(credentials, pager)),
            Provider::Simkl => Self::Simkl(SimklClient::new(
                credentials,
                pager,
                options.simkl_client_id.clone(),
            )),
            Provider::Shikimori => Self::Shikimori(ShikimoriClient::new(
                credentials,
                pager,
                &options.user_agent,
            )),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $client:ident => $call:expr) => {
        match $self {
            Tracker::AniList($client) => $call,
            Tracker::Kitsu($client) => $call,
            Tracker::Annict($client) => $call,
            Tracker::Simkl($client) => $call,
            Tracker::Shikimori($client) => $call,
        }
    };
}

impl AnimeTracker for Tracker {
    fn provider(&self) -> Provider {
        dispatch!(self, c => c.provider())
    }

    async fn search(&self, query: &str) -> Vec<Media> {
        dispatch!(self, c => c.search(query).await)
    }

    async fn get_anime(&self, id: u64) -> Result<Option<Media>, ApiError> {
        dispatch!(self, c => c.get_anime(id).await)
    }

    async fn get_user(&self) -> Result<UserIdentity, ApiError> {
        dispatch!(self, c => c.get_user().await)
    }

    async fn get_list_entry(
        &self,
        user: &UserIdentity,
        id: u64,
    ) -> Result<Option<WatchState>, ApiError> {
        dispatch!(self, c => c.get_list_entry(user, id).await)
    }

    async fn update_status(
        &self,
        user: &UserIdentity,
        id: u64,
        state: &WatchState,
    ) -> Result<(), ApiError> {
        dispatch!(self, c => c.update_status(user, id, state).await)
    }

    async fn get_user_list(&self, user: &UserIdentity, status: Option<WatchStatus>) -> Vec<ListEntry> {
        dispatch!(self, c => c.get_user_list(user, status).await)
    }
}
