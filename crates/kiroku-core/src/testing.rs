//! In-memory tracker used by resolver, queue and service tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kiroku_api::error::ApiError;
use kiroku_api::traits::{
    AnimeTracker, ListEntry, Media, Provider, TitleSet, UserIdentity, WatchState, WatchStatus,
};
use tokio::time::Instant;

pub fn media(id: u64, title: &str, episodes: Option<u32>) -> Media {
    Media {
        id,
        titles: TitleSet::new(title),
        episodes,
        relations: Vec::new(),
    }
}

#[derive(Default)]
struct FakeState {
    entries: HashMap<u64, WatchState>,
    searches: Vec<String>,
    updates: Vec<(u64, WatchState)>,
    update_times: Vec<Instant>,
    fail_updates: bool,
    fail_user: bool,
}

/// Clones share state, so a test can keep a handle after handing one over.
#[derive(Clone)]
pub struct FakeTracker {
    provider: Provider,
    catalog: Arc<Vec<Media>>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeTracker {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            catalog: Arc::new(Vec::new()),
            state: Arc::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Vec<Media>) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_entry(self, id: u64, state: WatchState) -> Self {
        self.state.lock().unwrap().entries.insert(id, state);
        self
    }

    pub fn failing_updates(self) -> Self {
        self.state.lock().unwrap().fail_updates = true;
        self
    }

    pub fn failing_user(self) -> Self {
        self.state.lock().unwrap().fail_user = true;
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.state.lock().unwrap().searches.clone()
    }

    pub fn updates(&self) -> Vec<(u64, WatchState)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn update_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().update_times.clone()
    }

    pub fn entry(&self, id: u64) -> Option<WatchState> {
        self.state.lock().unwrap().entries.get(&id).cloned()
    }
}

impl AnimeTracker for FakeTracker {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn search(&self, query: &str) -> Vec<Media> {
        self.state.lock().unwrap().searches.push(query.to_string());
        self.catalog.as_ref().clone()
    }

    async fn get_anime(&self, id: u64) -> Result<Option<Media>, ApiError> {
        Ok(self.catalog.iter().find(|m| m.id == id).cloned())
    }

    async fn get_user(&self) -> Result<UserIdentity, ApiError> {
        if self.state.lock().unwrap().fail_user {
            return Err(ApiError::Unauthenticated(self.provider));
        }
        Ok(UserIdentity {
            id: "1".into(),
            name: "tester".into(),
        })
    }

    async fn get_list_entry(
        &self,
        _user: &UserIdentity,
        id: u64,
    ) -> Result<Option<WatchState>, ApiError> {
        Ok(self.entry(id))
    }

    async fn update_status(
        &self,
        _user: &UserIdentity,
        id: u64,
        state: &WatchState,
    ) -> Result<(), ApiError> {
        let mut inner = self.state.lock().unwrap();
        inner.update_times.push(Instant::now());
        if inner.fail_updates {
            return Err(ApiError::Api {
                status: 500,
                message: "internal error".into(),
            });
        }
        inner.updates.push((id, state.clone()));
        inner.entries.insert(id, state.clone());
        Ok(())
    }

    async fn get_user_list(
        &self,
        _user: &UserIdentity,
        status: Option<WatchStatus>,
    ) -> Vec<ListEntry> {
        let inner = self.state.lock().unwrap();
        inner
            .entries
            .iter()
            .filter(|(_, state)| status.map_or(true, |s| state.status == s))
            .filter_map(|(id, state)| {
                let media = self.catalog.iter().find(|m| m.id == *id)?.clone();
                Some(ListEntry {
                    media,
                    state: state.clone(),
                })
            })
            .collect()
    }
}
