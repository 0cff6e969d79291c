use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use url::Url;

use super::types::{
    status_to_simkl, AllItemsResponse, SettingsResponse, SimklAnime, SimklListItem,
};
use crate::auth::Credentials;
use crate::error::{check_response, read_json, ApiError};
use crate::paging::{Page, PageCursor, Paginator};
use crate::traits::{AnimeTracker, ListEntry, Media, Provider, UserIdentity, WatchState, WatchStatus};

const BASE_URL: &str = "https://api.simkl.com/";
const PAGE_SIZE: u32 = 50;

/// Simkl REST client. Every request carries the app's client id in
/// `simkl-api-key` next to the user's bearer token.
pub struct SimklClient {
    credentials: Arc<dyn Credentials>,
    client_id: String,
    http: Client,
    base: Url,
    pager: Paginator,
}

impl SimklClient {
    pub fn new(credentials: Arc<dyn Credentials>, pager: Paginator, client_id: impl Into<String>) -> Self {
        Self {
            credentials,
            client_id: client_id.into(),
            http: Client::new(),
            base: Url::parse(BASE_URL).expect("Simkl base URL is valid"),
            pager,
        }
    }

    pub fn with_endpoint(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Parse(format!("bad Simkl path '{path}': {e}")))
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.credentials.bearer(Provider::Simkl)?;
        Ok(req
            .bearer_auth(token)
            .header("simkl-api-key", &self.client_id))
    }

    async fn search_page(&self, query: &str, cursor: PageCursor) -> Result<Page<Media>, ApiError> {
        let PageCursor::Number { page, size } = cursor else {
            return Err(ApiError::Parse("Simkl pages by number".into()));
        };
        tracing::debug!(query, page, "Simkl search");

        let (page_param, limit) = (page.to_string(), size.to_string());
        let req = self.http.get(self.url("search/anime")?).query(&[
            ("q", query),
            ("page", page_param.as_str()),
            ("limit", limit.as_str()),
        ]);
        let resp = self.authorized(req)?.send().await?;
        let resp = check_response(Provider::Simkl, resp).await?;

        let page_count: u32 = resp
            .headers()
            .get("x-pagination-page-count")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(page);

        // An empty result set comes back as `null`.
        let results: Option<Vec<SimklAnime>> = read_json(Provider::Simkl, resp).await?;
        let items = results
            .unwrap_or_default()
            .into_iter()
            .filter_map(SimklAnime::into_media)
            .collect();
        Ok(Page::new(items, page < page_count))
    }

    async fn all_items(&self, status: Option<WatchStatus>) -> Result<Vec<SimklListItem>, ApiError> {
        let path = match status {
            Some(s) => format!("sync/all-items/anime/{}", status_to_simkl(s)),
            None => "sync/all-items/anime".to_string(),
        };
        let req = self.http.get(self.url(&path)?);
        let resp = self.authorized(req)?.send().await?;
        let resp = check_response(Provider::Simkl, resp).await?;

        // Simkl answers `null` for an empty library.
        let body: Option<AllItemsResponse> = read_json(Provider::Simkl, resp).await?;
        Ok(body.unwrap_or_default().anime)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), ApiError> {
        let req = self.http.post(self.url(path)?).json(&body);
        let resp = self.authorized(req)?.send().await?;
        check_response(Provider::Simkl, resp).await?;
        Ok(())
    }
}

/// Requests for one `update_status` call, in the order they must be sent.
///
/// Watched episodes go through the history endpoint, which also moves the
/// show to the watching or completed list. A paused, dropped or planned
/// show with progress needs both: history for the episodes, then a list
/// move back to the target status.
pub(crate) fn update_requests(id: u64, state: &WatchState) -> Vec<(&'static str, serde_json::Value)> {
    let mut requests = Vec::with_capacity(2);
    if state.progress > 0 {
        let episodes: Vec<_> = (1..=state.progress)
            .map(|n| serde_json::json!({ "number": n }))
            .collect();
        requests.push((
            "sync/history",
            serde_json::json!({ "shows": [{ "ids": { "simkl": id }, "episodes": episodes }] }),
        ));
    }

    let history_sets_list = matches!(
        state.status,
        WatchStatus::Watching | WatchStatus::Repeating | WatchStatus::Completed
    );
    if requests.is_empty() || !history_sets_list {
        requests.push((
            "sync/add-to-list",
            serde_json::json!({ "shows": [{ "ids": { "simkl": id }, "to": status_to_simkl(state.status) }] }),
        ));
    }
    requests
}

impl AnimeTracker for SimklClient {
    fn provider(&self) -> Provider {
        Provider::Simkl
    }

    async fn search(&self, query: &str) -> Vec<Media> {
        let result = self
            .pager
            .fetch_all(PageCursor::first_page(PAGE_SIZE), |cursor| {
                self.search_page(query, cursor)
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, query, "Simkl search failed");
            Vec::new()
        })
    }

    async fn get_anime(&self, id: u64) -> Result<Option<Media>, ApiError> {
        let req = self
            .http
            .get(self.url(&format!("anime/{id}"))?)
            .query(&[("extended", "full")]);
        let resp = self.authorized(req)?.send().await?;
        let resp = match check_response(Provider::Simkl, resp).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let anime: Option<SimklAnime> = read_json(Provider::Simkl, resp).await?;
        Ok(anime.and_then(SimklAnime::into_media))
    }

    async fn get_user(&self) -> Result<UserIdentity, ApiError> {
        let req = self.http.post(self.url("users/settings")?);
        let resp = self.authorized(req)?.send().await?;
        let resp = check_response(Provider::Simkl, resp).await?;
        let settings: SettingsResponse = read_json(Provider::Simkl, resp).await?;
        Ok(UserIdentity {
            id: settings.account.id.to_string(),
            name: settings.user.name,
        })
    }

    async fn get_list_entry(
        &self,
        _user: &UserIdentity,
        id: u64,
    ) -> Result<Option<WatchState>, ApiError> {
        let items = self.all_items(None).await?;
        Ok(items
            .iter()
            .find(|item| item.simkl_id() == Some(id))
            .and_then(SimklListItem::to_watch_state))
    }

    async fn update_status(
        &self,
        _user: &UserIdentity,
        id: u64,
        state: &WatchState,
    ) -> Result<(), ApiError> {
        // A failed step fails the whole update, so the next event retries it.
        for (path, body) in update_requests(id, state) {
            tracing::debug!(simkl_id = id, path, "Simkl update");
            self.post(path, body).await?;
        }
        Ok(())
    }

    async fn get_user_list(&self, user: &UserIdentity, status: Option<WatchStatus>) -> Vec<ListEntry> {
        // The sync endpoint is unpaginated; it still runs through the pager so
        // cancellation is honoured.
        let result = self
            .pager
            .fetch_all(PageCursor::first_page(0), |_| async move {
                let items = self.all_items(status).await?;
                let entries: Vec<ListEntry> = items
                    .into_iter()
                    .filter_map(SimklListItem::into_list_entry)
                    .collect();
                Ok::<_, ApiError>(Page::new(entries, false))
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, user = %user.name, "Simkl list fetch failed");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_goes_through_history() {
        let state = WatchState::new(WatchStatus::Watching, 3);
        let requests = update_requests(42, &state);
        assert_eq!(requests.len(), 1);
        let (path, body) = &requests[0];
        assert_eq!(*path, "sync/history");
        assert_eq!(
            *body,
            serde_json::json!({ "shows": [{
                "ids": { "simkl": 42 },
                "episodes": [{ "number": 1 }, { "number": 2 }, { "number": 3 }]
            }] })
        );
    }

    #[test]
    fn test_paused_with_progress_sends_episodes_then_list_move() {
        let state = WatchState::new(WatchStatus::Paused, 6);
        let requests = update_requests(42, &state);
        let paths: Vec<_> = requests.iter().map(|(path, _)| *path).collect();
        assert_eq!(paths, vec!["sync/history", "sync/add-to-list"]);

        let episodes = requests[0].1["shows"][0]["episodes"].as_array().unwrap();
        assert_eq!(episodes.len(), 6);
        assert_eq!(episodes[5], serde_json::json!({ "number": 6 }));
        assert_eq!(
            requests[1].1,
            serde_json::json!({ "shows": [{ "ids": { "simkl": 42 }, "to": "hold" }] })
        );
    }

    #[test]
    fn test_zero_progress_is_a_list_move() {
        let requests = update_requests(7, &WatchState::new(WatchStatus::Watching, 0));
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "sync/add-to-list");
        assert_eq!(
            requests[0].1,
            serde_json::json!({ "shows": [{ "ids": { "simkl": 7 }, "to": "watching" }] })
        );

        let requests = update_requests(7, &WatchState::new(WatchStatus::Dropped, 0));
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1["shows"][0]["to"], "dropped");
    }
}
