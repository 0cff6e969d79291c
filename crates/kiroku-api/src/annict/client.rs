use std::sync::Arc;

use futures::StreamExt;
use reqwest::Client;
use url::Url;

use super::types::{
    status_to_annict, AnnictEpisode, AnnictWork, GraphQLResponse, LibraryResponse, PageInfo,
    SearchWorksResponse, ViewerResponse, WorkEpisodesResponse,
};
use crate::auth::Credentials;
use crate::error::{check_response, read_json, ApiError};
use crate::paging::{Page, PageCursor, Paginator};
use crate::traits::{AnimeTracker, ListEntry, Media, Provider, UserIdentity, WatchState, WatchStatus};

const API_URL: &str = "https://api.annict.com/graphql";
const PAGE_SIZE: u32 = 50;
const EPISODE_PAGE_SIZE: u32 = 100;

const WORK_FIELDS: &str = r#"
    id
    annictId
    title
    titleEn
    titleKana
    titleRo
    episodesCount
    viewerStatusState
"#;

const SEARCH_QUERY: &str = r#"
query ($titles: [String!], $first: Int, $after: String) {
    searchWorks(titles: $titles, first: $first, after: $after, orderBy: { field: WATCHERS_COUNT, direction: DESC }) {
        nodes { ...WorkFields }
        pageInfo { hasNextPage endCursor }
    }
}
"#;

const WORK_BY_ID_QUERY: &str = r#"
query ($ids: [Int!]) {
    searchWorks(annictIds: $ids, first: 1) {
        nodes {
            ...WorkFields
            episodes(first: 100) { nodes { viewerRecordsCount } pageInfo { hasNextPage endCursor } }
        }
        pageInfo { hasNextPage endCursor }
    }
}
"#;

const WORK_EPISODES_QUERY: &str = r#"
query ($ids: [Int!], $first: Int, $after: String) {
    searchWorks(annictIds: $ids, first: 1) {
        nodes {
            episodes(first: $first, after: $after) {
                nodes { viewerRecordsCount }
                pageInfo { hasNextPage endCursor }
            }
        }
    }
}
"#;

const VIEWER_QUERY: &str = r#"
query {
    viewer { annictId username }
}
"#;

const LIBRARY_QUERY: &str = r#"
query ($states: [StatusState!], $first: Int, $after: String) {
    viewer {
        libraryEntries(states: $states, first: $first, after: $after) {
            nodes {
                status { state }
                work {
                    ...WorkFields
                    episodes(first: 100) { nodes { viewerRecordsCount } pageInfo { hasNextPage endCursor } }
                }
            }
            pageInfo { hasNextPage endCursor }
        }
    }
}
"#;

const UPDATE_STATUS_MUTATION: &str = r#"
mutation ($workId: ID!, $state: StatusState!) {
    updateStatus(input: { workId: $workId, state: $state }) {
        work { id viewerStatusState }
    }
}
"#;

/// Annict GraphQL API client.
///
/// Annict tracks progress as per-episode records rather than a counter, so
/// [`AnimeTracker::update_status`] writes the status only.
pub struct AnnictClient {
    credentials: Arc<dyn Credentials>,
    http: Client,
    endpoint: Url,
    pager: Paginator,
}

impl AnnictClient {
    pub fn new(credentials: Arc<dyn Credentials>, pager: Paginator) -> Self {
        Self {
            credentials,
            http: Client::new(),
            endpoint: Url::parse(API_URL).expect("Annict endpoint is a valid URL"),
            pager,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    async fn graphql_request<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ApiError> {
        let token = self.credentials.bearer(Provider::Annict)?;
        tracing::debug!(operation, "Annict GraphQL request");

        // Work selections share one fragment.
        let document = if query.contains("...WorkFields") {
            format!("{query}\nfragment WorkFields on Work {{{WORK_FIELDS}}}")
        } else {
            query.to_string()
        };

        let resp = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .json(&serde_json::json!({
                "query": document,
                "variables": variables,
            }))
            .send()
            .await?;

        let resp = check_response(Provider::Annict, resp).await?;
        let body: GraphQLResponse<T> = read_json(Provider::Annict, resp).await?;

        if let Some(err) = body.errors.first() {
            tracing::warn!(operation, message = %err.message, "Annict GraphQL error");
        }
        body.data.ok_or_else(|| ApiError::Api {
            status: 200,
            message: body
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; "),
        })
    }

    async fn search_page(&self, query: &str, cursor: PageCursor) -> Result<Page<Media>, ApiError> {
        let PageCursor::After { size, token, .. } = cursor else {
            return Err(ApiError::Parse("Annict pages by cursor".into()));
        };
        let resp: SearchWorksResponse = self
            .graphql_request(
                "SearchWorks",
                SEARCH_QUERY,
                serde_json::json!({ "titles": [query], "first": size, "after": token }),
            )
            .await?;

        let Some(conn) = resp.search_works else {
            return Ok(Page::new(Vec::new(), false));
        };
        let items = conn.nodes.into_iter().map(AnnictWork::into_media).collect();
        Ok(Page::with_token(items, conn.page_info.next_token()))
    }

    async fn library_page(
        &self,
        status: Option<WatchStatus>,
        cursor: PageCursor,
    ) -> Result<Page<ListEntry>, ApiError> {
        let PageCursor::After { size, token, .. } = cursor else {
            return Err(ApiError::Parse("Annict pages by cursor".into()));
        };
        let states = status.map(|s| vec![status_to_annict(s)]);
        let resp: LibraryResponse = self
            .graphql_request(
                "LibraryEntries",
                LIBRARY_QUERY,
                serde_json::json!({ "states": states, "first": size, "after": token }),
            )
            .await?;

        let conn = resp.viewer.library_entries;
        let mut items = Vec::with_capacity(conn.nodes.len());
        for mut entry in conn.nodes {
            if let Some(work) = entry.work.as_mut() {
                self.complete_episodes(work).await?;
            }
            items.extend(entry.into_list_entry());
        }
        Ok(Page::with_token(items, conn.page_info.next_token()))
    }

    async fn episode_page(&self, work_id: u64, cursor: PageCursor) -> Result<Page<AnnictEpisode>, ApiError> {
        let PageCursor::After { size, token, .. } = cursor else {
            return Err(ApiError::Parse("Annict pages by cursor".into()));
        };
        let resp: WorkEpisodesResponse = self
            .graphql_request(
                "WorkEpisodes",
                WORK_EPISODES_QUERY,
                serde_json::json!({ "ids": [work_id], "first": size, "after": token }),
            )
            .await?;

        let Some(conn) = resp
            .search_works
            .and_then(|c| c.nodes.into_iter().next())
            .and_then(|w| w.episodes)
        else {
            return Ok(Page::new(Vec::new(), false));
        };
        Ok(Page::with_token(conn.nodes, conn.page_info.and_then(PageInfo::next_token)))
    }

    /// Fetch the episode records past the first page so progress counts
    /// every watched episode. Any failed page fails the whole work.
    async fn complete_episodes(&self, work: &mut AnnictWork) -> Result<(), ApiError> {
        let Some(token) = work.episodes_continuation() else {
            return Ok(());
        };
        let work_id = work.annict_id;
        let first = PageCursor::After {
            page: 2,
            size: EPISODE_PAGE_SIZE,
            token: Some(token),
        };

        let mut pages = std::pin::pin!(self
            .pager
            .pages(first, move |cursor| self.episode_page(work_id, cursor)));
        let mut rest = Vec::new();
        while let Some(page) = pages.next().await {
            rest.extend(page?);
        }
        tracing::debug!(work_id, extra = rest.len(), "Annict episode records paged in");
        work.extend_episodes(rest);
        Ok(())
    }

    async fn work(&self, id: u64) -> Result<Option<AnnictWork>, ApiError> {
        let resp: SearchWorksResponse = self
            .graphql_request("WorkById", WORK_BY_ID_QUERY, serde_json::json!({ "ids": [id] }))
            .await?;
        Ok(resp
            .search_works
            .and_then(|c| c.nodes.into_iter().next()))
    }
}

impl AnimeTracker for AnnictClient {
    fn provider(&self) -> Provider {
        Provider::Annict
    }

    async fn search(&self, query: &str) -> Vec<Media> {
        let result = self
            .pager
            .fetch_all(PageCursor::first_after(PAGE_SIZE), |cursor| {
                self.search_page(query, cursor)
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, query, "Annict search failed");
            Vec::new()
        })
    }

    async fn get_anime(&self, id: u64) -> Result<Option<Media>, ApiError> {
        Ok(self.work(id).await?.map(AnnictWork::into_media))
    }

    async fn get_user(&self) -> Result<UserIdentity, ApiError> {
        let resp: ViewerResponse = self
            .graphql_request("Viewer", VIEWER_QUERY, serde_json::json!({}))
            .await?;
        Ok(UserIdentity {
            id: resp.viewer.annict_id.to_string(),
            name: resp.viewer.username,
        })
    }

    async fn get_list_entry(
        &self,
        _user: &UserIdentity,
        id: u64,
    ) -> Result<Option<WatchState>, ApiError> {
        // viewer* fields are scoped to the token's account.
        let Some(mut work) = self.work(id).await? else {
            return Ok(None);
        };
        if work.viewer_state().is_none() {
            return Ok(None);
        }
        self.complete_episodes(&mut work).await?;
        Ok(work.viewer_state())
    }

    async fn update_status(
        &self,
        _user: &UserIdentity,
        id: u64,
        state: &WatchState,
    ) -> Result<(), ApiError> {
        let work = self
            .work(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Annict work {id}")))?;

        let _: serde_json::Value = self
            .graphql_request(
                "UpdateStatus",
                UPDATE_STATUS_MUTATION,
                serde_json::json!({ "workId": work.id, "state": status_to_annict(state.status) }),
            )
            .await?;
        Ok(())
    }

    async fn get_user_list(&self, user: &UserIdentity, status: Option<WatchStatus>) -> Vec<ListEntry> {
        let result = self
            .pager
            .fetch_all(PageCursor::first_after(PAGE_SIZE), |cursor| {
                self.library_page(status, cursor)
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, user = %user.name, "Annict list fetch failed");
            Vec::new()
        })
    }
}
