use std::sync::Arc;

use reqwest::Client;
use url::Url;

use super::types::{
    status_to_anilist, FuzzyDate, GraphQLResponse, MediaListPageResponse, MediaListResponse,
    MediaPageResponse, MediaResponse, ViewerResponse,
};
use crate::auth::Credentials;
use crate::error::{check_response, read_json, ApiError};
use crate::paging::{Page, PageCursor, Paginator};
use crate::traits::{AnimeTracker, ListEntry, Media, Provider, UserIdentity, WatchState, WatchStatus};

const API_URL: &str = "https://graphql.anilist.co";
const PAGE_SIZE: u32 = 50;

const SEARCH_QUERY: &str = r#"
query ($search: String, $page: Int, $perPage: Int) {
    Page(page: $page, perPage: $perPage) {
        pageInfo { hasNextPage }
        media(search: $search, type: ANIME) {
            id
            title { romaji english native }
            episodes
            synonyms
        }
    }
}
"#;

const GET_ANIME_QUERY: &str = r#"
query ($id: Int) {
    Media(id: $id, type: ANIME) {
        id
        title { romaji english native }
        episodes
        synonyms
        relations {
            edges {
                relationType
                node { id type title { romaji english } }
            }
        }
    }
}
"#;

const VIEWER_QUERY: &str = r#"
query {
    Viewer {
        id
        name
    }
}
"#;

const LIST_ENTRY_QUERY: &str = r#"
query ($userId: Int, $mediaId: Int) {
    MediaList(userId: $userId, mediaId: $mediaId, type: ANIME) {
        status
        progress
        repeat
        startedAt { year month day }
        completedAt { year month day }
    }
}
"#;

const USER_LIST_QUERY: &str = r#"
query ($userId: Int, $status: MediaListStatus, $page: Int, $perPage: Int) {
    Page(page: $page, perPage: $perPage) {
        pageInfo { hasNextPage }
        mediaList(userId: $userId, type: ANIME, status: $status) {
            status
            progress
            repeat
            startedAt { year month day }
            completedAt { year month day }
            media {
                id
                title { romaji english native }
                episodes
                synonyms
            }
        }
    }
}
"#;

const SAVE_ENTRY_MUTATION: &str = r#"
mutation ($mediaId: Int, $status: MediaListStatus, $progress: Int, $repeat: Int,
          $startedAt: FuzzyDateInput, $completedAt: FuzzyDateInput) {
    SaveMediaListEntry(mediaId: $mediaId, status: $status, progress: $progress, repeat: $repeat,
                       startedAt: $startedAt, completedAt: $completedAt) {
        id
        status
        progress
    }
}
"#;

/// AniList GraphQL API client.
pub struct AniListClient {
    credentials: Arc<dyn Credentials>,
    http: Client,
    endpoint: Url,
    pager: Paginator,
}

impl AniListClient {
    pub fn new(credentials: Arc<dyn Credentials>, pager: Paginator) -> Self {
        Self {
            credentials,
            http: Client::new(),
            endpoint: Url::parse(API_URL).expect("AniList endpoint is a valid URL"),
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
        let token = self.credentials.bearer(Provider::AniList)?;
        tracing::debug!(operation, "AniList GraphQL request");

        let resp = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(&serde_json::json!({
                "query": query,
                "variables": variables,
            }))
            .send()
            .await?;

        let resp = check_response(Provider::AniList, resp).await?;
        let body: GraphQLResponse<T> = read_json(Provider::AniList, resp).await?;

        match body.data {
            Some(data) => Ok(data),
            None => {
                let first = body.errors.into_iter().next();
                let status = first.as_ref().and_then(|e| e.status).unwrap_or(500);
                let message = first.map(|e| e.message).unwrap_or_else(|| "empty response".into());
                tracing::warn!(operation, status, %message, "AniList GraphQL error");
                Err(ApiError::Api { status, message })
            }
        }
    }

    async fn search_page(&self, query: &str, cursor: PageCursor) -> Result<Page<Media>, ApiError> {
        let PageCursor::Number { page, size } = cursor else {
            return Err(ApiError::Parse("AniList pages by number".into()));
        };
        let resp: MediaPageResponse = self
            .graphql_request(
                "Search",
                SEARCH_QUERY,
                serde_json::json!({ "search": query, "page": page, "perPage": size }),
            )
            .await?;

        let items = resp.page.media.into_iter().map(|m| m.into_media()).collect();
        Ok(Page::new(items, resp.page.page_info.has_next_page))
    }

    async fn list_page(
        &self,
        user_id: &str,
        status: Option<WatchStatus>,
        cursor: PageCursor,
    ) -> Result<Page<ListEntry>, ApiError> {
        let PageCursor::Number { page, size } = cursor else {
            return Err(ApiError::Parse("AniList pages by number".into()));
        };
        let user_id = numeric_user_id(user_id)?;
        let resp: MediaListPageResponse = self
            .graphql_request(
                "UserList",
                USER_LIST_QUERY,
                serde_json::json!({
                    "userId": user_id,
                    "status": status.map(status_to_anilist),
                    "page": page,
                    "perPage": size,
                }),
            )
            .await?;

        let items = resp
            .page
            .media_list
            .into_iter()
            .filter_map(|e| e.into_list_entry())
            .collect();
        Ok(Page::new(items, resp.page.page_info.has_next_page))
    }
}

fn numeric_user_id(id: &str) -> Result<u64, ApiError> {
    id.parse()
        .map_err(|_| ApiError::Parse(format!("AniList user id '{id}' is not numeric")))
}

impl AnimeTracker for AniListClient {
    fn provider(&self) -> Provider {
        Provider::AniList
    }

    async fn search(&self, query: &str) -> Vec<Media> {
        let result = self
            .pager
            .fetch_all(PageCursor::first_page(PAGE_SIZE), |cursor| {
                self.search_page(query, cursor)
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, query, "AniList search failed");
            Vec::new()
        })
    }

    async fn get_anime(&self, id: u64) -> Result<Option<Media>, ApiError> {
        let resp: Result<MediaResponse, _> = self
            .graphql_request("GetAnime", GET_ANIME_QUERY, serde_json::json!({ "id": id }))
            .await;

        match resp {
            Ok(resp) => Ok(resp.media.map(|m| m.into_media())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_user(&self) -> Result<UserIdentity, ApiError> {
        let resp: ViewerResponse = self
            .graphql_request("Viewer", VIEWER_QUERY, serde_json::json!({}))
            .await?;
        Ok(UserIdentity {
            id: resp.viewer.id.to_string(),
            name: resp.viewer.name,
        })
    }

    async fn get_list_entry(
        &self,
        user: &UserIdentity,
        id: u64,
    ) -> Result<Option<WatchState>, ApiError> {
        let user_id = numeric_user_id(&user.id)?;

        // AniList answers 404 when the user has no entry for the media.
        let resp: Result<MediaListResponse, _> = self
            .graphql_request(
                "ListEntry",
                LIST_ENTRY_QUERY,
                serde_json::json!({ "userId": user_id, "mediaId": id }),
            )
            .await;

        match resp {
            Ok(resp) => Ok(resp.media_list.and_then(|e| e.to_watch_state())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_status(
        &self,
        _user: &UserIdentity,
        id: u64,
        state: &WatchState,
    ) -> Result<(), ApiError> {
        let vars = serde_json::json!({
            "mediaId": id,
            "status": status_to_anilist(state.status),
            "progress": state.progress,
            "repeat": state.repeat_count,
            "startedAt": FuzzyDate::input_json(state.started_at),
            "completedAt": FuzzyDate::input_json(state.completed_at),
        });

        let _: serde_json::Value = self
            .graphql_request("SaveMediaListEntry", SAVE_ENTRY_MUTATION, vars)
            .await?;
        Ok(())
    }

    async fn get_user_list(&self, user: &UserIdentity, status: Option<WatchStatus>) -> Vec<ListEntry> {
        let result = self
            .pager
            .fetch_all(PageCursor::first_page(PAGE_SIZE), |cursor| {
                self.list_page(&user.id, status, cursor)
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, user = %user.name, "AniList list fetch failed");
            Vec::new()
        })
    }
}
