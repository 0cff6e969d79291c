use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use url::Url;

use super::types::{
    format_date, list_entries, media_from_resource, relations_from_included, status_to_kitsu,
    JsonApiListResponse, JsonApiSingleResourceResponse, KitsuLibraryAttributes,
};
use crate::auth::Credentials;
use crate::error::{check_response, read_json, ApiError};
use crate::paging::{Page, PageCursor, Paginator};
use crate::traits::{AnimeTracker, ListEntry, Media, Provider, UserIdentity, WatchState, WatchStatus};

const BASE_URL: &str = "https://kitsu.app/api/edge/";
const JSON_API: &str = "application/vnd.api+json";
const SEARCH_PAGE_SIZE: u32 = 20;
const LIST_PAGE_SIZE: u32 = 100;
const ANIME_FIELDS: &str = "canonicalTitle,titles,abbreviatedTitles,episodeCount";
const ENTRY_FIELDS: &str = "progress,status,reconsuming,reconsumeCount,startedAt,finishedAt,anime";

/// Kitsu JSON:API client.
pub struct KitsuClient {
    credentials: Arc<dyn Credentials>,
    http: Client,
    base: Url,
    pager: Paginator,
}

impl KitsuClient {
    pub fn new(credentials: Arc<dyn Credentials>, pager: Paginator) -> Self {
        Self {
            credentials,
            http: Client::new(),
            base: Url::parse(BASE_URL).expect("Kitsu base URL is valid"),
            pager,
        }
    }

    /// Point the client at another API root. The URL should end with `/`.
    pub fn with_endpoint(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Parse(format!("bad Kitsu path '{path}': {e}")))
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.credentials.bearer(Provider::Kitsu)?;
        Ok(req.bearer_auth(token).header("Accept", JSON_API))
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = self.authorized(req)?.send().await?;
        let resp = check_response(Provider::Kitsu, resp).await?;
        read_json(Provider::Kitsu, resp).await
    }

    async fn search_page(&self, query: &str, cursor: PageCursor) -> Result<Page<Media>, ApiError> {
        let PageCursor::Offset { offset, size } = cursor else {
            return Err(ApiError::Parse("Kitsu pages by offset".into()));
        };
        tracing::debug!(query, offset, "Kitsu search");

        let (limit, offset_param) = (size.to_string(), offset.to_string());
        let req = self.http.get(self.url("anime")?).query(&[
            ("filter[text]", query),
            ("page[limit]", limit.as_str()),
            ("page[offset]", offset_param.as_str()),
            ("fields[anime]", ANIME_FIELDS),
        ]);
        let body: JsonApiListResponse = self.send(req).await?;

        let has_next = body.links.as_ref().and_then(|l| l.next.as_ref()).is_some();
        let items = body.data.iter().filter_map(media_from_resource).collect();
        Ok(Page::new(items, has_next))
    }

    async fn list_page(
        &self,
        user_id: &str,
        status: Option<WatchStatus>,
        cursor: PageCursor,
    ) -> Result<Page<ListEntry>, ApiError> {
        let PageCursor::Offset { offset, size } = cursor else {
            return Err(ApiError::Parse("Kitsu pages by offset".into()));
        };

        let mut params = vec![
            ("filter[userId]", user_id.to_string()),
            ("filter[kind]", "anime".to_string()),
            ("include", "anime".to_string()),
            ("fields[libraryEntries]", ENTRY_FIELDS.to_string()),
            ("fields[anime]", ANIME_FIELDS.to_string()),
            ("page[limit]", size.to_string()),
            ("page[offset]", offset.to_string()),
        ];
        if let Some(status) = status {
            params.push(("filter[status]", status_to_kitsu(status).0.to_string()));
        }

        let req = self.http.get(self.url("library-entries")?).query(&params);
        let body: JsonApiListResponse = self.send(req).await?;

        let mut items = list_entries(&body);
        // Rewatches and first watches share the `current` filter.
        if let Some(wanted) = status {
            items.retain(|e| e.state.status == wanted);
        }
        let has_next = body.links.as_ref().and_then(|l| l.next.as_ref()).is_some();
        Ok(Page::new(items, has_next))
    }

    /// Find the library entry for a given anime, or `None` if not in the user's list.
    async fn find_library_entry(
        &self,
        user_id: &str,
        anime_id: u64,
    ) -> Result<Option<(String, KitsuLibraryAttributes)>, ApiError> {
        let anime_param = anime_id.to_string();
        let req = self.http.get(self.url("library-entries")?).query(&[
            ("filter[userId]", user_id),
            ("filter[animeId]", anime_param.as_str()),
            ("fields[libraryEntries]", ENTRY_FIELDS),
            ("page[limit]", "1"),
        ]);
        let body: JsonApiListResponse = self.send(req).await?;

        let Some(resource) = body.data.into_iter().next() else {
            return Ok(None);
        };
        let attrs: KitsuLibraryAttributes = serde_json::from_value(resource.attributes)
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(Some((resource.id, attrs)))
    }
}

impl AnimeTracker for KitsuClient {
    fn provider(&self) -> Provider {
        Provider::Kitsu
    }

    async fn search(&self, query: &str) -> Vec<Media> {
        let result = self
            .pager
            .fetch_all(PageCursor::first_offset(SEARCH_PAGE_SIZE), |cursor| {
                self.search_page(query, cursor)
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, query, "Kitsu search failed");
            Vec::new()
        })
    }

    async fn get_anime(&self, id: u64) -> Result<Option<Media>, ApiError> {
        let req = self.http.get(self.url(&format!("anime/{id}"))?).query(&[
            ("include", "mediaRelationships.destination"),
            ("fields[anime]", ANIME_FIELDS),
        ]);

        let body: JsonApiSingleResourceResponse = match self.send(req).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(mut media) = media_from_resource(&body.data) else {
            return Err(ApiError::Parse(format!("invalid Kitsu anime resource '{}'", body.data.id)));
        };
        media.relations = relations_from_included(&body.data, body.included.as_deref().unwrap_or_default());
        Ok(Some(media))
    }

    async fn get_user(&self) -> Result<UserIdentity, ApiError> {
        let req = self
            .http
            .get(self.url("users")?)
            .query(&[("filter[self]", "true"), ("fields[users]", "name")]);
        let body: JsonApiListResponse = self.send(req).await?;

        let user = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound("authenticated Kitsu user".into()))?;
        let name = user
            .attributes
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(UserIdentity { id: user.id, name })
    }

    async fn get_list_entry(
        &self,
        user: &UserIdentity,
        id: u64,
    ) -> Result<Option<WatchState>, ApiError> {
        let entry = self.find_library_entry(&user.id, id).await?;
        Ok(entry.and_then(|(_, attrs)| attrs.to_watch_state()))
    }

    async fn update_status(
        &self,
        user: &UserIdentity,
        id: u64,
        state: &WatchState,
    ) -> Result<(), ApiError> {
        let (status, reconsuming) = status_to_kitsu(state.status);
        let attributes = serde_json::json!({
            "status": status,
            "progress": state.progress,
            "reconsuming": reconsuming,
            "reconsumeCount": state.repeat_count,
            "startedAt": format_date(state.started_at),
            "finishedAt": format_date(state.completed_at),
        });

        // Kitsu doesn't upsert: PATCH an existing entry, POST a new one.
        let existing = self.find_library_entry(&user.id, id).await?;
        let (req, body) = match existing {
            Some((entry_id, _)) => {
                tracing::debug!(anime_id = id, entry_id = %entry_id, "Kitsu PATCH library entry");
                let req = self
                    .http
                    .patch(self.url(&format!("library-entries/{entry_id}"))?);
                let body = serde_json::json!({
                    "data": {
                        "id": entry_id,
                        "type": "libraryEntries",
                        "attributes": attributes,
                    }
                });
                (req, body)
            }
            None => {
                tracing::debug!(anime_id = id, "Kitsu POST library entry");
                let req = self.http.post(self.url("library-entries")?);
                let body = serde_json::json!({
                    "data": {
                        "type": "libraryEntries",
                        "attributes": attributes,
                        "relationships": {
                            "user": { "data": { "id": user.id, "type": "users" } },
                            "anime": { "data": { "id": id.to_string(), "type": "anime" } },
                        }
                    }
                });
                (req, body)
            }
        };

        let resp = self
            .authorized(req)?
            .header("Content-Type", JSON_API)
            .body(body.to_string())
            .send()
            .await?;
        check_response(Provider::Kitsu, resp).await?;
        Ok(())
    }

    async fn get_user_list(&self, user: &UserIdentity, status: Option<WatchStatus>) -> Vec<ListEntry> {
        let result = self
            .pager
            .fetch_all(PageCursor::first_offset(LIST_PAGE_SIZE), |cursor| {
                self.list_page(&user.id, status, cursor)
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, user = %user.name, "Kitsu list fetch failed");
            Vec::new()
        })
    }
}
