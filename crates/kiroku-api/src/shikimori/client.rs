use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use url::Url;

use super::types::{
    status_to_shikimori, user_rate_body, ShikimoriAnime, ShikimoriRelated, ShikimoriUser, UserRate,
};
use crate::auth::Credentials;
use crate::error::{check_response, read_json, ApiError};
use crate::paging::{Page, PageCursor, Paginator};
use crate::traits::{AnimeTracker, ListEntry, Media, Provider, UserIdentity, WatchState, WatchStatus};

const BASE_URL: &str = "https://shikimori.one/";
const SEARCH_PAGE_SIZE: u32 = 50;
const LIST_PAGE_SIZE: u32 = 500;

/// Shikimori REST client. Anime ids are MyAnimeList ids.
///
/// Shikimori rejects requests without an identifying `User-Agent`.
pub struct ShikimoriClient {
    credentials: Arc<dyn Credentials>,
    http: Client,
    base: Url,
    pager: Paginator,
}

impl ShikimoriClient {
    pub fn new(credentials: Arc<dyn Credentials>, pager: Paginator, user_agent: &str) -> Self {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default HTTP client");
                Client::new()
            });
        Self {
            credentials,
            http,
            base: Url::parse(BASE_URL).expect("Shikimori base URL is valid"),
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
            .map_err(|e| ApiError::Parse(format!("bad Shikimori path '{path}': {e}")))
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let token = self.credentials.bearer(Provider::Shikimori)?;
        let resp = req.bearer_auth(token).send().await?;
        let resp = check_response(Provider::Shikimori, resp).await?;
        read_json(Provider::Shikimori, resp).await
    }

    async fn search_page(&self, query: &str, cursor: PageCursor) -> Result<Page<Media>, ApiError> {
        let PageCursor::Number { page, size } = cursor else {
            return Err(ApiError::Parse("Shikimori pages by number".into()));
        };
        tracing::debug!(query, page, "Shikimori search");

        let (limit, page_param) = (size.to_string(), page.to_string());
        let req = self.http.get(self.url("api/animes")?).query(&[
            ("search", query),
            ("limit", limit.as_str()),
            ("page", page_param.as_str()),
        ]);
        let results: Vec<ShikimoriAnime> = self.send(req).await?;

        // No page count is reported; a full page means there may be more.
        let has_next = results.len() >= size as usize;
        let items = results.into_iter().map(ShikimoriAnime::into_media).collect();
        Ok(Page::new(items, has_next))
    }

    async fn rates_page(
        &self,
        user_id: &str,
        status: Option<WatchStatus>,
        cursor: PageCursor,
    ) -> Result<Page<ListEntry>, ApiError> {
        let PageCursor::Number { page, size } = cursor else {
            return Err(ApiError::Parse("Shikimori pages by number".into()));
        };

        let mut params = vec![("limit", size.to_string()), ("page", page.to_string())];
        if let Some(status) = status {
            params.push(("status", status_to_shikimori(status).to_string()));
        }
        let req = self
            .http
            .get(self.url(&format!("api/users/{user_id}/anime_rates"))?)
            .query(&params);
        let mut rates: Vec<UserRate> = self.send(req).await?;

        // This endpoint returns one extra record when another page exists.
        let has_next = rates.len() > size as usize;
        rates.truncate(size as usize);
        let items = rates.into_iter().filter_map(UserRate::into_list_entry).collect();
        Ok(Page::new(items, has_next))
    }

    async fn find_rate(&self, user_id: &str, anime_id: u64) -> Result<Option<UserRate>, ApiError> {
        let target_id = anime_id.to_string();
        let req = self.http.get(self.url("api/v2/user_rates")?).query(&[
            ("user_id", user_id),
            ("target_id", target_id.as_str()),
            ("target_type", "Anime"),
        ]);
        let rates: Vec<UserRate> = self.send(req).await?;
        Ok(rates.into_iter().next())
    }
}

impl AnimeTracker for ShikimoriClient {
    fn provider(&self) -> Provider {
        Provider::Shikimori
    }

    async fn search(&self, query: &str) -> Vec<Media> {
        let result = self
            .pager
            .fetch_all(PageCursor::first_page(SEARCH_PAGE_SIZE), |cursor| {
                self.search_page(query, cursor)
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, query, "Shikimori search failed");
            Vec::new()
        })
    }

    async fn get_anime(&self, id: u64) -> Result<Option<Media>, ApiError> {
        let req = self.http.get(self.url(&format!("api/animes/{id}"))?);
        let anime: ShikimoriAnime = match self.send(req).await {
            Ok(anime) => anime,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut media = anime.into_media();

        let req = self.http.get(self.url(&format!("api/animes/{id}/related"))?);
        match self.send::<Vec<ShikimoriRelated>>(req).await {
            Ok(related) => {
                media.relations = related
                    .into_iter()
                    .filter_map(ShikimoriRelated::into_relation)
                    .collect();
            }
            Err(e) => tracing::warn!(error = %e, anime_id = id, "Shikimori relations unavailable"),
        }
        Ok(Some(media))
    }

    async fn get_user(&self) -> Result<UserIdentity, ApiError> {
        let req = self.http.get(self.url("api/users/whoami")?);
        let user: Option<ShikimoriUser> = self.send(req).await?;
        let user = user.ok_or(ApiError::Unauthenticated(Provider::Shikimori))?;
        Ok(UserIdentity {
            id: user.id.to_string(),
            name: user.nickname,
        })
    }

    async fn get_list_entry(
        &self,
        user: &UserIdentity,
        id: u64,
    ) -> Result<Option<WatchState>, ApiError> {
        let rate = self.find_rate(&user.id, id).await?;
        Ok(rate.and_then(|r| r.to_watch_state()))
    }

    async fn update_status(
        &self,
        user: &UserIdentity,
        id: u64,
        state: &WatchState,
    ) -> Result<(), ApiError> {
        let mut rate = user_rate_body(state);

        let req = match self.find_rate(&user.id, id).await? {
            Some(existing) => {
                tracing::debug!(anime_id = id, rate_id = existing.id, "Shikimori PATCH user_rate");
                self.http
                    .patch(self.url(&format!("api/v2/user_rates/{}", existing.id))?)
            }
            None => {
                tracing::debug!(anime_id = id, "Shikimori POST user_rate");
                let user_id: u64 = user.id.parse().map_err(|_| {
                    ApiError::Parse(format!("Shikimori user id '{}' is not numeric", user.id))
                })?;
                rate["user_id"] = serde_json::json!(user_id);
                rate["target_id"] = serde_json::json!(id);
                rate["target_type"] = serde_json::json!("Anime");
                self.http.post(self.url("api/v2/user_rates")?)
            }
        };

        let _: serde_json::Value = self
            .send(req.json(&serde_json::json!({ "user_rate": rate })))
            .await?;
        Ok(())
    }

    async fn get_user_list(&self, user: &UserIdentity, status: Option<WatchStatus>) -> Vec<ListEntry> {
        let result = self
            .pager
            .fetch_all(PageCursor::first_page(LIST_PAGE_SIZE), |cursor| {
                self.rates_page(&user.id, status, cursor)
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, user = %user.name, "Shikimori list fetch failed");
            Vec::new()
        })
    }
}
