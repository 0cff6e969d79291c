use chrono::NaiveDate;
use serde::Deserialize;

use crate::traits::{ListEntry, Media, TitleSet, WatchState, WatchStatus};

#[derive(Debug, Default, Deserialize)]
pub struct SimklIds {
    #[serde(alias = "simkl_id")]
    pub simkl: Option<u64>,
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimklAltTitle {
    pub name: String,
}

/// Catalog record, shared by search results and `/anime/{id}`.
#[derive(Debug, Deserialize)]
pub struct SimklAnime {
    pub title: Option<String>,
    pub title_romaji: Option<String>,
    #[serde(alias = "title_en")]
    pub en_title: Option<String>,
    #[serde(default)]
    pub ids: SimklIds,
    #[serde(alias = "ep_count")]
    pub total_episodes: Option<u32>,
    #[serde(default)]
    pub alt_titles: Vec<SimklAltTitle>,
}

#[derive(Debug, Deserialize)]
pub struct SettingsResponse {
    pub user: SettingsUser,
    pub account: SettingsAccount,
}

#[derive(Debug, Deserialize)]
pub struct SettingsUser {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SettingsAccount {
    pub id: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct AllItemsResponse {
    #[serde(default)]
    pub anime: Vec<SimklListItem>,
}

#[derive(Debug, Deserialize)]
pub struct SimklListItem {
    pub status: String,
    pub watched_episodes_count: Option<u32>,
    pub total_episodes_count: Option<u32>,
    pub added_to_watchlist_at: Option<String>,
    pub last_watched_at: Option<String>,
    pub show: SimklAnime,
}

// ── Status mapping ───────────────────────────────────────────────

/// Map a Simkl list name to the internal status.
pub fn status_from_simkl(list: &str) -> Option<WatchStatus> {
    match list {
        "watching" => Some(WatchStatus::Watching),
        "plantowatch" => Some(WatchStatus::Planning),
        "hold" => Some(WatchStatus::Paused),
        "completed" => Some(WatchStatus::Completed),
        "dropped" => Some(WatchStatus::Dropped),
        _ => None,
    }
}

/// Map the internal status to a Simkl list name. Simkl has no rewatch list.
pub fn status_to_simkl(status: WatchStatus) -> &'static str {
    match status {
        WatchStatus::Watching | WatchStatus::Repeating => "watching",
        WatchStatus::Planning => "plantowatch",
        WatchStatus::Paused => "hold",
        WatchStatus::Completed => "completed",
        WatchStatus::Dropped => "dropped",
    }
}

fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value?.get(..10)?, "%Y-%m-%d").ok()
}

// ── Conversions ──────────────────────────────────────────────────

impl SimklAnime {
    pub fn into_media(self) -> Option<Media> {
        let id = self.ids.simkl?;
        let mut synonyms: Vec<String> = self.alt_titles.into_iter().map(|t| t.name).collect();
        let primary = match (self.title, self.title_romaji) {
            (Some(title), Some(romaji)) => {
                if romaji != title {
                    synonyms.push(romaji);
                }
                title
            }
            (title, romaji) => title.or(romaji).unwrap_or_default(),
        };
        Some(Media {
            id,
            titles: TitleSet {
                primary,
                english: self.en_title,
                native: None,
                synonyms,
            },
            episodes: self.total_episodes.filter(|n| *n > 0),
            relations: Vec::new(),
        })
    }
}

impl SimklListItem {
    pub fn simkl_id(&self) -> Option<u64> {
        self.show.ids.simkl
    }

    pub fn to_watch_state(&self) -> Option<WatchState> {
        let status = status_from_simkl(&self.status)?;
        Some(WatchState {
            status,
            progress: self.watched_episodes_count.unwrap_or(0),
            repeat_count: 0,
            started_at: parse_date(self.added_to_watchlist_at.as_deref()),
            completed_at: if status == WatchStatus::Completed {
                parse_date(self.last_watched_at.as_deref())
            } else {
                None
            },
        })
    }

    pub fn into_list_entry(self) -> Option<ListEntry> {
        let state = self.to_watch_state()?;
        let mut media = self.show.into_media()?;
        media.episodes = media.episodes.or(self.total_episodes_count.filter(|n| *n > 0));
        Some(ListEntry { media, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_search_result() {
        let json = r#"[
            {
                "title": "Sousou no Frieren",
                "title_romaji": "Sousou no Frieren",
                "title_en": "Frieren: Beyond Journey's End",
                "ids": { "simkl_id": 2138752, "slug": "sousou-no-frieren" },
                "ep_count": 28
            }
        ]"#;

        let results: Vec<SimklAnime> = serde_json::from_str(json).unwrap();
        let media = results.into_iter().next().unwrap().into_media().unwrap();
        assert_eq!(media.id, 2138752);
        assert_eq!(media.titles.primary, "Sousou no Frieren");
        assert!(media.titles.synonyms.is_empty());
        assert_eq!(media.titles.english.as_deref(), Some("Frieren: Beyond Journey's End"));
        assert_eq!(media.episodes, Some(28));
    }

    #[test]
    fn test_all_items_to_list_entries() {
        let json = r#"{
            "anime": [
                {
                    "status": "completed",
                    "watched_episodes_count": 12,
                    "total_episodes_count": 12,
                    "added_to_watchlist_at": "2024-01-05T10:00:00Z",
                    "last_watched_at": "2024-03-28T21:04:00Z",
                    "show": { "title": "Bocchi the Rock!", "ids": { "simkl": 1801357 } }
                },
                {
                    "status": "unknown_list",
                    "show": { "title": "x", "ids": { "simkl": 1 } }
                }
            ]
        }"#;

        let resp: AllItemsResponse = serde_json::from_str(json).unwrap();
        let entries: Vec<ListEntry> = resp
            .anime
            .into_iter()
            .filter_map(SimklListItem::into_list_entry)
            .collect();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.media.id, 1801357);
        assert_eq!(entry.media.episodes, Some(12));
        assert_eq!(entry.state.status, WatchStatus::Completed);
        assert_eq!(entry.state.progress, 12);
        assert_eq!(entry.state.completed_at, NaiveDate::from_ymd_opt(2024, 3, 28));
        assert_eq!(entry.state.started_at, NaiveDate::from_ymd_opt(2024, 1, 5));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_to_simkl(WatchStatus::Repeating), "watching");
        assert_eq!(status_from_simkl("hold"), Some(WatchStatus::Paused));
        assert_eq!(status_from_simkl("plantowatch"), Some(WatchStatus::Planning));
        assert_eq!(status_from_simkl("notinteresting"), None);
    }
}
