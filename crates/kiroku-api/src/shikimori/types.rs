use serde::Deserialize;

use crate::traits::{ListEntry, Media, MediaRelation, TitleSet, WatchState, WatchStatus};

/// Anime as returned by `/api/animes` and `/api/animes/{id}`.
///
/// Only the detail endpoint fills the alternate title arrays.
#[derive(Debug, Deserialize)]
pub struct ShikimoriAnime {
    pub id: u64,
    pub name: String,
    pub russian: Option<String>,
    #[serde(default)]
    pub english: Vec<Option<String>>,
    #[serde(default)]
    pub japanese: Vec<Option<String>>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub episodes: u32,
}

#[derive(Debug, Deserialize)]
pub struct ShikimoriRelated {
    pub relation: Option<String>,
    pub anime: Option<ShikimoriAnime>,
}

#[derive(Debug, Deserialize)]
pub struct ShikimoriUser {
    pub id: u64,
    pub nickname: String,
}

/// A `user_rate` record. `anime` is only embedded by `/api/users/{id}/anime_rates`.
#[derive(Debug, Deserialize)]
pub struct UserRate {
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub episodes: u32,
    #[serde(default)]
    pub rewatches: u32,
    pub anime: Option<ShikimoriAnime>,
}

// ── Status mapping ───────────────────────────────────────────────

pub fn status_from_shikimori(s: &str) -> Option<WatchStatus> {
    match s {
        "planned" => Some(WatchStatus::Planning),
        "watching" => Some(WatchStatus::Watching),
        "rewatching" => Some(WatchStatus::Repeating),
        "completed" => Some(WatchStatus::Completed),
        "on_hold" => Some(WatchStatus::Paused),
        "dropped" => Some(WatchStatus::Dropped),
        _ => None,
    }
}

pub fn status_to_shikimori(status: WatchStatus) -> &'static str {
    match status {
        WatchStatus::Planning => "planned",
        WatchStatus::Watching => "watching",
        WatchStatus::Repeating => "rewatching",
        WatchStatus::Completed => "completed",
        WatchStatus::Paused => "on_hold",
        WatchStatus::Dropped => "dropped",
    }
}

// ── Conversions ──────────────────────────────────────────────────

impl ShikimoriAnime {
    pub fn into_media(self) -> Media {
        let mut english = self.english.into_iter().flatten();
        let primary_english = english.next();
        let mut synonyms: Vec<String> = english.collect();
        synonyms.extend(self.synonyms);
        synonyms.extend(self.russian);

        Media {
            id: self.id,
            titles: TitleSet {
                primary: self.name,
                english: primary_english,
                native: self.japanese.into_iter().flatten().next(),
                synonyms,
            },
            // 0 means unknown (still airing, no episode count yet).
            episodes: (self.episodes > 0).then_some(self.episodes),
            relations: Vec::new(),
        }
    }
}

impl ShikimoriRelated {
    pub fn into_relation(self) -> Option<MediaRelation> {
        let anime = self.anime?;
        Some(MediaRelation {
            id: anime.id,
            relation: self.relation.unwrap_or_default(),
            title: Some(anime.name),
        })
    }
}

impl UserRate {
    /// Shikimori keeps no start or finish dates on a rate.
    pub fn to_watch_state(&self) -> Option<WatchState> {
        let status = status_from_shikimori(&self.status)?;
        Some(WatchState {
            status,
            progress: self.episodes,
            repeat_count: self.rewatches,
            started_at: None,
            completed_at: None,
        })
    }

    pub fn into_list_entry(self) -> Option<ListEntry> {
        let state = self.to_watch_state()?;
        Some(ListEntry {
            media: self.anime?.into_media(),
            state,
        })
    }
}

/// `user_rate` body for create/update requests.
pub fn user_rate_body(state: &WatchState) -> serde_json::Value {
    serde_json::json!({
        "status": status_to_shikimori(state.status),
        "episodes": state.progress,
        "rewatches": state.repeat_count,
    })
}
