use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::traits::{ListEntry, Media, MediaRelation, TitleSet, WatchState, WatchStatus};

// ── JSON:API response types ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct JsonApiListResponse {
    pub data: Vec<JsonApiResource>,
    pub included: Option<Vec<JsonApiResource>>,
    pub links: Option<Links>,
}

#[derive(Debug, Deserialize)]
pub struct JsonApiSingleResourceResponse {
    pub data: JsonApiResource,
    pub included: Option<Vec<JsonApiResource>>,
}

#[derive(Debug, Deserialize)]
pub struct JsonApiResource {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
    pub relationships: Option<serde_json::Value>,
}

impl JsonApiResource {
    /// `relationships.<name>.data.id` for a to-one relationship.
    pub fn related_id(&self, name: &str) -> Option<&str> {
        self.relationships
            .as_ref()?
            .get(name)?
            .get("data")?
            .get("id")?
            .as_str()
    }

    /// `relationships.<name>.data[].id` for a to-many relationship.
    pub fn related_ids(&self, name: &str) -> Vec<&str> {
        self.relationships
            .as_ref()
            .and_then(|r| r.get(name))
            .and_then(|r| r.get("data"))
            .and_then(|d| d.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("id").and_then(|id| id.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct Links {
    pub next: Option<String>,
}

// ── Kitsu-specific types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitsuAnimeAttributes {
    pub canonical_title: Option<String>,
    pub titles: Option<KitsuTitles>,
    #[serde(default)]
    pub abbreviated_titles: Option<Vec<String>>,
    pub episode_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct KitsuTitles {
    pub en: Option<String>,
    pub en_jp: Option<String>,
    pub ja_jp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitsuLibraryAttributes {
    pub progress: Option<u32>,
    pub status: Option<String>,
    #[serde(default)]
    pub reconsuming: bool,
    pub reconsume_count: Option<u32>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KitsuRelationshipAttributes {
    pub role: Option<String>,
}

// ── Status mapping ──────────────────────────────────────────────

/// Map a Kitsu library status to the internal status.
///
/// Kitsu has no rewatching status; a `current` entry with `reconsuming` set
/// is a rewatch.
pub fn status_from_kitsu(status: &str, reconsuming: bool) -> Option<WatchStatus> {
    match status {
        "current" if reconsuming => Some(WatchStatus::Repeating),
        "current" => Some(WatchStatus::Watching),
        "planned" => Some(WatchStatus::Planning),
        "completed" => Some(WatchStatus::Completed),
        "on_hold" => Some(WatchStatus::Paused),
        "dropped" => Some(WatchStatus::Dropped),
        _ => None,
    }
}

/// Map the internal status to Kitsu's `(status, reconsuming)` pair.
pub fn status_to_kitsu(status: WatchStatus) -> (&'static str, bool) {
    match status {
        WatchStatus::Watching => ("current", false),
        WatchStatus::Repeating => ("current", true),
        WatchStatus::Planning => ("planned", false),
        WatchStatus::Completed => ("completed", false),
        WatchStatus::Paused => ("on_hold", false),
        WatchStatus::Dropped => ("dropped", false),
    }
}

// ── Dates ────────────────────────────────────────────────────────

/// Kitsu timestamps are ISO-8601 datetimes; only the date part is kept.
pub fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    let value = value?;
    NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok()
}

pub fn format_date(date: Option<NaiveDate>) -> serde_json::Value {
    match date {
        Some(d) => serde_json::json!(format!("{}T00:00:00.000Z", d.format("%Y-%m-%d"))),
        None => serde_json::Value::Null,
    }
}

// ── Conversions ──────────────────────────────────────────────────

impl KitsuAnimeAttributes {
    pub fn into_media(self, id: u64) -> Media {
        let (english, romaji, native) = match self.titles {
            Some(t) => (t.en, t.en_jp, t.ja_jp),
            None => (None, None, None),
        };
        let mut synonyms = self.abbreviated_titles.unwrap_or_default();
        let primary = match self.canonical_title {
            Some(canonical) => {
                // The canonical title is usually the romaji one; keep the
                // other when they differ.
                if let Some(r) = romaji.filter(|r| *r != canonical) {
                    synonyms.push(r);
                }
                canonical
            }
            None => romaji.or_else(|| english.clone()).unwrap_or_default(),
        };

        Media {
            id,
            titles: TitleSet {
                primary,
                english,
                native,
                synonyms,
            },
            episodes: self.episode_count,
            relations: Vec::new(),
        }
    }
}

impl KitsuLibraryAttributes {
    pub fn to_watch_state(&self) -> Option<WatchState> {
        let status = status_from_kitsu(self.status.as_deref()?, self.reconsuming)?;
        Some(WatchState {
            status,
            progress: self.progress.unwrap_or(0),
            repeat_count: self.reconsume_count.unwrap_or(0),
            started_at: parse_date(self.started_at.as_deref()),
            completed_at: parse_date(self.finished_at.as_deref()),
        })
    }
}

/// Parse an anime resource into a [`Media`].
pub fn media_from_resource(resource: &JsonApiResource) -> Option<Media> {
    let id: u64 = resource.id.parse().ok()?;
    let attrs: KitsuAnimeAttributes = serde_json::from_value(resource.attributes.clone()).ok()?;
    Some(attrs.into_media(id))
}

/// Resolve `mediaRelationships` of `anime` through the `included` array.
pub fn relations_from_included(
    anime: &JsonApiResource,
    included: &[JsonApiResource],
) -> Vec<MediaRelation> {
    let by_key: HashMap<(&str, &str), &JsonApiResource> = included
        .iter()
        .map(|r| ((r.type_.as_str(), r.id.as_str()), r))
        .collect();

    anime
        .related_ids("mediaRelationships")
        .into_iter()
        .filter_map(|rel_id| {
            let rel = by_key.get(&("mediaRelationships", rel_id))?;
            let dest = rel.relationships.as_ref()?.get("destination")?.get("data")?;
            // Manga destinations are skipped.
            if dest.get("type")?.as_str()? != "anime" {
                return None;
            }
            let dest_id = dest.get("id")?.as_str()?;
            let role: KitsuRelationshipAttributes =
                serde_json::from_value(rel.attributes.clone()).ok()?;
            let title = by_key
                .get(&("anime", dest_id))
                .and_then(|r| media_from_resource(r))
                .map(|m| m.titles.primary);
            Some(MediaRelation {
                id: dest_id.parse().ok()?,
                relation: role.role.unwrap_or_default(),
                title,
            })
        })
        .collect()
}

/// Pair each library entry with its included anime.
pub fn list_entries(page: &JsonApiListResponse) -> Vec<ListEntry> {
    let anime: HashMap<&str, &JsonApiResource> = page
        .included
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter(|r| r.type_ == "anime")
        .map(|r| (r.id.as_str(), r))
        .collect();

    page.data
        .iter()
        .filter_map(|entry| {
            let attrs: KitsuLibraryAttributes =
                serde_json::from_value(entry.attributes.clone()).ok()?;
            let state = attrs.to_watch_state()?;
            let media = media_from_resource(anime.get(entry.related_id("anime")?)?)?;
            Some(ListEntry { media, state })
        })
        .collect()
}
