use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::traits::{ListEntry, Media, MediaRelation, TitleSet, WatchState, WatchStatus};

// ── GraphQL response wrappers ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    pub status: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
}

// ── Media ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MediaPageResponse {
    #[serde(rename = "Page")]
    pub page: MediaPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPage {
    pub page_info: PageInfo,
    pub media: Vec<AniListMedia>,
}

#[derive(Debug, Deserialize)]
pub struct MediaResponse {
    #[serde(rename = "Media")]
    pub media: Option<AniListMedia>,
}

#[derive(Debug, Deserialize)]
pub struct AniListMedia {
    pub id: u64,
    pub title: Option<AniListTitle>,
    pub episodes: Option<u32>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub relations: Option<RelationConnection>,
}

#[derive(Debug, Deserialize)]
pub struct AniListTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RelationConnection {
    #[serde(default)]
    pub edges: Vec<RelationEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationEdge {
    pub relation_type: Option<String>,
    pub node: Option<RelationNode>,
}

#[derive(Debug, Deserialize)]
pub struct RelationNode {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<AniListTitle>,
}

// ── Media list ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MediaListResponse {
    #[serde(rename = "MediaList")]
    pub media_list: Option<MediaListEntry>,
}

#[derive(Debug, Deserialize)]
pub struct MediaListPageResponse {
    #[serde(rename = "Page")]
    pub page: MediaListPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaListPage {
    pub page_info: PageInfo,
    pub media_list: Vec<MediaListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaListEntry {
    pub status: Option<String>,
    pub progress: Option<u32>,
    pub repeat: Option<u32>,
    pub started_at: Option<FuzzyDate>,
    pub completed_at: Option<FuzzyDate>,
    pub media: Option<AniListMedia>,
}

// ── Viewer ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ViewerResponse {
    #[serde(rename = "Viewer")]
    pub viewer: Viewer,
}

#[derive(Debug, Deserialize)]
pub struct Viewer {
    pub id: u64,
    pub name: String,
}

// ── Dates ────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct FuzzyDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl FuzzyDate {
    /// A complete date, or `None` when AniList only knows part of it.
    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year?, self.month?, self.day?)
    }

    /// `FuzzyDateInput` variables; all-null clears the field.
    pub fn input_json(date: Option<NaiveDate>) -> serde_json::Value {
        match date {
            Some(d) => serde_json::json!({ "year": d.year(), "month": d.month(), "day": d.day() }),
            None => serde_json::json!({ "year": null, "month": null, "day": null }),
        }
    }
}

// ── Status mapping ───────────────────────────────────────────────

/// Map AniList `MediaListStatus` to the internal status.
pub fn status_from_anilist(s: &str) -> Option<WatchStatus> {
    match s {
        "CURRENT" => Some(WatchStatus::Watching),
        "PLANNING" => Some(WatchStatus::Planning),
        "COMPLETED" => Some(WatchStatus::Completed),
        "DROPPED" => Some(WatchStatus::Dropped),
        "PAUSED" => Some(WatchStatus::Paused),
        "REPEATING" => Some(WatchStatus::Repeating),
        _ => None,
    }
}

/// Map the internal status to AniList `MediaListStatus`.
pub fn status_to_anilist(status: WatchStatus) -> &'static str {
    match status {
        WatchStatus::Watching => "CURRENT",
        WatchStatus::Planning => "PLANNING",
        WatchStatus::Completed => "COMPLETED",
        WatchStatus::Dropped => "DROPPED",
        WatchStatus::Paused => "PAUSED",
        WatchStatus::Repeating => "REPEATING",
    }
}

// ── Conversions ──────────────────────────────────────────────────

fn title_set(title: Option<AniListTitle>, synonyms: Vec<String>) -> TitleSet {
    let (romaji, english, native) = match title {
        Some(t) => (t.romaji, t.english, t.native),
        None => (None, None, None),
    };
    TitleSet {
        primary: romaji.or_else(|| english.clone()).unwrap_or_default(),
        english,
        native,
        synonyms,
    }
}

impl AniListMedia {
    pub fn into_media(self) -> Media {
        let relations = self
            .relations
            .map(|r| r.edges)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|edge| {
                let node = edge.node?;
                // Manga adaptations share the relation graph; keep anime only.
                if node.kind.as_deref().is_some_and(|k| k != "ANIME") {
                    return None;
                }
                Some(MediaRelation {
                    id: node.id,
                    relation: edge.relation_type.unwrap_or_default(),
                    title: node.title.and_then(|t| t.romaji.or(t.english)),
                })
            })
            .collect();

        Media {
            id: self.id,
            titles: title_set(self.title, self.synonyms),
            episodes: self.episodes,
            relations,
        }
    }
}

impl MediaListEntry {
    pub fn to_watch_state(&self) -> Option<WatchState> {
        let status = self.status.as_deref().and_then(status_from_anilist)?;
        Some(WatchState {
            status,
            progress: self.progress.unwrap_or(0),
            repeat_count: self.repeat.unwrap_or(0),
            started_at: self.started_at.as_ref().and_then(FuzzyDate::to_date),
            completed_at: self.completed_at.as_ref().and_then(FuzzyDate::to_date),
        })
    }

    pub fn into_list_entry(self) -> Option<ListEntry> {
        let state = self.to_watch_state()?;
        let media = self.media?.into_media();
        Some(ListEntry { media, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_media_page() {
        let json = r#"{
            "data": {
                "Page": {
                    "pageInfo": { "hasNextPage": true },
                    "media": [
                        {
                            "id": 154587,
                            "title": { "romaji": "Sousou no Frieren", "english": "Frieren: Beyond Journey's End", "native": "葬送のフリーレン" },
                            "episodes": 28,
                            "synonyms": ["Frieren"]
                        }
                    ]
                }
            }
        }"#;

        let resp: GraphQLResponse<MediaPageResponse> = serde_json::from_str(json).unwrap();
        let page = resp.data.unwrap().page;
        assert!(page.page_info.has_next_page);

        let media = page.media.into_iter().next().unwrap().into_media();
        assert_eq!(media.id, 154587);
        assert_eq!(media.titles.primary, "Sousou no Frieren");
        assert_eq!(media.titles.english.as_deref(), Some("Frieren: Beyond Journey's End"));
        assert_eq!(media.titles.synonyms, vec!["Frieren".to_string()]);
        assert_eq!(media.episodes, Some(28));
        assert!(media.relations.is_empty());
    }

    #[test]
    fn test_relations_keep_anime_edges() {
        let json = r#"{
            "id": 16498,
            "title": { "romaji": "Shingeki no Kyojin" },
            "episodes": 25,
            "relations": {
                "edges": [
                    { "relationType": "SEQUEL", "node": { "id": 20958, "type": "ANIME", "title": { "romaji": "Shingeki no Kyojin 2" } } },
                    { "relationType": "ADAPTATION", "node": { "id": 53390, "type": "MANGA", "title": { "romaji": "Shingeki no Kyojin" } } }
                ]
            }
        }"#;

        let media: AniListMedia = serde_json::from_str(json).unwrap();
        let media = media.into_media();
        assert_eq!(media.relations.len(), 1);
        assert_eq!(media.relations[0].id, 20958);
        assert_eq!(media.relations[0].relation, "SEQUEL");
    }

    #[test]
    fn test_media_list_entry_to_state() {
        let json = r#"{
            "status": "REPEATING",
            "progress": 4,
            "repeat": 2,
            "startedAt": { "year": 2024, "month": 3, "day": 9 },
            "completedAt": { "year": 2023, "month": null, "day": null }
        }"#;

        let entry: MediaListEntry = serde_json::from_str(json).unwrap();
        let state = entry.to_watch_state().unwrap();
        assert_eq!(state.status, WatchStatus::Repeating);
        assert_eq!(state.progress, 4);
        assert_eq!(state.repeat_count, 2);
        assert_eq!(state.started_at, NaiveDate::from_ymd_opt(2024, 3, 9));
        // Partial dates are not representable.
        assert_eq!(state.completed_at, None);
    }

    #[test]
    fn test_missing_media_list_is_none() {
        let json = r#"{ "data": { "MediaList": null }, "errors": [{ "message": "Not Found.", "status": 404 }] }"#;
        let resp: GraphQLResponse<MediaListResponse> = serde_json::from_str(json).unwrap();
        assert!(resp.data.unwrap().media_list.is_none());
        assert_eq!(resp.errors[0].status, Some(404));
    }

    #[test]
    fn test_status_mapping_round_trip() {
        for status in WatchStatus::ALL {
            assert_eq!(status_from_anilist(status_to_anilist(*status)), Some(*status));
        }
        assert_eq!(status_from_anilist("UNKNOWN"), None);
    }

    #[test]
    fn test_fuzzy_date_input() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31);
        assert_eq!(
            FuzzyDate::input_json(date),
            serde_json::json!({ "year": 2024, "month": 1, "day": 31 })
        );
        assert_eq!(
            FuzzyDate::input_json(None),
            serde_json::json!({ "year": null, "month": null, "day": null })
        );
    }
}
