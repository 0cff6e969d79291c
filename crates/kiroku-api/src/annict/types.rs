use serde::Deserialize;

use crate::traits::{ListEntry, Media, TitleSet, WatchState, WatchStatus};

#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl PageInfo {
    /// Continuation token, present only while more pages exist.
    pub fn next_token(self) -> Option<String> {
        self.end_cursor.filter(|_| self.has_next_page)
    }
}

// ── Works ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchWorksResponse {
    pub search_works: Option<WorkConnection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkConnection {
    #[serde(default)]
    pub nodes: Vec<AnnictWork>,
    pub page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnictWork {
    /// Relay node id, required by mutations.
    pub id: String,
    pub annict_id: u64,
    pub title: String,
    pub title_en: Option<String>,
    pub title_kana: Option<String>,
    pub title_ro: Option<String>,
    pub episodes_count: Option<u32>,
    pub viewer_status_state: Option<String>,
    pub episodes: Option<EpisodeConnection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeConnection {
    #[serde(default)]
    pub nodes: Vec<AnnictEpisode>,
    #[serde(default)]
    pub page_info: Option<PageInfo>,
}

/// Episode records of one work, paged on their own.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkEpisodesResponse {
    pub search_works: Option<WorkEpisodesConnection>,
}

#[derive(Debug, Deserialize)]
pub struct WorkEpisodesConnection {
    #[serde(default)]
    pub nodes: Vec<WorkEpisodes>,
}

#[derive(Debug, Deserialize)]
pub struct WorkEpisodes {
    pub episodes: Option<EpisodeConnection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnictEpisode {
    #[serde(default)]
    pub viewer_records_count: u32,
}

// ── Viewer ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ViewerResponse {
    pub viewer: AnnictViewer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnictViewer {
    pub annict_id: u64,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct LibraryResponse {
    pub viewer: LibraryViewer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryViewer {
    pub library_entries: LibraryEntryConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryEntryConnection {
    #[serde(default)]
    pub nodes: Vec<LibraryEntry>,
    pub page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
pub struct LibraryEntry {
    pub status: Option<LibraryStatus>,
    pub work: Option<AnnictWork>,
}

#[derive(Debug, Deserialize)]
pub struct LibraryStatus {
    pub state: String,
}

// ── Status mapping ───────────────────────────────────────────────

/// Map an Annict `StatusState` to the internal status.
///
/// `NO_STATE` means the work is not on the viewer's list.
pub fn status_from_annict(state: &str) -> Option<WatchStatus> {
    match state {
        "WANNA_WATCH" => Some(WatchStatus::Planning),
        "WATCHING" => Some(WatchStatus::Watching),
        "WATCHED" => Some(WatchStatus::Completed),
        "ON_HOLD" => Some(WatchStatus::Paused),
        "STOP_WATCHING" => Some(WatchStatus::Dropped),
        _ => None,
    }
}

/// Map the internal status to an Annict `StatusState`.
///
/// Annict has no rewatch state; a rewatch is recorded as watching.
pub fn status_to_annict(status: WatchStatus) -> &'static str {
    match status {
        WatchStatus::Planning => "WANNA_WATCH",
        WatchStatus::Watching | WatchStatus::Repeating => "WATCHING",
        WatchStatus::Completed => "WATCHED",
        WatchStatus::Paused => "ON_HOLD",
        WatchStatus::Dropped => "STOP_WATCHING",
    }
}

// ── Conversions ──────────────────────────────────────────────────

impl AnnictWork {
    /// Episodes the viewer has at least one record for.
    pub fn watched_episodes(&self) -> u32 {
        self.episodes
            .as_ref()
            .map(|e| e.nodes.iter().filter(|n| n.viewer_records_count > 0).count() as u32)
            .unwrap_or(0)
    }

    /// Cursor for the episode records past the embedded first page.
    pub fn episodes_continuation(&self) -> Option<String> {
        self.episodes.as_ref()?.page_info.clone()?.next_token()
    }

    /// Append the remaining episode records; the work is then complete.
    pub fn extend_episodes(&mut self, rest: Vec<AnnictEpisode>) {
        let conn = self.episodes.get_or_insert_with(|| EpisodeConnection {
            nodes: Vec::new(),
            page_info: None,
        });
        conn.nodes.extend(rest);
        conn.page_info = None;
    }

    /// Viewer state built from `viewerStatusState` and episode records.
    pub fn viewer_state(&self) -> Option<WatchState> {
        let status = self.viewer_status_state.as_deref().and_then(status_from_annict)?;
        Some(WatchState::new(status, self.watched_episodes()))
    }

    pub fn into_media(self) -> Media {
        let synonyms = [self.title_kana, self.title_ro]
            .into_iter()
            .flatten()
            .collect();
        Media {
            id: self.annict_id,
            titles: TitleSet {
                primary: self.title,
                english: self.title_en,
                native: None,
                synonyms,
            },
            // Annict reports 0 for works whose episodes aren't registered.
            episodes: self.episodes_count.filter(|n| *n > 0),
            relations: Vec::new(),
        }
    }
}

impl LibraryEntry {
    pub fn into_list_entry(self) -> Option<ListEntry> {
        let status = status_from_annict(&self.status?.state)?;
        let work = self.work?;
        let state = WatchState::new(status, work.watched_episodes());
        Some(ListEntry {
            media: work.into_media(),
            state,
        })
    }
}
