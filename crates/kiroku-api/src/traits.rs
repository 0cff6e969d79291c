//! Trait definitions for anime tracking services.
//!
//! All tracker clients (AniList, Kitsu, Annict, Simkl, Shikimori) implement
//! [`AnimeTracker`], normalizing their wire formats into the records below so
//! the reconciliation layer never sees a tracker-specific vocabulary.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Supported tracking services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    AniList,
    Kitsu,
    Annict,
    Simkl,
    Shikimori,
}

impl Provider {
    pub const ALL: &[Provider] = &[
        Self::AniList,
        Self::Kitsu,
        Self::Annict,
        Self::Simkl,
        Self::Shikimori,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AniList => "anilist",
            Self::Kitsu => "kitsu",
            Self::Annict => "annict",
            Self::Simkl => "simkl",
            Self::Shikimori => "shikimori",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown tracker '{s}'"))
    }
}

/// Watch status, collapsed from every tracker's own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    Planning,
    Watching,
    Completed,
    Dropped,
    Paused,
    Repeating,
}

impl WatchStatus {
    pub const ALL: &[WatchStatus] = &[
        Self::Planning,
        Self::Watching,
        Self::Completed,
        Self::Dropped,
        Self::Paused,
        Self::Repeating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Watching => "watching",
            Self::Completed => "completed",
            Self::Dropped => "dropped",
            Self::Paused => "paused",
            Self::Repeating => "repeating",
        }
    }
}

impl fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's recorded (or desired) state for one anime on one tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchState {
    pub status: WatchStatus,
    pub progress: u32,
    pub repeat_count: u32,
    pub started_at: Option<NaiveDate>,
    pub completed_at: Option<NaiveDate>,
}

impl WatchState {
    pub fn new(status: WatchStatus, progress: u32) -> Self {
        Self {
            status,
            progress,
            repeat_count: 0,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Primary title plus every alternate a tracker reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleSet {
    pub primary: String,
    pub english: Option<String>,
    pub native: Option<String>,
    pub synonyms: Vec<String>,
}

impl TitleSet {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            ..Default::default()
        }
    }

    /// Every non-empty title variant, primary first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str())
            .chain(self.english.as_deref())
            .chain(self.native.as_deref())
            .chain(self.synonyms.iter().map(String::as_str))
            .filter(|t| !t.trim().is_empty())
    }
}

/// A related catalog entry (sequel, prequel, side story, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRelation {
    pub id: u64,
    pub relation: String,
    pub title: Option<String>,
}

/// A catalog entry on one tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: u64,
    pub titles: TitleSet,
    pub episodes: Option<u32>,
    pub relations: Vec<MediaRelation>,
}

/// One row of the authenticated user's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub media: Media,
    pub state: WatchState,
}

/// The account a tracker client is authenticated as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
}

/// A unified anime tracking service interface.
///
/// Listing operations go through the [`Paginator`](crate::paging::Paginator)
/// and degrade to partial (or empty) results; single-item operations return
/// `Err` after logging the failure. No operation retries.
pub trait AnimeTracker: Send + Sync {
    fn provider(&self) -> Provider;

    /// Search the catalog by title. Empty on total failure.
    fn search(&self, query: &str) -> impl Future<Output = Vec<Media>> + Send;

    /// Fetch a single catalog entry, including relation edges where exposed.
    fn get_anime(&self, id: u64)
        -> impl Future<Output = Result<Option<Media>, ApiError>> + Send;

    /// Resolve the account behind the current credential.
    fn get_user(&self) -> impl Future<Output = Result<UserIdentity, ApiError>> + Send;

    /// Load the user's current state for one catalog entry, `None` if untracked.
    fn get_list_entry(
        &self,
        user: &UserIdentity,
        id: u64,
    ) -> impl Future<Output = Result<Option<WatchState>, ApiError>> + Send;

    /// Write the whole state in one mutation.
    fn update_status(
        &self,
        user: &UserIdentity,
        id: u64,
        state: &WatchState,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// List the user's tracked entries, optionally filtered by status.
    fn get_user_list(
        &self,
        user: &UserIdentity,
        status: Option<WatchStatus>,
    ) -> impl Future<Output = Vec<ListEntry>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip_names() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>(), Ok(*provider));
        }
        assert_eq!("AniList".parse::<Provider>(), Ok(Provider::AniList));
        assert!("myanimelist".parse::<Provider>().is_err());
    }

    #[test]
    fn test_title_set_skips_blank_variants() {
        let titles = TitleSet {
            primary: "Sousou no Frieren".into(),
            english: Some("Frieren: Beyond Journey's End".into()),
            native: Some("  ".into()),
            synonyms: vec!["Frieren".into()],
        };
        let all: Vec<&str> = titles.iter().collect();
        assert_eq!(
            all,
            vec![
                "Sousou no Frieren",
                "Frieren: Beyond Journey's End",
                "Frieren"
            ]
        );
    }

    #[test]
    fn test_provider_serde_lowercase() {
        let json = serde_json::to_string(&Provider::Shikimori).unwrap();
        assert_eq!(json, "\"shikimori\"");
        let back: Provider = serde_json::from_str("\"anilist\"").unwrap();
        assert_eq!(back, Provider::AniList);
    }
}
