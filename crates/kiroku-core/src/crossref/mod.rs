//! Offline cross-reference between tracker catalogs.
//!
//! The snapshot is the community `anime-list-full.json` table: one record per
//! AniDB entry with the sibling ids on other trackers. It is read-only here;
//! [`refresh`] replaces the file out of band and [`CrossReferenceStore`]
//! picks the new copy up on the next lookup.

pub mod refresh;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use kiroku_api::traits::Provider;
use serde::{Deserialize, Deserializer};

use crate::error::KirokuError;

/// One row of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CrossReferenceRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub anidb_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub anilist_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub kitsu_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub mal_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub simkl_id: Option<u64>,
}

impl CrossReferenceRecord {
    /// The catalog id on `provider`, if the snapshot carries one.
    ///
    /// Shikimori reuses MyAnimeList ids. Annict is not covered by the table.
    pub fn id_for(&self, provider: Provider) -> Option<u64> {
        let id = match provider {
            Provider::AniList => self.anilist_id,
            Provider::Kitsu => self.kitsu_id,
            Provider::Shikimori => self.mal_id,
            Provider::Simkl => self.simkl_id,
            Provider::Annict => None,
        };
        id.filter(|id| *id != 0)
    }
}

/// Ids appear as numbers, numeric strings, or junk like `"unknown"`.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Parsed snapshot, keyed by AniDB id.
#[derive(Debug, Default)]
pub struct CrossReferenceDb {
    by_anidb: HashMap<u64, CrossReferenceRecord>,
}

impl CrossReferenceDb {
    pub fn parse(bytes: &[u8]) -> Result<Self, KirokuError> {
        let records: Vec<CrossReferenceRecord> = serde_json::from_slice(bytes)
            .map_err(|e| KirokuError::Snapshot(format!("invalid snapshot: {e}")))?;
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: impl IntoIterator<Item = CrossReferenceRecord>) -> Self {
        let by_anidb = records
            .into_iter()
            .filter_map(|r| Some((r.anidb_id.filter(|id| *id != 0)?, r)))
            .collect();
        Self { by_anidb }
    }

    pub fn get(&self, anidb_id: u64) -> Option<&CrossReferenceRecord> {
        self.by_anidb.get(&anidb_id)
    }

    /// The `provider` id mapped from `anidb_id`, or `None` when no mapping is available.
    pub fn lookup(&self, anidb_id: u64, provider: Provider) -> Option<u64> {
        self.get(anidb_id)?.id_for(provider)
    }

    pub fn len(&self) -> usize {
        self.by_anidb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_anidb.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

/// Hands out consistent snapshots of the cross-reference file, re-reading it
/// whenever its size or modification time changes.
#[derive(Debug)]
pub struct CrossReferenceStore {
    path: Option<PathBuf>,
    cached: Mutex<Cached>,
}

#[derive(Debug)]
struct Cached {
    stamp: Option<FileStamp>,
    db: Arc<CrossReferenceDb>,
    /// Stamp of a file that failed to parse; not re-read until it changes.
    rejected: Option<(FileStamp, String)>,
}

impl Cached {
    fn new(db: CrossReferenceDb) -> Self {
        Self {
            stamp: None,
            db: Arc::new(db),
            rejected: None,
        }
    }
}

impl CrossReferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cached: Mutex::new(Cached::new(CrossReferenceDb::default())),
        }
    }

    /// A store over a fixed in-memory table.
    pub fn fixed(db: CrossReferenceDb) -> Self {
        Self {
            path: None,
            cached: Mutex::new(Cached::new(db)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The current snapshot. A missing file yields an empty table.
    ///
    /// Blocks on file I/O; async callers go through [`Self::load`].
    pub fn snapshot(&self) -> Result<Arc<CrossReferenceDb>, KirokuError> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        let Some(path) = &self.path else {
            return Ok(cached.db.clone());
        };

        let stamp = match std::fs::metadata(path) {
            Ok(meta) => Some(FileStamp {
                len: meta.len(),
                modified: meta.modified().ok(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if stamp == cached.stamp {
            return Ok(cached.db.clone());
        }
        if let (Some(stamp), Some((rejected, reason))) = (stamp, &cached.rejected) {
            if stamp == *rejected {
                return Err(KirokuError::Snapshot(reason.clone()));
            }
        }

        let db = match stamp {
            Some(stamp) => {
                let bytes = std::fs::read(path)?;
                match CrossReferenceDb::parse(&bytes) {
                    Ok(db) => {
                        tracing::info!(path = %path.display(), records = db.len(), "cross-reference snapshot loaded");
                        db
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "cross-reference snapshot rejected");
                        cached.rejected = Some((stamp, e.to_string()));
                        return Err(e);
                    }
                }
            }
            None => {
                tracing::warn!(path = %path.display(), "cross-reference snapshot missing, title search only");
                CrossReferenceDb::default()
            }
        };

        cached.stamp = stamp;
        cached.db = Arc::new(db);
        cached.rejected = None;
        Ok(cached.db.clone())
    }

    /// [`Self::snapshot`] on the blocking pool.
    pub async fn load(self: &Arc<Self>) -> Result<Arc<CrossReferenceDb>, KirokuError> {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || store.snapshot())
            .await
            .map_err(|e| KirokuError::Snapshot(format!("snapshot load task failed: {e}")))?
    }
}
