use kiroku_api::traits::{Provider, TitleSet};
use serde::{Deserialize, Serialize};

/// A local library item resolved to one tracker's catalog entry.
///
/// Built once per (item, tracker) pair during a sync attempt and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeIdentity {
    pub local_id: String,
    pub provider: Provider,
    pub remote_id: u64,
    pub titles: TitleSet,
}

impl AnimeIdentity {
    pub fn new(local_id: impl Into<String>, provider: Provider, remote_id: u64, titles: TitleSet) -> Self {
        Self {
            local_id: local_id.into(),
            provider,
            remote_id,
            titles,
        }
    }
}
