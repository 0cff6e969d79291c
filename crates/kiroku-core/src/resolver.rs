use std::sync::Arc;

use kiroku_api::traits::{AnimeTracker, TitleSet};
use tracing::{debug, warn};

use crate::crossref::CrossReferenceStore;
use crate::error::ResolveError;
use crate::matcher::{match_title, MatchResult};
use crate::models::AnimeIdentity;

/// What the host knows about a local series.
#[derive(Debug, Clone, Copy)]
pub struct LocalSeries<'a> {
    pub item_id: &'a str,
    pub anidb_id: Option<u64>,
    pub title: &'a str,
}

/// Maps a local series onto a tracker's catalog.
///
/// The offline cross-reference is consulted first; title search on the
/// tracker is the fallback, and only an unambiguous exact title match is
/// accepted.
pub struct IdentityResolver {
    crossref: Arc<CrossReferenceStore>,
}

impl IdentityResolver {
    pub fn new(crossref: Arc<CrossReferenceStore>) -> Self {
        Self { crossref }
    }

    pub async fn resolve<T: AnimeTracker>(
        &self,
        tracker: &T,
        local: LocalSeries<'_>,
    ) -> Result<AnimeIdentity, ResolveError> {
        let provider = tracker.provider();

        if let Some(remote_id) = self.mapped_id(tracker, local.anidb_id).await {
            debug!(%provider, anidb = ?local.anidb_id, remote_id, "resolved through cross-reference");
            return Ok(AnimeIdentity::new(
                local.item_id,
                provider,
                remote_id,
                TitleSet::new(local.title),
            ));
        }

        let candidates = tracker.search(local.title).await;
        match match_title(local.title, &candidates) {
            MatchResult::Unique(media) => {
                debug!(%provider, title = local.title, remote_id = media.id, "resolved through title search");
                Ok(AnimeIdentity::new(local.item_id, provider, media.id, media.titles))
            }
            MatchResult::Ambiguous(ids) => {
                warn!(%provider, title = local.title, candidates = ?ids, "ambiguous title match");
                Err(ResolveError::Ambiguous {
                    provider,
                    title: local.title.to_string(),
                    candidates: ids,
                })
            }
            MatchResult::NoMatch => {
                warn!(%provider, title = local.title, searched = candidates.len(), "no title match");
                Err(ResolveError::NotFound {
                    provider,
                    title: local.title.to_string(),
                })
            }
        }
    }

    async fn mapped_id<T: AnimeTracker>(&self, tracker: &T, anidb_id: Option<u64>) -> Option<u64> {
        let anidb_id = anidb_id?;
        let snapshot = match self.crossref.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "cross-reference unavailable, falling back to search");
                return None;
            }
        };
        let mapped = snapshot.lookup(anidb_id, tracker.provider());
        if mapped.is_none() {
            debug!(provider = %tracker.provider(), anidb_id, "no mapping available");
        }
        mapped
    }
}

#[cfg(test)]
mod tests {
    use kiroku_api::traits::Provider;

    use super::*;
    use crate::crossref::{CrossReferenceDb, CrossReferenceRecord};
    use crate::testing::{media, FakeTracker};

    fn resolver(records: Vec<CrossReferenceRecord>) -> IdentityResolver {
        let db = CrossReferenceDb::from_records(records);
        IdentityResolver::new(Arc::new(CrossReferenceStore::fixed(db)))
    }

    fn local<'a>(anidb_id: Option<u64>, title: &'a str) -> LocalSeries<'a> {
        LocalSeries {
            item_id: "item-1",
            anidb_id,
            title,
        }
    }

    #[tokio::test]
    async fn test_mapping_skips_search() {
        let resolver = resolver(vec![CrossReferenceRecord {
            anidb_id: Some(1),
            anilist_id: Some(100),
            ..Default::default()
        }]);
        let tracker = FakeTracker::new(Provider::AniList);

        let identity = resolver.resolve(&tracker, local(Some(1), "Anything")).await.unwrap();
        assert_eq!(identity.remote_id, 100);
        assert_eq!(identity.provider, Provider::AniList);
        assert!(tracker.searches().is_empty());
    }

    #[tokio::test]
    async fn test_zero_mapping_falls_back_to_search() {
        let resolver = resolver(vec![CrossReferenceRecord {
            anidb_id: Some(1),
            anilist_id: Some(0),
            ..Default::default()
        }]);
        let tracker = FakeTracker::new(Provider::AniList)
            .with_catalog(vec![media(42, "Cowboy Bebop", Some(26))]);

        let identity = resolver
            .resolve(&tracker, local(Some(1), "cowboy bebop"))
            .await
            .unwrap();
        assert_eq!(identity.remote_id, 42);
        assert_eq!(tracker.searches(), vec!["cowboy bebop".to_string()]);
    }

    #[tokio::test]
    async fn test_unique_title_match() {
        let resolver = resolver(Vec::new());
        let tracker = FakeTracker::new(Provider::Kitsu).with_catalog(vec![
            media(7, "Sousou no Frieren", Some(28)),
            media(8, "Sousou no Frieren: Marumaru no Mahou", None),
        ]);

        let identity = resolver
            .resolve(&tracker, local(None, "Sousou no Frieren"))
            .await
            .unwrap();
        assert_eq!(identity.remote_id, 7);
        assert_eq!(identity.titles.primary, "Sousou no Frieren");
    }

    #[tokio::test]
    async fn test_two_exact_matches_are_ambiguous() {
        let resolver = resolver(Vec::new());
        let tracker = FakeTracker::new(Provider::AniList).with_catalog(vec![
            media(1, "Hunter x Hunter", Some(62)),
            media(2, "Hunter x Hunter", Some(148)),
        ]);

        let err = resolver
            .resolve(&tracker, local(None, "Hunter x Hunter"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::Ambiguous {
                provider: Provider::AniList,
                title: "Hunter x Hunter".into(),
                candidates: vec![1, 2],
            }
        );
    }

    #[tokio::test]
    async fn test_no_candidates_is_not_found() {
        let resolver = resolver(Vec::new());
        let tracker = FakeTracker::new(Provider::Shikimori);

        let err = resolver
            .resolve(&tracker, local(Some(5), "Unknown Show"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { provider: Provider::Shikimori, .. }));
    }
}
