use kiroku_api::traits::Media;

use crate::normalize::title_key;

/// Result of matching a title against search candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// Exactly one catalog entry carries the title.
    Unique(Media),
    /// More than one distinct catalog entry carries the title.
    Ambiguous(Vec<u64>),
    /// No candidate carries the title.
    NoMatch,
}

/// Pick the candidate whose title variants contain `query`, compared
/// case- and space-insensitively. No fuzzy fallback: a near miss is a miss.
///
/// Candidates repeated across search pages are collapsed by id first.
pub fn match_title(query: &str, candidates: &[Media]) -> MatchResult {
    let key = title_key(query);
    if key.is_empty() {
        return MatchResult::NoMatch;
    }

    let mut hits: Vec<&Media> = Vec::new();
    for media in candidates {
        if hits.iter().any(|m| m.id == media.id) {
            continue;
        }
        if all_titles(media).any(|t| title_key(t) == key) {
            hits.push(media);
        }
    }

    match hits.as_slice() {
        [] => MatchResult::NoMatch,
        [only] => MatchResult::Unique((*only).clone()),
        many => MatchResult::Ambiguous(many.iter().map(|m| m.id).collect()),
    }
}

/// Every title variant of a catalog entry (primary, English, native, synonyms).
pub fn all_titles(media: &Media) -> impl Iterator<Item = &str> {
    media.titles.iter()
}
