mod anime;
mod sync;

pub use anime::AnimeIdentity;
pub use sync::{PlaybackEvent, SyncKey, SyncOutcome, SyncRequest};
