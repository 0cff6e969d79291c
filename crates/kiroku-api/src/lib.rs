pub mod anilist;
pub mod annict;
pub mod auth;
pub mod delay;
pub mod error;
pub mod kitsu;
pub mod paging;
pub mod shikimori;
pub mod simkl;
pub mod tracker;
pub mod traits;
