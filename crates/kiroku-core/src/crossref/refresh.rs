//! Scheduled refresh of the cross-reference snapshot.

use std::path::{Path, PathBuf};

use crate::crossref::CrossReferenceDb;
use crate::error::KirokuError;

/// What a refresh did to the stored copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The stored copy was replaced.
    Updated { bytes: u64, records: usize },
    /// The download has the same size as the stored copy; nothing was written.
    Unchanged { bytes: u64 },
}

/// Download the snapshot from `url` and install it at `dest`.
pub async fn refresh_snapshot(
    http: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<RefreshOutcome, KirokuError> {
    tracing::debug!(url, "downloading cross-reference snapshot");
    let resp = http.get(url).send().await?.error_for_status()?;
    let bytes = resp.bytes().await?;
    install_snapshot(&bytes, dest).await
}

/// Replace `dest` with `bytes` unless the stored copy has the same size.
///
/// The payload must parse before anything is written, and the new file is
/// renamed into place so readers never observe a partial write.
pub async fn install_snapshot(bytes: &[u8], dest: &Path) -> Result<RefreshOutcome, KirokuError> {
    let new_len = bytes.len() as u64;

    match tokio::fs::metadata(dest).await {
        Ok(meta) if meta.len() == new_len => {
            tracing::info!(bytes = new_len, "cross-reference snapshot unchanged");
            return Ok(RefreshOutcome::Unchanged { bytes: new_len });
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let records = CrossReferenceDb::parse(bytes)?.len();

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = temp_path(dest);
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, dest).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    tracing::info!(bytes = new_len, records, path = %dest.display(), "cross-reference snapshot updated");
    Ok(RefreshOutcome::Updated {
        bytes: new_len,
        records,
    })
}

fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = r#"[{ "anidb_id": 1, "anilist_id": 100 }]"#;
    const V2: &str = r#"[{ "anidb_id": 1, "anilist_id": 100 }, { "anidb_id": 2, "anilist_id": 200 }]"#;

    #[tokio::test]
    async fn test_first_install_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data").join("anime-list-full.json");

        let outcome = install_snapshot(V1.as_bytes(), &dest).await.unwrap();
        assert_eq!(
            outcome,
            RefreshOutcome::Updated {
                bytes: V1.len() as u64,
                records: 1
            }
        );
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), V1);
        assert!(!temp_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_same_size_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("anime-list-full.json");
        std::fs::write(&dest, V1).unwrap();

        let outcome = install_snapshot(V1.as_bytes(), &dest).await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Unchanged { bytes: V1.len() as u64 });
    }

    #[tokio::test]
    async fn test_size_change_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("anime-list-full.json");
        std::fs::write(&dest, V1).unwrap();

        let outcome = install_snapshot(V2.as_bytes(), &dest).await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::Updated { records: 2, .. }));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), V2);
    }

    #[tokio::test]
    async fn test_invalid_payload_keeps_old_copy() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("anime-list-full.json");
        std::fs::write(&dest, V1).unwrap();

        let result = install_snapshot(b"<html>rate limited</html>", &dest).await;
        assert!(matches!(result, Err(KirokuError::Snapshot(_))));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), V1);
    }
}
