//! On-disk archive of fetched and processed photos.
//!
//! Side artifact only: callers log archive failures and carry on.

use crate::error::Result;
use crate::media::asset::MediaAsset;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Which stage of the photo path an archived file comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Original,
    Processed,
}

impl ArchiveKind {
    fn prefix(self) -> &'static str {
        match self {
            ArchiveKind::Original => "photo",
            ArchiveKind::Processed => "processed",
        }
    }
}

/// Writes image artifacts as `<prefix>_<millis>_<message_id>.<ext>`.
#[derive(Debug, Clone)]
pub struct MediaArchive {
    dir: PathBuf,
}

impl MediaArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the asset would be written to.
    pub fn path_for(&self, kind: ArchiveKind, message_id: i64, asset: &MediaAsset) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        self.dir.join(format!(
            "{}_{}_{}.{}",
            kind.prefix(),
            millis,
            message_id,
            asset.extension()
        ))
    }

    /// Persist an asset, creating the archive directory on first use.
    pub async fn store(
        &self,
        kind: ArchiveKind,
        message_id: i64,
        asset: &MediaAsset,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(kind, message_id, asset);
        tokio::fs::write(&path, &asset.bytes).await?;
        tracing::debug!(path = %path.display(), bytes = asset.len(), "archived image");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::asset::test_images::png;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_writes_bytes_with_prefix_and_extension() {
        let tmp = TempDir::new().unwrap();
        let archive = MediaArchive::new(tmp.path().join("nested"));
        let asset = MediaAsset::from_bytes(png(4, 4), None);

        let path = archive.store(ArchiveKind::Original, 42, &asset).await.unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("photo_"), "got {name}");
        assert!(name.ends_with("_42.png"), "got {name}");
        assert_eq!(std::fs::read(&path).unwrap(), asset.bytes);
    }

    #[tokio::test]
    async fn test_processed_prefix() {
        let tmp = TempDir::new().unwrap();
        let archive = MediaArchive::new(tmp.path());
        let asset = MediaAsset::from_bytes(png(2, 2), None);

        let path = archive.store(ArchiveKind::Processed, 1, &asset).await.unwrap();
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("processed_")
        );
    }

    #[tokio::test]
    async fn test_store_into_unwritable_location_fails() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let archive = MediaArchive::new(blocker.join("sub"));
        let asset = MediaAsset::from_bytes(png(2, 2), None);

        assert!(archive.store(ArchiveKind::Original, 1, &asset).await.is_err());
    }
}
