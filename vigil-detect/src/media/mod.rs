//! Media content store
//!
//! Owns the `uploads/` directory holding uploaded videos, alert clips and
//! snapshots. Files are addressed by generated names and served at
//! `/uploads/<name>`.

pub mod clip;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// URL prefix the uploads directory is served under
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

const CLIP_PREFIX: &str = "clip_";
const SNAPSHOT_PREFIX: &str = "snapshot_";

pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a stored file, rejecting anything but a bare file name
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{}", UPLOADS_URL_PREFIX, name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn clip_name(&self, at: DateTime<Utc>) -> String {
        format!("{}{}-{}.mp4", CLIP_PREFIX, at.format("%Y%m%d-%H%M%S"), short_id())
    }

    pub fn snapshot_name(&self, at: DateTime<Utc>) -> String {
        format!("{}{}-{}.jpg", SNAPSHOT_PREFIX, at.format("%Y%m%d-%H%M%S"), short_id())
    }

    /// `<timestamp>_<sanitized original name>` for an uploaded video
    pub fn upload_name(&self, original: &str, at: DateTime<Utc>) -> String {
        format!("{}_{}", at.format("%Y%m%d-%H%M%S"), sanitize_file_name(original))
    }

    /// Write a complete file under a generated name
    pub async fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored {} ({} bytes)", name, bytes.len());
        Ok(path)
    }

    /// Remove a stored file; a missing file is not an error
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to delete {}: {}", path.display(), e);
                Err(e.into())
            }
        }
    }

    /// Most recently modified uploaded video with an allowed extension
    pub fn latest_upload(&self, allowed_extensions: &[String]) -> Option<String> {
        let entries = std::fs::read_dir(&self.root).ok()?;
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !is_upload_name(&name, allowed_extensions) {
                    return None;
                }
                let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, name))
            })
            .max_by_key(|(modified, _)| *modified)
            .map(|(_, name)| name)
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(Error::InvalidInput(format!("invalid media name: {:?}", name)));
    }
    Ok(())
}

/// Lower-case extension including the dot, if any
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
}

pub fn has_allowed_extension(file_name: &str, allowed: &[String]) -> bool {
    match extension_of(file_name) {
        Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

/// True for names that can be an uploaded video: an allowed extension and
/// not a generated clip or snapshot
pub fn is_upload_name(file_name: &str, allowed: &[String]) -> bool {
    !file_name.starts_with(CLIP_PREFIX)
        && !file_name.starts_with(SNAPSHOT_PREFIX)
        && has_allowed_extension(file_name, allowed)
}

/// Keep ASCII alphanumerics, `.`, `-` and `_`; drop any directory part
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_names_and_urls() {
        let store = MediaStore::new(PathBuf::from("/tmp/vigil-media"));
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let clip = store.clip_name(at);
        assert!(clip.starts_with("clip_20240309-140507-"));
        assert!(clip.ends_with(".mp4"));
        assert_ne!(clip, store.clip_name(at));

        assert_eq!(store.upload_name("my shop.MP4", at), "20240309-140507_my_shop.MP4");
        assert_eq!(store.url_for("a.jpg"), "/uploads/a.jpg");
    }

    #[test]
    fn test_traversal_rejected() {
        let store = MediaStore::new(PathBuf::from("/tmp/vigil-media"));
        assert!(store.path_for("../vigil.db").is_err());
        assert!(store.path_for("..").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.path_for("ok.mp4").is_ok());
    }

    #[test]
    fn test_sanitize_and_extensions() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\v\\cam 1.avi"), "cam_1.avi");
        assert_eq!(sanitize_file_name("..."), "upload");

        let allowed = vec![".mp4".to_string(), ".avi".to_string()];
        assert!(has_allowed_extension("a.MP4", &allowed));
        assert!(!has_allowed_extension("a.exe", &allowed));
        assert!(!has_allowed_extension("noext", &allowed));

        assert!(is_upload_name("20240309-140507_door.mp4", &allowed));
        assert!(!is_upload_name("clip_20240309-140507-abcd1234.mp4", &allowed));
        assert!(!is_upload_name("snapshot_20240309-140507-abcd1234.avi", &allowed));
        assert!(!is_upload_name("snapshot_20240309-140507-abcd1234.jpg", &allowed));
    }

    #[tokio::test]
    async fn test_write_delete_and_latest_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());
        let allowed = vec![".mp4".to_string()];

        assert!(store.latest_upload(&allowed).is_none());

        store.write("20240101-000000_a.mp4", b"video").await.unwrap();
        store.write("clip_x.mp4", b"clip").await.unwrap();
        store.write("snapshot_x.jpg", b"jpg").await.unwrap();
        assert_eq!(
            store.latest_upload(&allowed).as_deref(),
            Some("20240101-000000_a.mp4")
        );

        store.delete("20240101-000000_a.mp4").await.unwrap();
        assert!(!store.exists("20240101-000000_a.mp4"));
        store.delete("20240101-000000_a.mp4").await.unwrap();
    }
}
