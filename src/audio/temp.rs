//! Scoped temp files for playback export and codec conversion

use crate::error::{ClipError, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// A temp file path that is removed when dropped.
///
/// Removal waits `grace` first so a player that just exited has released its
/// handle. Removal failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct TempAudioFile {
    path: PathBuf,
    grace: Duration,
}

impl TempAudioFile {
    /// Reserve a unique path in `dir` (created if missing)
    pub fn create(dir: &Path, prefix: &str, extension: &str, grace: Duration) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|source| ClipError::TempFileIo {
            path: dir.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: dir.join(unique_name(prefix, extension)),
            grace,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempAudioFile {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        if !self.grace.is_zero() {
            thread::sleep(self.grace);
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temp file {}", self.path.display()),
            Err(e) => warn!("Failed to remove temp file {}: {}", self.path.display(), e),
        }
    }
}

/// Generate a unique file name like `playback_20250101_120000_1a2b3c4d.wav`
pub fn unique_name(prefix: &str, extension: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}.{}", prefix, timestamp, &uuid[..8], extension)
}

/// Default directory for temp audio
pub fn default_temp_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("clipper")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let temp = TempAudioFile::create(dir.path(), "playback", "wav", Duration::ZERO).unwrap();
            std::fs::write(temp.path(), b"RIFF").unwrap();
            assert!(temp.path().exists());
            temp.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_file_never_written_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempAudioFile::create(&dir.path().join("nested"), "rec", "wav", Duration::ZERO).unwrap();
        assert!(temp.path().starts_with(dir.path()));
        drop(temp);
    }

    #[test]
    fn test_unique_names_differ() {
        let a = unique_name("playback", "wav");
        let b = unique_name("playback", "wav");
        assert_ne!(a, b);
        assert!(a.starts_with("playback_"));
        assert!(a.ends_with(".wav"));
    }
}
