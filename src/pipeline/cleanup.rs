use std::fs::File;
use std::io;
use std::path::PathBuf;

use crate::PipelineError;

const TEMP_PREFIX: &str = "yt2mp3-";

/// A freshly allocated temporary payload file
#[derive(Debug)]
pub struct TempPayload {
    pub path: PathBuf,
    pub file: File,
}

/// Batch-scoped registry of temporary payload files.
///
/// Every file is recorded at allocation time and deleted exactly once by
/// [`TempStore::release_all`], whatever happened to its item afterwards.
#[derive(Debug)]
pub struct TempStore {
    dir: PathBuf,
    registered: Vec<(String, PathBuf)>,
}

impl TempStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            registered: Vec::new(),
        }
    }

    /// Number of files currently registered for release
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Create and register a temporary file for `link`
    pub fn allocate(&mut self, link: &str, extension: &str) -> io::Result<TempPayload> {
        let named = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&format!(".{}", extension))
            .tempfile_in(&self.dir)?;

        // Deletion is ours, not tempfile's
        let (file, temp_path) = named.into_parts();
        let path = temp_path.keep().map_err(|e| e.error)?;

        tracing::debug!("Allocated {} for {}", path.display(), link);
        self.registered.push((link.to_string(), path.clone()));

        Ok(TempPayload { path, file })
    }

    /// Delete every registered file once, returning one error per failed deletion
    pub async fn release_all(&mut self) -> Vec<PipelineError> {
        let mut errors = Vec::new();

        for (link, path) in self.registered.drain(..) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", path.display(), e);
                    errors.push(PipelineError::Cleanup {
                        link,
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }

        errors
    }
}

impl Drop for TempStore {
    fn drop(&mut self) {
        // Only reached with files left when the batch was abandoned mid-run
        for (_, path) in self.registered.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Failed to remove {} on drop: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_allocate_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TempStore::new(dir.path());

        let mut first = store.allocate("https://youtu.be/a", "mp4").unwrap();
        first.file.write_all(b"partial").unwrap();
        let second = store.allocate("https://youtu.be/b", "webm").unwrap();
        drop(first.file);
        drop(second.file);

        assert_eq!(store.len(), 2);
        assert!(first.path.exists());
        assert!(second.path.to_string_lossy().ends_with(".webm"));
        assert!(first
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(TEMP_PREFIX));

        let errors = store.release_all().await;
        assert!(errors.is_empty());
        assert!(store.is_empty());
        assert!(!first.path.exists());
        assert!(!second.path.exists());
    }

    #[tokio::test]
    async fn test_release_of_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TempStore::new(dir.path());

        let payload = store.allocate("https://youtu.be/a", "mp4").unwrap();
        drop(payload.file);
        std::fs::remove_file(&payload.path).unwrap();

        let errors = store.release_all().await;
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            PipelineError::Cleanup { link, path, .. } if link == "https://youtu.be/a" && path == &payload.path
        ));

        // Already drained: a second release does nothing
        assert!(store.release_all().await.is_empty());
    }

    #[test]
    fn test_drop_removes_unreleased_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut store = TempStore::new(dir.path());
            store.allocate("https://youtu.be/a", "mp4").unwrap().path
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_allocate_in_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TempStore::new(dir.path().join("missing"));
        assert!(store.allocate("https://youtu.be/a", "mp4").is_err());
        assert!(store.is_empty());
    }
}
