//! Local artifact storage
//!
//! Each test gets `<root>/<test name>/`. Capture files are first written to a
//! scratch directory and copied in once they are complete.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::common::{paths::sanitize_component, Error, Result};

/// Subdirectory for failure artifacts inside a test directory
const FAILURES_DIR: &str = "failures";

/// Per-test artifact directories
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    scratch_dir: PathBuf,
    current: Mutex<Option<PathBuf>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scratch_dir: scratch_dir.into(),
            current: Mutex::new(None),
        }
    }

    /// Directory where in-flight capture files are written
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Path of a file in the scratch directory
    pub fn scratch_file(&self, name: &str) -> PathBuf {
        self.scratch_dir.join(name)
    }

    /// The active test directory, if one was prepared
    pub fn test_dir(&self) -> Option<PathBuf> {
        self.current.lock().ok().and_then(|current| current.clone())
    }

    /// Directory the artifacts of `test_name` go to
    pub fn test_dir_for(&self, test_name: &str) -> PathBuf {
        self.root.join(sanitize_component(test_name))
    }

    /// Create a fresh directory for `test_name` and make it current
    ///
    /// Artifacts left by a previous run of the same test are removed.
    pub fn prepare(&self, test_name: &str) -> Result<PathBuf> {
        let dir = self.test_dir_for(test_name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(dir.join(FAILURES_DIR))?;
        std::fs::create_dir_all(&self.scratch_dir)?;

        let mut current = self
            .current
            .lock()
            .map_err(|_| Error::Internal("Artifact store lock poisoned".to_string()))?;
        *current = Some(dir.clone());

        tracing::debug!(dir = %dir.display(), "Prepared test artifact directory");
        Ok(dir)
    }

    /// Copy `source_name` from scratch into the test directory as `dest_name`
    pub fn store(&self, source_name: &str, dest_name: &str) -> Result<PathBuf> {
        let dest = self.current_dir()?.join(dest_name);
        self.copy_from_scratch(source_name, &dest)?;
        Ok(dest)
    }

    /// Copy `file_name` from scratch into the test's failure directory
    pub fn store_failure(&self, file_name: &str) -> Result<PathBuf> {
        let dest = self.current_dir()?.join(FAILURES_DIR).join(file_name);
        self.copy_from_scratch(file_name, &dest)?;
        Ok(dest)
    }

    fn current_dir(&self) -> Result<PathBuf> {
        self.test_dir().ok_or_else(|| {
            Error::Internal("No test artifact directory prepared for this session".to_string())
        })
    }

    fn copy_from_scratch(&self, source_name: &str, dest: &Path) -> Result<()> {
        let source = self.scratch_file(source_name);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&source, dest).map_err(|e| Error::FileRead {
            path: source.display().to_string(),
            error: e.to_string(),
        })?;
        tracing::debug!(from = %source.display(), to = %dest.display(), "Stored artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_requires_prepared_directory() {
        let tmp = tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("artifacts"), tmp.path().join("scratch"));
        assert!(matches!(
            store.store("adb_robo.log", "robo.log"),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn test_prepare_and_store() {
        let tmp = tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("artifacts"), tmp.path().join("scratch"));

        let dir = store.prepare("loginTest").unwrap();
        assert_eq!(dir, tmp.path().join("artifacts").join("loginTest"));
        assert_eq!(dir, store.test_dir_for("loginTest"));

        std::fs::write(store.scratch_file("adb_robo.log"), "I/ActivityManager: start").unwrap();
        let stored = store.store("adb_robo.log", "robo.log").unwrap();
        assert_eq!(
            std::fs::read_to_string(stored).unwrap(),
            "I/ActivityManager: start"
        );

        std::fs::write(store.scratch_file("FAILURE.png"), [0x89, b'P', b'N', b'G']).unwrap();
        let failure = store.store_failure("FAILURE.png").unwrap();
        assert!(failure.ends_with("loginTest/failures/FAILURE.png"));
    }

    #[test]
    fn test_dir_for_sanitizes_name() {
        let store = ArtifactStore::new("artifacts", "scratch");
        assert_eq!(
            store.test_dir_for("login test/1"),
            Path::new("artifacts").join("login_test_1")
        );
    }

    #[test]
    fn test_prepare_clears_previous_run() {
        let tmp = tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("artifacts"), tmp.path().join("scratch"));

        let dir = store.prepare("loginTest").unwrap();
        std::fs::write(dir.join("robo.log"), "old").unwrap();

        let dir = store.prepare("loginTest").unwrap();
        assert!(!dir.join("robo.log").exists());
        assert!(dir.join("failures").is_dir());
    }

    #[test]
    fn test_missing_scratch_file_is_reported() {
        let tmp = tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("artifacts"), tmp.path().join("scratch"));
        store.prepare("t").unwrap();

        let err = store.store("missing.log", "robo.log").unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
