//! Device log capture
//!
//! A [`LogListener`] tails device output into a local file for the duration
//! of a session. [`LogcatListener`] does it with `adb logcat`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Child;

use crate::common::{Error, Result};

use super::adb::Adb;

/// Captures device diagnostic output to a local file
#[async_trait]
pub trait LogListener: Send + Sync {
    /// Start capturing. Starting an already running capture is a no-op
    async fn start(&mut self) -> Result<()>;

    /// Stop capturing and flush the file
    async fn stop(&mut self) -> Result<()>;
}

/// Creates log listeners writing to a given file
pub trait LogCaptureFactory: Send + Sync {
    fn create(&self, path: &Path) -> Box<dyn LogListener>;
}

/// `adb logcat -v time` redirected into a file
pub struct LogcatListener {
    adb: Adb,
    path: PathBuf,
    child: Option<Child>,
}

impl LogcatListener {
    pub fn new(adb: Adb, path: impl Into<PathBuf>) -> Self {
        Self {
            adb,
            path: path.into(),
            child: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

#[async_trait]
impl LogListener for LogcatListener {
    async fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = std::fs::File::create(&self.path).map_err(|e| Error::FileRead {
            path: self.path.display().to_string(),
            error: e.to_string(),
        })?;

        let child = self
            .adb
            .command(["logcat", "-v", "time"])
            .stdout(Stdio::from(file))
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::AdbNotFound,
                _ => Error::Io(e),
            })?;

        tracing::info!(path = %self.path.display(), pid = ?child.id(), "Started logcat");
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        // logcat only exits when killed; an already exited child is fine
        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "logcat already exited");
        }
        tracing::info!(path = %self.path.display(), "Stopped logcat");
        Ok(())
    }
}

/// Builds [`LogcatListener`]s for one adb target
#[derive(Debug, Clone)]
pub struct LogcatFactory {
    adb: Adb,
}

impl LogcatFactory {
    pub fn new(adb: Adb) -> Self {
        Self { adb }
    }
}

impl LogCaptureFactory for LogcatFactory {
    fn create(&self, path: &Path) -> Box<dyn LogListener> {
        Box::new(LogcatListener::new(self.adb.clone(), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let tmp = tempdir().unwrap();
        let mut listener = LogcatListener::new(Adb::new("adb", None), tmp.path().join("l.log"));
        listener.stop().await.unwrap();
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn test_start_reports_missing_adb() {
        let tmp = tempdir().unwrap();
        let mut listener = LogcatListener::new(
            Adb::new(tmp.path().join("no-such-adb"), None),
            tmp.path().join("capture").join("adb_robo.log"),
        );
        let err = listener.start().await.unwrap_err();
        assert!(matches!(err, Error::AdbNotFound));
        assert!(!listener.is_running());
        // The capture file is created before adb is spawned
        assert!(listener.path().exists());
    }
}
