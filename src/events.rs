//! Structured test events
//!
//! The session clears recorded events at the start of a fresh run, closes the
//! recorder at teardown, and finally releases it.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::common::{Error, Result};

/// Records structured test events for a session
#[async_trait]
pub trait EventManager: Send + Sync {
    /// Drop every event recorded so far
    async fn clear_events(&self) -> Result<()>;

    /// Flush recorded events and stop accepting new ones for this session
    async fn close(&self) -> Result<()>;

    /// Release everything the manager holds
    async fn release(&self) -> Result<()>;
}

/// A single recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEvent {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl TestEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            timestamp_ms,
            name: name.into(),
            data,
        }
    }
}

#[derive(Debug, Default)]
struct JournalState {
    events: Vec<TestEvent>,
    open: bool,
    released: bool,
}

/// In-memory event recorder flushed to a JSON-lines file on close
#[derive(Debug)]
pub struct EventJournal {
    path: PathBuf,
    state: Mutex<JournalState>,
}

impl EventJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(JournalState {
                open: true,
                ..JournalState::default()
            }),
        }
    }

    /// File the journal is flushed to
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, JournalState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("Event journal lock poisoned".to_string()))
    }

    /// Record an event. Fails once the journal has been released
    pub fn record(&self, event: TestEvent) -> Result<()> {
        let mut state = self.lock()?;
        if state.released {
            return Err(Error::Internal("Event journal already released".to_string()));
        }
        state.open = true;
        state.events.push(event);
        Ok(())
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<TestEvent> {
        self.lock().map(|s| s.events.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventManager for EventJournal {
    /// Also starts a new session on a released journal
    async fn clear_events(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.events.clear();
        state.open = true;
        state.released = false;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let lines = {
            let mut state = self.lock()?;
            if !state.open {
                return Ok(());
            }
            state.open = false;
            state
                .events
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&self.path).await?;
        for line in &lines {
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;

        tracing::debug!(path = %self.path.display(), count = lines.len(), "Flushed test events");
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.events = Vec::new();
        state.open = false;
        state.released = true;
        Ok(())
    }
}
