//! Device-side collaborators
//!
//! The session lifecycle talks to the device only through [`DeviceBridge`]
//! and [`LogListener`]. The adb-backed implementations live in submodules.

pub mod adb;
pub mod artifacts;
pub mod logcat;

use async_trait::async_trait;

use crate::common::Result;

pub use adb::{Adb, AdbBridge};
pub use artifacts::ArtifactStore;
pub use logcat::{LogCaptureFactory, LogListener, LogcatFactory, LogcatListener};

/// Shell-level device operations used by a test session
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Create (or reset) the local artifact directory for a test
    async fn prepare_log_directory(&self, test_name: &str) -> Result<()>;

    /// Forward `local_port` on this host to `remote_port` on the device
    async fn create_tunnel(&self, local_port: u16, remote_port: u16) -> Result<()>;

    /// Clear the app's persisted data. Also kills a running instance
    async fn clear_app_data(&self, package: &str) -> Result<()>;

    /// Run the instrumentation; resolves only once the remote process exits
    async fn run_instrumentation(&self, port: u16, runner: &str) -> Result<()>;

    /// Store a scratch capture file into the test's artifact directory
    async fn store_logs(&self, source_name: &str, dest_name: &str) -> Result<()>;

    /// Capture a device screenshot into the scratch directory
    async fn capture_screenshot(&self, file_name: &str) -> Result<()>;

    /// Move a captured screenshot into failure-artifact storage
    async fn store_failure_screenshot(&self, file_name: &str) -> Result<()>;

    /// Release tunnels and any other bridge-level session state
    async fn teardown(&self) -> Result<()>;
}
