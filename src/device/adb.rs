//! adb-backed device bridge
//!
//! Every device operation is a plain `adb` invocation. Long-running children
//! (the instrumentation run) are spawned with `kill_on_drop`, so dropping the
//! future that owns them stops the adb process.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::Command;

use crate::common::config::AdbConfig;
use crate::common::{Error, Result};

use super::artifacts::ArtifactStore;
use super::DeviceBridge;

/// Locate the adb binary
///
/// Checks `ADB_PATH`, then `platform-tools` under `ANDROID_SDK_ROOT` or
/// `ANDROID_HOME`, then `PATH`. Falls back to plain `adb`.
pub fn resolve_program() -> PathBuf {
    if let Ok(path) = std::env::var("ADB_PATH") {
        return PathBuf::from(path);
    }

    if let Ok(sdk_root) = std::env::var("ANDROID_SDK_ROOT").or_else(|_| std::env::var("ANDROID_HOME"))
    {
        let tools = PathBuf::from(sdk_root).join("platform-tools");
        for name in ["adb", "adb.exe"] {
            let candidate = tools.join(name);
            if candidate.is_file() {
                return candidate;
            }
        }
    }

    which::which("adb").unwrap_or_else(|_| PathBuf::from("adb"))
}

/// An adb binary bound to an optional device serial
#[derive(Debug, Clone)]
pub struct Adb {
    program: PathBuf,
    serial: Option<String>,
}

impl Adb {
    pub fn new(program: impl Into<PathBuf>, serial: Option<String>) -> Self {
        Self {
            program: program.into(),
            serial,
        }
    }

    pub fn from_config(config: &AdbConfig) -> Self {
        let program = config.path.clone().unwrap_or_else(resolve_program);
        Self::new(program, config.serial.clone())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build an adb command with the device selector already applied
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Run adb to completion and return its output
    ///
    /// A non-zero exit becomes [`Error::AdbCommand`].
    pub async fn output(&self, args: &[String]) -> Result<Output> {
        let label = args.first().cloned().unwrap_or_default();
        tracing::debug!(args = ?args, "Running adb");

        let output = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::AdbNotFound,
                _ => Error::Io(e),
            })?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(Error::adb_command(
                &label,
                output.status.code().unwrap_or(-1),
                &String::from_utf8_lossy(&output.stderr),
            ))
        }
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn forward_args(local_port: u16, remote_port: u16) -> Vec<String> {
    vec![
        "forward".to_string(),
        format!("tcp:{}", local_port),
        format!("tcp:{}", remote_port),
    ]
}

fn remove_forward_args(local_port: u16) -> Vec<String> {
    vec![
        "forward".to_string(),
        "--remove".to_string(),
        format!("tcp:{}", local_port),
    ]
}

fn clear_data_args(package: &str) -> Vec<String> {
    strings(&["shell", "pm", "clear", package])
}

fn instrument_args(port: u16, runner: &str) -> Vec<String> {
    vec![
        "shell".to_string(),
        "am".to_string(),
        "instrument".to_string(),
        "-e".to_string(),
        "port".to_string(),
        port.to_string(),
        "-w".to_string(),
        runner.to_string(),
    ]
}

/// [`DeviceBridge`] that shells out to adb
#[derive(Debug)]
pub struct AdbBridge {
    adb: Adb,
    artifacts: ArtifactStore,
    tunnels: Mutex<Vec<u16>>,
}

impl AdbBridge {
    pub fn new(adb: Adb, artifacts: ArtifactStore) -> Self {
        Self {
            adb,
            artifacts,
            tunnels: Mutex::new(Vec::new()),
        }
    }

    fn lock_tunnels(&self) -> Result<std::sync::MutexGuard<'_, Vec<u16>>> {
        self.tunnels
            .lock()
            .map_err(|_| Error::Internal("Tunnel registry lock poisoned".to_string()))
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    async fn prepare_log_directory(&self, test_name: &str) -> Result<()> {
        self.artifacts.prepare(test_name)?;
        Ok(())
    }

    async fn create_tunnel(&self, local_port: u16, remote_port: u16) -> Result<()> {
        tracing::info!(local_port, remote_port, "Creating adb tunnel");
        self.adb.output(&forward_args(local_port, remote_port)).await?;

        let mut tunnels = self.lock_tunnels()?;
        if !tunnels.contains(&local_port) {
            tunnels.push(local_port);
        }
        Ok(())
    }

    async fn clear_app_data(&self, package: &str) -> Result<()> {
        tracing::info!(package, "Clearing app data");
        let output = self.adb.output(&clear_data_args(package)).await?;

        // Older adb versions exit 0 even when pm reports a failure
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim() != "Success" {
            return Err(Error::adb_command("shell pm clear", 0, &stdout));
        }
        Ok(())
    }

    async fn run_instrumentation(&self, port: u16, runner: &str) -> Result<()> {
        tracing::info!(port, runner, "Starting instrumentation");
        let status = self
            .adb
            .command(instrument_args(port, runner))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::AdbNotFound,
                _ => Error::Io(e),
            })?;

        tracing::info!(?status, "Instrumentation exited");
        if status.success() {
            Ok(())
        } else {
            Err(Error::adb_command(
                "shell am instrument",
                status.code().unwrap_or(-1),
                "",
            ))
        }
    }

    async fn store_logs(&self, source_name: &str, dest_name: &str) -> Result<()> {
        self.artifacts.store(source_name, dest_name)?;
        Ok(())
    }

    async fn capture_screenshot(&self, file_name: &str) -> Result<()> {
        let output = self
            .adb
            .output(&strings(&["exec-out", "screencap", "-p"]))
            .await?;

        if output.stdout.is_empty() {
            return Err(Error::adb_command("exec-out screencap", 0, "empty screenshot"));
        }

        let path = self.artifacts.scratch_file(file_name);
        tokio::fs::create_dir_all(self.artifacts.scratch_dir()).await?;
        tokio::fs::write(&path, &output.stdout).await?;
        tracing::info!(path = %path.display(), "Captured screenshot");
        Ok(())
    }

    async fn store_failure_screenshot(&self, file_name: &str) -> Result<()> {
        let path = self.artifacts.store_failure(file_name)?;
        tracing::info!(path = %path.display(), "Stored failure screenshot");
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        let tunnels: Vec<u16> = std::mem::take(&mut *self.lock_tunnels()?);
        let mut first_error = None;

        for port in tunnels {
            tracing::debug!(port, "Removing adb tunnel");
            if let Err(e) = self.adb.output(&remove_forward_args(port)).await {
                tracing::warn!(port, error = %e, "Failed to remove adb tunnel");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
