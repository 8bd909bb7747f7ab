//! Test session state machine
//!
//! Brings a harness session up (port, tunnel, stale-session wait, log
//! capture, launch, readiness), and tears it down in reverse order. Setup and
//! kill failures propagate; teardown failures are collected into a
//! [`TeardownReport`] and the bridge-level release always runs.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::common::config::{ClearAppData, Config, SessionSettings};
use crate::common::{Error, Result};
use crate::device::{DeviceBridge, LogCaptureFactory, LogListener};
use crate::events::EventManager;
use crate::remote::RemoteClient;

use super::poll::RetryPolicy;
use super::port::PortAllocator;
use super::process::RemoteProcessHandle;

/// Scratch file the device log is captured into
pub const LOG_CAPTURE_FILE: &str = "adb_robo.log";
/// Name the captured log is stored under in the test directory
pub const STORED_LOG_FILE: &str = "robo.log";
/// Failure screenshot file name
pub const FAILURE_SCREENSHOT: &str = "FAILURE.png";

/// Remote call that makes the harness process exit
const EXIT_TARGET: &str = "java.lang.System";
const EXIT_METHOD: &str = "exit";

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session resources held
    Idle,
    /// Setup in progress
    SettingUp,
    /// Harness is reachable
    Running,
    /// Setup failed; teardown is still required
    Failed,
    /// Teardown in progress
    TearingDown,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::SettingUp => write!(f, "setting up"),
            Self::Running => write!(f, "running"),
            Self::Failed => write!(f, "failed"),
            Self::TearingDown => write!(f, "tearing down"),
        }
    }
}

/// Poll budgets and policies for a lifecycle
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub stale_session: RetryPolicy,
    pub launch: RetryPolicy,
    pub shutdown: RetryPolicy,
    pub clear_app_data: ClearAppData,
    /// Directory the log capture file is written to
    pub scratch_dir: PathBuf,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl LifecycleOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stale_session: config.polling.stale_session.into(),
            launch: config.polling.launch.into(),
            shutdown: config.polling.shutdown.into(),
            clear_app_data: config.session.clear_app_data,
            scratch_dir: config.artifacts.scratch_dir.clone(),
        }
    }

    /// Defaults with a specific scratch directory
    pub fn with_scratch_dir(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            ..Self::default()
        }
    }
}

/// Everything the lifecycle talks to
#[derive(Clone)]
pub struct Collaborators {
    pub bridge: Arc<dyn DeviceBridge>,
    pub remote: Arc<dyn RemoteClient>,
    pub logs: Arc<dyn LogCaptureFactory>,
    pub events: Arc<dyn EventManager>,
    pub ports: Arc<dyn PortAllocator>,
}

/// A teardown step that failed and was suppressed
#[derive(Debug)]
pub struct TeardownFailure {
    pub step: &'static str,
    pub error: Error,
}

/// Outcome of a teardown. Teardown never fails; this lists what went wrong
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn push(&mut self, step: &'static str, error: Error) {
        tracing::warn!(step, error = %error, "Suppressed teardown error");
        self.failures.push(TeardownFailure { step, error });
    }
}

fn step(name: &'static str) -> impl FnOnce(Error) -> (&'static str, Error) {
    move |error| (name, error)
}

/// Drives one test session at a time
pub struct SessionLifecycle {
    settings: SessionSettings,
    options: LifecycleOptions,
    bridge: Arc<dyn DeviceBridge>,
    remote: Arc<dyn RemoteClient>,
    logs: Arc<dyn LogCaptureFactory>,
    events: Arc<dyn EventManager>,
    ports: Arc<dyn PortAllocator>,
    state: SessionState,
    /// Tunneled port of the current session
    port: Option<u16>,
    /// Running instrumentation, if launched
    process: Option<RemoteProcessHandle>,
    /// Device log capture, created on the first full setup
    log_capture: Option<Box<dyn LogListener>>,
}

impl SessionLifecycle {
    pub fn new(
        settings: SessionSettings,
        options: LifecycleOptions,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            settings,
            options,
            bridge: collaborators.bridge,
            remote: collaborators.remote,
            logs: collaborators.logs,
            events: collaborators.events,
            ports: collaborators.ports,
            state: SessionState::Idle,
            port: None,
            process: None,
            log_capture: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Port of the active session
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn has_remote_process(&self) -> bool {
        self.process.is_some()
    }

    pub fn has_log_capture(&self) -> bool {
        self.log_capture.is_some()
    }

    /// Whether the instrumentation launched by this session is still running
    pub fn is_remote_running(&self) -> bool {
        self.process.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Full setup that clears app data
    pub async fn setup_default(&mut self, test_name: &str) -> Result<()> {
        self.setup(test_name, false, true).await
    }

    /// Bring a session up
    ///
    /// `relaunch` restarts the app under the already-allocated port and keeps
    /// session-scoped resources (log directory, tunnel, log capture, events).
    /// A full setup needs a torn-down lifecycle and fails with
    /// [`Error::SessionAlreadyActive`] otherwise, leaving the session as is.
    #[tracing::instrument(skip(self))]
    pub async fn setup(
        &mut self,
        test_name: &str,
        relaunch: bool,
        clear_app_data: bool,
    ) -> Result<()> {
        // A full setup would leak the held tunnel and probe the wrong port
        if !relaunch && self.port.is_some() {
            return Err(Error::SessionAlreadyActive);
        }

        self.state = SessionState::SettingUp;
        let result = self.setup_steps(test_name, relaunch, clear_app_data).await;
        self.state = match result {
            Ok(()) => SessionState::Running,
            Err(_) => SessionState::Failed,
        };
        result
    }

    async fn setup_steps(
        &mut self,
        test_name: &str,
        relaunch: bool,
        clear_app_data: bool,
    ) -> Result<()> {
        if !relaunch {
            tracing::info!(test = test_name, "Starting test");
            self.bridge.prepare_log_directory(test_name).await?;

            let port = self.ports.allocate()?;
            self.port = Some(port);
            self.bridge.create_tunnel(port, port).await?;
        }

        let port = self.port.ok_or(Error::SessionNotActive)?;

        // Probe once before anything destructive so we know whether to wait
        // for the old listener to go away
        let was_listening = self.remote.is_listening(port).await;
        if was_listening {
            tracing::info!(port, "Test server from a previous session is still listening");
        }

        if clear_app_data {
            if self.options.clear_app_data == ClearAppData::WhenStale && !was_listening {
                tracing::info!("No previous session detected, keeping app data");
            } else {
                self.bridge.clear_app_data(&self.settings.app_package).await?;
            }
        }

        if was_listening {
            let policy = self.options.stale_session;
            let gone = self
                .wait_until_unreachable(port, policy, "Trying to see if server is still available")
                .await;
            if !gone {
                return Err(Error::StaleSession {
                    attempts: policy.attempts(),
                    waited_ms: policy.budget_ms(),
                });
            }
        }

        if !relaunch {
            tracing::info!("Starting log capture");
            if self.log_capture.is_none() {
                let path = self.options.scratch_dir.join(LOG_CAPTURE_FILE);
                self.log_capture = Some(self.logs.create(&path));
            }
            if let Some(capture) = self.log_capture.as_mut() {
                capture.start().await?;
            }

            self.events.clear_events().await?;
        }

        tracing::info!("Starting test runner");
        self.start_app().await
    }

    /// Launch the instrumentation and wait for the harness to answer
    pub async fn start_app(&mut self) -> Result<()> {
        let port = self.port.ok_or(Error::SessionNotActive)?;

        if let Some(previous) = self.process.take() {
            tracing::debug!(port = previous.port(), "Replacing previous instrumentation run");
            previous.stop().await;
        }

        self.process = Some(RemoteProcessHandle::launch(
            Arc::clone(&self.bridge),
            port,
            self.settings.test_runner.clone(),
        ));
        // Let the launch task get going before the first probe
        tokio::task::yield_now().await;

        let policy = self.options.launch;
        let remote = &self.remote;
        let ready = policy
            .poll_until("Trying to ping test server", || async move {
                remote.is_listening(port).await
            })
            .await;

        if !ready {
            return Err(Error::LaunchTimeout {
                attempts: policy.attempts(),
                waited_ms: policy.budget_ms(),
            });
        }

        tracing::info!(port, "Test server is ready");
        self.state = SessionState::Running;
        Ok(())
    }

    /// Ask the harness to exit, stop the instrumentation, and confirm it is gone
    pub async fn kill_app(&mut self) -> Result<()> {
        let port = self.port.ok_or(Error::SessionNotActive)?;

        // The harness dies before it can answer, so an error is the normal outcome
        match self
            .remote
            .invoke(port, EXIT_TARGET, EXIT_METHOD, vec![Value::from(0)])
            .await
        {
            Ok(_) => tracing::debug!("Exit call returned"),
            Err(e) => tracing::debug!(error = %e, "Exit call got no response"),
        }

        if let Some(process) = self.process.take() {
            process.stop().await;
        }

        let policy = self.options.shutdown;
        let gone = self
            .wait_until_unreachable(port, policy, "Trying to see if server is still available")
            .await;
        if !gone {
            return Err(Error::ShutdownTimeout {
                attempts: policy.attempts(),
                waited_ms: policy.budget_ms(),
            });
        }

        Ok(())
    }

    /// Tear the session down in reverse order of setup
    ///
    /// The first failing step skips the remaining ones. Bridge teardown and
    /// release of leftover session resources always run afterwards.
    pub async fn teardown(&mut self) -> TeardownReport {
        self.state = SessionState::TearingDown;
        let mut report = TeardownReport::default();

        if let Err((step, error)) = self.teardown_steps().await {
            report.push(step, error);
        }

        self.release_session_resources(&mut report).await;
        self.state = SessionState::Idle;
        report
    }

    async fn teardown_steps(&mut self) -> std::result::Result<(), (&'static str, Error)> {
        self.events.close().await.map_err(step("close events"))?;
        self.kill_app().await.map_err(step("kill app"))?;

        tracing::info!("Stopping log capture");
        if let Some(mut capture) = self.log_capture.take() {
            capture.stop().await.map_err(step("stop log capture"))?;
        }

        self.bridge
            .store_logs(LOG_CAPTURE_FILE, STORED_LOG_FILE)
            .await
            .map_err(step("store logs"))?;

        self.events.release().await.map_err(step("release events"))?;
        Ok(())
    }

    async fn release_session_resources(&mut self, report: &mut TeardownReport) {
        if let Err(e) = self.bridge.teardown().await {
            report.push("bridge teardown", e);
        }

        if let Some(process) = self.process.take() {
            process.stop().await;
        }

        if let Some(mut capture) = self.log_capture.take() {
            if let Err(e) = capture.stop().await {
                report.push("discard log capture", e);
            }
        }

        self.port = None;
    }

    /// Capture failure diagnostics. Errors are returned, not suppressed
    pub async fn on_failure(&self) -> Result<()> {
        tracing::warn!("Taking failure screenshot");
        self.bridge.capture_screenshot(FAILURE_SCREENSHOT).await?;
        self.bridge
            .store_failure_screenshot(FAILURE_SCREENSHOT)
            .await?;
        Ok(())
    }

    async fn wait_until_unreachable(&self, port: u16, policy: RetryPolicy, what: &str) -> bool {
        let remote = &self.remote;
        policy
            .poll_until(what, || async move { !remote.is_listening(port).await })
            .await
    }
}

impl std::fmt::Debug for SessionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycle")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("port", &self.port)
            .field("process", &self.process)
            .field("log_capture", &self.log_capture.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Idle.to_string(), "idle");
        assert_eq!(SessionState::TearingDown.to_string(), "tearing down");
    }

    #[test]
    fn test_report_collects_failures() {
        let mut report = TeardownReport::default();
        assert!(report.is_clean());

        report.push("close events", Error::SessionNotActive);
        assert!(!report.is_clean());
        assert_eq!(report.failures[0].step, "close events");
    }

    #[test]
    fn test_options_follow_config() {
        let mut config = Config::default();
        config.polling.launch.attempts = 3;
        config.session.clear_app_data = ClearAppData::WhenStale;

        let options = LifecycleOptions::from_config(&config);
        assert_eq!(options.launch.attempts(), 3);
        assert_eq!(options.clear_app_data, ClearAppData::WhenStale);
        assert_eq!(options.stale_session.budget_ms(), 18_000);
    }
}
