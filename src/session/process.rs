//! Background instrumentation run
//!
//! `DeviceBridge::run_instrumentation` only resolves when the harness
//! process exits, so it runs on its own tokio task. The handle can ask that
//! task to stop; stopping drops the in-flight bridge future, which kills the
//! adb child that backs it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::device::DeviceBridge;

/// How long `stop` waits for the task to wind down before aborting it
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Handle to the task running the instrumentation
pub struct RemoteProcessHandle {
    port: u16,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RemoteProcessHandle {
    /// Start the instrumentation on a new task
    pub fn launch(bridge: Arc<dyn DeviceBridge>, port: u16, runner: String) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                result = bridge.run_instrumentation(port, &runner) => match result {
                    Ok(()) => tracing::info!(port, "Instrumentation finished"),
                    Err(e) => tracing::warn!(port, error = %e, "Instrumentation failed"),
                },
                _ = stop_rx => {
                    tracing::debug!(port, "Instrumentation stop requested");
                }
            }
        });

        Self {
            port,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the instrumentation task has ended on its own or been stopped
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Signal the task to stop and wait for it, aborting after a grace period
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The receiver is gone if the run already ended
            let _ = stop_tx.send(());
        }

        let Some(mut task) = self.task.take() else {
            return;
        };

        match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(Ok(())) => tracing::debug!(port = self.port, "Instrumentation task stopped"),
            Ok(Err(e)) => tracing::warn!(port = self.port, error = %e, "Instrumentation task ended abnormally"),
            Err(_) => {
                tracing::warn!(port = self.port, "Instrumentation task did not stop, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for RemoteProcessHandle {
    fn drop(&mut self) {
        // Best-effort since we can't await in drop
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RemoteProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProcessHandle")
            .field("port", &self.port)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Bridge whose instrumentation never exits until dropped
    #[derive(Default)]
    struct HangingBridge {
        started: AtomicBool,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DeviceBridge for HangingBridge {
        async fn prepare_log_directory(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn create_tunnel(&self, _: u16, _: u16) -> Result<()> {
            Ok(())
        }
        async fn clear_app_data(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn run_instrumentation(&self, _: u16, _: &str) -> Result<()> {
            self.started.store(true, Ordering::SeqCst);
            let _flag = DropFlag(Arc::clone(&self.dropped));
            std::future::pending::<()>().await;
            Ok(())
        }
        async fn store_logs(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn capture_screenshot(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn store_failure_screenshot(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn teardown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stop_drops_the_bridge_call() {
        let bridge = Arc::new(HangingBridge::default());
        let handle = RemoteProcessHandle::launch(bridge.clone(), 4000, "runner".into());
        tokio::task::yield_now().await;

        assert!(bridge.started.load(Ordering::SeqCst));
        assert!(!handle.is_finished());

        handle.stop().await;
        assert!(bridge.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drop_aborts_the_task() {
        let bridge = Arc::new(HangingBridge::default());
        let handle = RemoteProcessHandle::launch(bridge.clone(), 4000, "runner".into());
        tokio::task::yield_now().await;

        drop(handle);
        for _ in 0..10 {
            if bridge.dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(bridge.dropped.load(Ordering::SeqCst));
    }
}
