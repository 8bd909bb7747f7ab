//! Error types for the session driver
//!
//! Error messages name the condition that stopped the run so a failed test
//! attempt can be diagnosed from the message alone.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the session driver
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("{key} is not set")]
    MissingConfiguration { key: &'static str },

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === Session Errors ===
    #[error("No test session active. Run a full setup before relaunching or killing the app")]
    SessionNotActive,

    #[error("Test session already active. Tear it down before starting another one")]
    SessionAlreadyActive,

    #[error(
        "Previous test server is still available after {attempts} checks over {waited_ms}ms; \
         another session may still be running"
    )]
    StaleSession { attempts: u32, waited_ms: u64 },

    #[error("Could not contact test server after {attempts} attempts over {waited_ms}ms")]
    LaunchTimeout { attempts: u32, waited_ms: u64 },

    #[error(
        "Server is still available, but should not be ({attempts} checks over {waited_ms}ms after kill)"
    )]
    ShutdownTimeout { attempts: u32, waited_ms: u64 },

    #[error("Remote call {target}.{method} failed: {message}")]
    RemoteCall {
        target: String,
        method: String,
        message: String,
    },

    #[error("Failed to allocate a local port: {0}")]
    PortAllocation(#[source] io::Error),

    // === Device Bridge Errors ===
    #[error("adb not found. Set [adb] path in the config file, ADB_PATH, or ANDROID_SDK_ROOT")]
    AdbNotFound,

    #[error("adb {command} failed with exit {status}: {stderr}")]
    AdbCommand {
        command: String,
        status: i32,
        stderr: String,
    },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a remote call error for `target.method`
    pub fn remote_call(target: &str, method: &str, message: impl Into<String>) -> Self {
        Self::RemoteCall {
            target: target.to_string(),
            method: method.to_string(),
            message: message.into(),
        }
    }

    /// Create an adb command failure from its exit status and stderr
    pub fn adb_command(command: &str, status: i32, stderr: &str) -> Self {
        Self::AdbCommand {
            command: command.to_string(),
            status,
            stderr: stderr.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configuration_names_the_key() {
        let err = Error::MissingConfiguration {
            key: "ROBO_TEST_RUNNER",
        };
        assert_eq!(err.to_string(), "ROBO_TEST_RUNNER is not set");
    }

    #[test]
    fn test_already_active_message() {
        assert!(Error::SessionAlreadyActive
            .to_string()
            .starts_with("Test session already active"));
    }

    #[test]
    fn test_adb_command_trims_stderr() {
        let err = Error::adb_command("forward", 1, "  error: no devices\n");
        assert_eq!(
            err.to_string(),
            "adb forward failed with exit 1: error: no devices"
        );
    }
}
