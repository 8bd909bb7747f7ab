//! Configuration and artifact locations
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/roboremote/` and `~/.local/share/roboremote/`
//! - macOS: `~/Library/Application Support/roboremote/`
//! - Windows: `%APPDATA%\roboremote\`

use std::path::PathBuf;

/// Application name used for config and data directories
const APP_NAME: &str = "roboremote";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Default root for per-test artifacts (logs, failure screenshots)
///
/// Falls back to `./roboremote-artifacts` when no home directory is known.
pub fn default_artifacts_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("artifacts"))
        .unwrap_or_else(|| PathBuf::from("roboremote-artifacts"))
}

/// Default scratch directory for in-flight capture files
pub fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Turn a test name into a single safe path component
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`; an empty result becomes
/// `unnamed`.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "unnamed".to_string(),
        _ => cleaned,
    }
}
