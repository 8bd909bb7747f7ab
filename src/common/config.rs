//! Configuration handling
//!
//! Two layers live here: the optional `config.toml` that tunes adb, polling
//! and artifact locations, and the [`SessionSettings`] triple that identifies
//! the app under test. The triple is resolved once and then handed to the
//! session lifecycle by value.

use serde::Deserialize;
use std::path::PathBuf;

use super::paths::{self, config_path};
use super::{Error, Result};

/// Environment variable naming the application package
pub const ENV_APP_PACKAGE: &str = "ROBO_APP_PACKAGE";
/// Environment variable naming the test class
pub const ENV_TEST_CLASS: &str = "ROBO_TEST_CLASS";
/// Environment variable naming the instrumentation runner
pub const ENV_TEST_RUNNER: &str = "ROBO_TEST_RUNNER";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// adb settings
    #[serde(default)]
    pub adb: AdbConfig,

    /// Poll budgets for the session lifecycle
    #[serde(default)]
    pub polling: PollingConfig,

    /// Remote harness client settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Session behavior
    #[serde(default)]
    pub session: SessionConfig,

    /// Artifact locations
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// adb binary and target device
#[derive(Debug, Deserialize, Default, Clone)]
pub struct AdbConfig {
    /// Explicit adb path; resolved from the environment when absent
    pub path: Option<PathBuf>,

    /// Device serial passed as `-s`; adb picks the only device when absent
    pub serial: Option<String>,
}

/// One fixed-count, fixed-interval poll budget
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub attempts: u32,
    pub interval_ms: u64,
}

/// Poll budgets for each lifecycle wait
#[derive(Debug, Deserialize)]
pub struct PollingConfig {
    /// Waiting for a previous session's listener to go away during setup
    #[serde(default = "default_stale_session")]
    pub stale_session: PollConfig,

    /// Waiting for a freshly launched harness to answer
    #[serde(default = "default_launch")]
    pub launch: PollConfig,

    /// Confirming the harness is gone after a kill
    #[serde(default = "default_shutdown")]
    pub shutdown: PollConfig,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            stale_session: default_stale_session(),
            launch: default_launch(),
            shutdown: default_shutdown(),
        }
    }
}

fn default_stale_session() -> PollConfig {
    PollConfig {
        attempts: 10,
        interval_ms: 2000,
    }
}
fn default_launch() -> PollConfig {
    PollConfig {
        attempts: 10,
        interval_ms: 5000,
    }
}
fn default_shutdown() -> PollConfig {
    PollConfig {
        attempts: 10,
        interval_ms: 2000,
    }
}

/// Remote harness client settings
#[derive(Debug, Deserialize)]
pub struct RemoteConfig {
    /// Timeout for a single liveness probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Timeout for a remote method invocation
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout(),
            call_timeout_ms: default_call_timeout(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    1000
}
fn default_call_timeout() -> u64 {
    10_000
}

/// When a requested app-data clear is actually performed
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClearAppData {
    /// Clear whenever the caller asks for it
    #[default]
    Always,
    /// Clear only if a previous session's listener was detected
    WhenStale,
}

/// Session behavior
#[derive(Debug, Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub clear_app_data: ClearAppData,
}

/// Artifact locations
#[derive(Debug, Deserialize)]
pub struct ArtifactsConfig {
    /// Root for per-test directories
    #[serde(default = "paths::default_artifacts_dir")]
    pub dir: PathBuf,

    /// Where in-flight capture files are written before being stored
    #[serde(default = "paths::default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: paths::default_artifacts_dir(),
            scratch_dir: paths::default_scratch_dir(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| Error::FileRead {
                    path: path.display().to_string(),
                    error: e.to_string(),
                })?;
                return Self::parse(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }
}

/// The app-under-test triple every session needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub app_package: String,
    pub test_class: String,
    pub test_runner: String,
}

/// Programmatic values used when the environment does not provide one
#[derive(Debug, Clone, Default)]
pub struct SettingsDefaults {
    pub app_package: Option<String>,
    pub test_class: Option<String>,
    pub test_runner: Option<String>,
}

impl SessionSettings {
    /// Set the triple programmatically
    pub fn new(
        app_package: impl Into<String>,
        test_class: impl Into<String>,
        test_runner: impl Into<String>,
    ) -> Self {
        Self {
            app_package: app_package.into(),
            test_class: test_class.into(),
            test_runner: test_runner.into(),
        }
    }

    /// Resolve the triple from `ROBO_APP_PACKAGE`, `ROBO_TEST_CLASS` and
    /// `ROBO_TEST_RUNNER`, falling back to `defaults`
    pub fn resolve_environment(defaults: SettingsDefaults) -> Result<Self> {
        Self::resolve_with(defaults, |key| std::env::var(key).ok())
    }

    /// Resolve the triple through `lookup`
    ///
    /// Keys are checked in order and the first missing one fails the whole
    /// resolution. A variable always wins over its default; empty values
    /// count as unset.
    pub fn resolve_with<F>(defaults: SettingsDefaults, mut lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut resolve = |key: &'static str, fallback: Option<String>| {
            let present = |value: &String| !value.trim().is_empty();
            lookup(key)
                .filter(present)
                .or_else(|| fallback.filter(present))
                .ok_or(Error::MissingConfiguration { key })
        };

        let app_package = resolve(ENV_APP_PACKAGE, defaults.app_package)?;
        let test_class = resolve(ENV_TEST_CLASS, defaults.test_class)?;
        let test_runner = resolve(ENV_TEST_RUNNER, defaults.test_runner)?;

        Ok(Self {
            app_package,
            test_class,
            test_runner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_match_lifecycle_budgets() {
        let config = Config::default();
        assert_eq!(config.polling.stale_session.attempts, 10);
        assert_eq!(config.polling.stale_session.interval_ms, 2000);
        assert_eq!(config.polling.launch.interval_ms, 5000);
        assert_eq!(config.polling.shutdown.interval_ms, 2000);
        assert_eq!(config.session.clear_app_data, ClearAppData::Always);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::parse(
            r#"
            [adb]
            serial = "emulator-5554"

            [polling.launch]
            attempts = 3
            interval_ms = 100

            [session]
            clear_app_data = "when_stale"
            "#,
        )
        .unwrap();

        assert_eq!(config.adb.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(
            config.polling.launch,
            PollConfig {
                attempts: 3,
                interval_ms: 100
            }
        );
        assert_eq!(config.polling.shutdown.attempts, 10);
        assert_eq!(config.session.clear_app_data, ClearAppData::WhenStale);
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        let err = Config::parse("[polling.launch]\nattempts = \"ten\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_resolve_from_environment_only() {
        let vars = env(&[
            (ENV_APP_PACKAGE, "com.example.app"),
            (ENV_TEST_CLASS, "com.example.LoginTest"),
            (ENV_TEST_RUNNER, "com.example.test/.Runner"),
        ]);
        let settings =
            SessionSettings::resolve_with(SettingsDefaults::default(), |k| vars.get(k).cloned())
                .unwrap();
        assert_eq!(
            settings,
            SessionSettings::new(
                "com.example.app",
                "com.example.LoginTest",
                "com.example.test/.Runner"
            )
        );
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let vars = env(&[(ENV_APP_PACKAGE, "com.from.env")]);
        let defaults = SettingsDefaults {
            app_package: Some("com.from.code".into()),
            test_class: Some("Cls".into()),
            test_runner: Some("Runner".into()),
        };
        let settings = SessionSettings::resolve_with(defaults, |k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.app_package, "com.from.env");
        assert_eq!(settings.test_class, "Cls");
    }

    #[test]
    fn test_first_missing_key_is_reported() {
        let vars = env(&[(ENV_APP_PACKAGE, "com.example.app")]);
        let err = SessionSettings::resolve_with(SettingsDefaults::default(), |k| {
            vars.get(k).cloned()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingConfiguration {
                key: ENV_TEST_CLASS
            }
        ));
    }

    #[test]
    fn test_resolution_stops_at_first_missing_key() {
        let mut asked = Vec::new();
        let err = SessionSettings::resolve_with(SettingsDefaults::default(), |k| {
            asked.push(k.to_string());
            None
        })
        .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingConfiguration {
                key: ENV_APP_PACKAGE
            }
        ));
        assert_eq!(asked, vec![ENV_APP_PACKAGE.to_string()]);
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let vars = env(&[
            (ENV_APP_PACKAGE, "com.example.app"),
            (ENV_TEST_CLASS, "Cls"),
            (ENV_TEST_RUNNER, "  "),
        ]);
        let err = SessionSettings::resolve_with(SettingsDefaults::default(), |k| {
            vars.get(k).cloned()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingConfiguration {
                key: ENV_TEST_RUNNER
            }
        ));
    }
}
