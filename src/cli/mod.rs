//! CLI command handling
//!
//! Wires the concrete adb, HTTP, and journal collaborators into a
//! [`SessionLifecycle`] and formats output.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use serde_json::{json, Value};

use crate::commands::Commands;
use crate::common::config::{Config, SessionSettings, SettingsDefaults};
use crate::common::{logging, Result};
use crate::device::{Adb, AdbBridge, ArtifactStore, LogcatFactory};
use crate::events::{EventJournal, TestEvent};
use crate::remote::{HttpRemoteClient, RemoteClient};
use crate::session::{
    Collaborators, LifecycleOptions, LocalPortAllocator, SessionLifecycle, TeardownReport,
};

/// File the event journal is flushed to, inside the test directory
const EVENTS_FILE: &str = "events.jsonl";

/// How often `run` checks whether the instrumentation is still alive
const WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            test_name,
            keep_app_data,
            app_package,
            test_class,
            test_runner,
            log_file,
        } => {
            match log_file {
                Some(path) => {
                    if let Some(path) = logging::init_with_file(&path) {
                        println!("Logging to {}", path.display().to_string().dimmed());
                    }
                }
                None => logging::init_cli(),
            }

            let config = Config::load()?;
            // Command-line values are defaults; the environment wins
            let settings = SessionSettings::resolve_environment(SettingsDefaults {
                app_package,
                test_class,
                test_runner,
            })?;

            run_session(config, settings, &test_name, !keep_app_data).await
        }

        Commands::Probe { port } => {
            logging::init_cli();
            let config = Config::load()?;
            let remote = HttpRemoteClient::from_config(&config.remote)?;

            if remote.is_listening(port).await {
                println!("{} Harness is listening on port {}", "✓".green(), port);
            } else {
                println!("{} Nothing answers on port {}", "✗".red(), port);
            }
            Ok(())
        }
    }
}

async fn run_session(
    config: Config,
    settings: SessionSettings,
    test_name: &str,
    clear_app_data: bool,
) -> Result<()> {
    let adb = Adb::from_config(&config.adb);
    let artifacts = ArtifactStore::new(&config.artifacts.dir, &config.artifacts.scratch_dir);
    let options = LifecycleOptions::from_config(&config);
    // Flushed at teardown, after setup has recreated the test directory
    let journal = Arc::new(EventJournal::new(
        artifacts.test_dir_for(test_name).join(EVENTS_FILE),
    ));

    let collaborators = Collaborators {
        bridge: Arc::new(AdbBridge::new(adb.clone(), artifacts)),
        remote: Arc::new(HttpRemoteClient::from_config(&config.remote)?),
        logs: Arc::new(LogcatFactory::new(adb)),
        events: journal.clone(),
        ports: Arc::new(LocalPortAllocator),
    };

    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        test_name.white().bold()
    );
    println!("  Package: {}", settings.app_package.dimmed());
    println!("  Runner: {}", settings.test_runner.dimmed());

    let mut session = SessionLifecycle::new(settings, options, collaborators);

    if let Err(e) = session.setup(test_name, false, clear_app_data).await {
        println!("  {} Setup failed: {}", "✗".red(), e);
        if let Err(shot) = session.on_failure().await {
            tracing::warn!(error = %shot, "Could not capture failure screenshot");
        }
        print_teardown(&session.teardown().await);
        return Err(e);
    }

    if let Some(port) = session.port() {
        println!("  {} Harness ready on port {}", "✓".green(), port);
        record(&journal, TestEvent::new("harness_ready", json!({ "port": port })));
    }
    println!("{}", "Waiting for the instrumentation to finish (Ctrl-C to stop)".dimmed());

    let ended = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\n{}", "Interrupted, tearing down...".cyan());
            "interrupted"
        }
        _ = wait_for_exit(&session) => {
            println!("\n{}", "Instrumentation finished, tearing down...".cyan());
            "instrumentation_finished"
        }
    };
    record(&journal, TestEvent::new(ended, Value::Null));

    print_teardown(&session.teardown().await);
    Ok(())
}

fn record(journal: &EventJournal, event: TestEvent) {
    if let Err(e) = journal.record(event) {
        tracing::warn!(error = %e, "Could not record session event");
    }
}

async fn wait_for_exit(session: &SessionLifecycle) {
    while session.is_remote_running() {
        tokio::time::sleep(WATCH_INTERVAL).await;
    }
}

fn print_teardown(report: &TeardownReport) {
    if report.is_clean() {
        println!("  {} Session torn down", "✓".green());
        return;
    }

    println!("  {} Session torn down with errors:", "!".yellow());
    for failure in &report.failures {
        println!("    {}: {}", failure.step.yellow(), failure.error);
    }
}
