//! CLI command definitions
//!
//! Defines the clap commands for the roboremote CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run one test session: set up, wait for the harness, tear down
    Run {
        /// Test name, used for the artifact directory
        test_name: String,

        /// Skip clearing application data before launch
        #[arg(long)]
        keep_app_data: bool,

        /// Application package, used when $ROBO_APP_PACKAGE is unset
        #[arg(long)]
        app_package: Option<String>,

        /// Test class, used when $ROBO_TEST_CLASS is unset
        #[arg(long)]
        test_class: Option<String>,

        /// Instrumentation runner, used when $ROBO_TEST_RUNNER is unset
        #[arg(long)]
        test_runner: Option<String>,

        /// Also write logs to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Check whether a harness answers on a local port
    Probe {
        /// Local (forwarded) port to probe
        port: u16,
    },
}
