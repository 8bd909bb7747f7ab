//! RoboRemote client - host side of on-device remote-controlled tests
//!
//! Drives the lifecycle of a test session against an instrumentation
//! harness on an Android device: tunnel, launch, readiness, shutdown, and
//! collection of logs and failure screenshots.

pub mod cli;
pub mod commands;
pub mod common;
pub mod device;
pub mod events;
pub mod remote;
pub mod session;

// Re-export commonly used types for tests
pub use common::config::{Config, SessionSettings, SettingsDefaults};
pub use common::{Error, Result};
pub use session::{Collaborators, LifecycleOptions, SessionLifecycle, SessionState};
