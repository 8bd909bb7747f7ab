//! Test session lifecycle
//!
//! Setup and teardown of a single on-device test session, plus the pieces it
//! is built from: port allocation, retry polling, and the background
//! instrumentation run.

pub mod lifecycle;
pub mod poll;
pub mod port;
pub mod process;

pub use lifecycle::{
    Collaborators, LifecycleOptions, SessionLifecycle, SessionState, TeardownFailure,
    TeardownReport,
};
pub use poll::RetryPolicy;
pub use port::{LocalPortAllocator, PortAllocator};
pub use process::RemoteProcessHandle;
