//! Remote harness client
//!
//! The session lifecycle only needs two things from the harness running on
//! the device: whether it answers at all, and a way to call a method on it.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::common::Result;

pub use http::HttpRemoteClient;

/// Calls into the harness process through the tunneled port
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Whether a harness listener answers on `port`
    async fn is_listening(&self, port: u16) -> bool;

    /// Invoke `target.method(args)` on the harness and return its result
    async fn invoke(&self, port: u16, target: &str, method: &str, args: Vec<Value>)
        -> Result<Value>;
}
