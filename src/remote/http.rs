//! HTTP transport for the harness client
//!
//! Liveness is "any HTTP response at all": adb accepts the local side of a
//! forward even when nothing listens on the device, so a bare TCP connect
//! says nothing about the harness.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::config::RemoteConfig;
use crate::common::{Error, Result};

use super::RemoteClient;

/// Request body for a single remote call
#[derive(Debug, Serialize)]
struct CallRequest<'a> {
    target: &'a str,
    method: &'a str,
    arguments: Vec<Value>,
}

/// Response body for a single remote call
#[derive(Debug, Deserialize)]
struct CallResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    message: Option<String>,
}

/// [`RemoteClient`] speaking JSON over HTTP to `127.0.0.1:<port>`
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    client: reqwest::Client,
    probe_timeout: Duration,
    call_timeout: Duration,
}

impl HttpRemoteClient {
    pub fn new(probe_timeout: Duration, call_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            probe_timeout,
            call_timeout,
        })
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        Self::new(
            Duration::from_millis(config.probe_timeout_ms),
            Duration::from_millis(config.call_timeout_ms),
        )
    }

    fn base_url(port: u16) -> String {
        format!("http://127.0.0.1:{}", port)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn is_listening(&self, port: u16) -> bool {
        match self
            .client
            .get(format!("{}/", Self::base_url(port)))
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => {
                tracing::trace!(port, status = %response.status(), "Harness answered");
                true
            }
            Err(e) => {
                tracing::trace!(port, error = %e, "Harness did not answer");
                false
            }
        }
    }

    async fn invoke(
        &self,
        port: u16,
        target: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let request = CallRequest {
            target,
            method,
            arguments: args,
        };

        let response = self
            .client
            .post(format!("{}/call", Self::base_url(port)))
            .timeout(self.call_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::remote_call(target, method, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::remote_call(
                target,
                method,
                format!("unexpected status {}", response.status()),
            ));
        }

        let body: CallResponse = response
            .json()
            .await
            .map_err(|e| Error::remote_call(target, method, format!("invalid response: {}", e)))?;

        if body.success {
            Ok(body.result)
        } else {
            Err(Error::remote_call(
                target,
                method,
                body.message.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}
