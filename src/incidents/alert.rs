//! Best-effort alert webhook.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::incidents::types::{unix_now, Severity};

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("alert webhook answered {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    text: &'a str,
    severity: &'static str,
    timestamp: u64,
}

/// Posts `{text, severity, timestamp}` to a configured URL.
#[derive(Debug, Clone)]
pub struct AlertWebhook {
    client: reqwest::Client,
    url: String,
}

impl AlertWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub async fn send(&self, text: &str, severity: Severity) -> Result<(), AlertError> {
        let payload = AlertPayload {
            text,
            severity: severity.as_str(),
            timestamp: unix_now(),
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(AlertError::Status(response.status()));
        }
        Ok(())
    }

    /// Send from a detached task; failures are only logged.
    pub fn fire(&self, text: String, severity: Severity) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime available, skipping alert webhook");
            return;
        };
        let hook = self.clone();
        handle.spawn(async move {
            if let Err(e) = hook.send(&text, severity).await {
                tracing::warn!(url = %hook.url, error = %e, "Alert webhook failed");
            }
        });
    }
}
