//! Payment provider API client.
//!
//! # Responsibilities
//! - Hold the authenticated HTTP client for the provider
//! - Verify credentials and reachability with a startup handshake

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::config::PaymentsConfig;

/// Errors talking to the payment provider.
#[derive(Debug, Error)]
pub enum PaymentsError {
    #[error("payments provider is not configured")]
    NotConfigured,

    #[error("request to payments provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("payments provider rejected credentials ({0})")]
    Unauthorized(StatusCode),

    #[error("payments provider returned {0}")]
    Status(StatusCode),
}

/// Authenticated client for the payment provider.
#[derive(Clone)]
pub struct PaymentsClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl PaymentsClient {
    pub fn new(config: &PaymentsConfig) -> Result<Self, PaymentsError> {
        if config.api_url.is_empty() || config.api_key.is_empty() {
            return Err(PaymentsError::NotConfigured);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.handshake_timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Fetch the account behind the configured key.
    pub async fn handshake(&self) -> Result<(), PaymentsError> {
        let response = self
            .http
            .get(format!("{}/v1/account", self.api_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!(api_url = %self.api_url, "Payments provider handshake succeeded");
                Ok(())
            }
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(PaymentsError::Unauthorized(status))
            }
            status => Err(PaymentsError::Status(status)),
        }
    }
}

impl std::fmt::Debug for PaymentsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentsClient")
            .field("api_url", &self.api_url)
            .finish()
    }
}
