//! Best-effort webhook registration.
//!
//! The first attempt runs inline during startup. If it fails, a detached
//! retry loop keeps trying with exponential backoff until it succeeds, runs
//! out of attempts, or the messaging adapter is shut down.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::client::{MessagingClient, MessagingError};
use crate::config::MessagingConfig;
use crate::resilience::RetryPolicy;

/// Retry policy for webhook registration from config.
pub fn retry_policy(config: &MessagingConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.webhook_attempts,
        Duration::from_millis(config.webhook_base_delay_ms),
        Duration::from_millis(config.webhook_max_delay_ms),
    )
}

/// Outcome of the inline registration attempt.
#[derive(Debug)]
pub enum Registration {
    Registered,
    /// The first attempt failed; retries continue in the background.
    Retrying(JoinHandle<bool>),
    /// The first attempt failed and the policy allows no more.
    Failed(MessagingError),
}

/// Try once inline, then fall back to background retries.
pub async fn register(client: &Arc<MessagingClient>, url: &str, policy: RetryPolicy) -> Registration {
    match client.register_webhook(url).await {
        Ok(()) => {
            tracing::info!(url, "Messaging webhook registered");
            Registration::Registered
        }
        Err(e) if policy.allows_retry_after(1) => {
            tracing::warn!(url, error = %e, "Webhook registration failed, retrying in background");
            Registration::Retrying(spawn_retry(Arc::clone(client), url.to_string(), policy))
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "Webhook registration failed");
            Registration::Failed(e)
        }
    }
}

/// Keep retrying after a failed first attempt. Resolves to true on success.
pub fn spawn_retry(client: Arc<MessagingClient>, url: String, policy: RetryPolicy) -> JoinHandle<bool> {
    let stop = client.child_token();
    tokio::spawn(async move {
        let mut attempt = 1;
        while policy.allows_retry_after(attempt) {
            let delay = policy.delay_after(attempt);
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    tracing::debug!(attempt, "Webhook registration retry cancelled");
                    return false;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    tracing::debug!(attempt, "Webhook registration retry cancelled");
                    return false;
                }
                res = client.register_webhook(&url) => res,
            };

            match result {
                Ok(()) => {
                    tracing::info!(url = %url, attempt, "Messaging webhook registered");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(url = %url, attempt, error = %e, "Webhook registration attempt failed");
                }
            }
        }

        tracing::error!(url = %url, attempts = attempt, "Giving up on webhook registration");
        false
    })
}
