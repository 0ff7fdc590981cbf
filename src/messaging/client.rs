//! Messaging provider client.
//!
//! # Responsibilities
//! - Handshake with the provider when a bot token is configured
//! - Deliver queued notifications from a background outbox loop
//! - Fail softly when the integration is disabled or stopped
//!
//! # Design Decisions
//! - A disabled client is a real value, so dependents never branch on `Option`
//! - Shutdown only cancels; queued notifications are dropped

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::MessagingConfig;
use crate::lifecycle::Adapter;

/// Errors from the messaging integration.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// No bot token configured; messaging runs degraded.
    #[error("messaging is disabled")]
    Disabled,

    /// The adapter has been shut down.
    #[error("messaging is stopped")]
    Stopped,

    #[error("messaging outbox is full")]
    OutboxFull,

    #[error("request to messaging provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("messaging provider returned {0}")]
    Status(StatusCode),
}

/// A message for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub text: String,
}

#[derive(Clone)]
struct Connection {
    http: reqwest::Client,
    api_url: String,
    bot_token: String,
}

impl Connection {
    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), MessagingError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.bot_token)
            .json(body)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(MessagingError::Status(response.status()))
        }
    }
}

/// Messaging adapter. Either connected or disabled.
pub struct MessagingClient {
    connection: Option<Connection>,
    outbox_tx: Option<mpsc::Sender<Notification>>,
    outbox_rx: Mutex<Option<mpsc::Receiver<Notification>>>,
    stop: CancellationToken,
}

impl MessagingClient {
    /// A client for an absent integration.
    pub fn disabled() -> Self {
        Self {
            connection: None,
            outbox_tx: None,
            outbox_rx: Mutex::new(None),
            stop: CancellationToken::new(),
        }
    }

    /// Build the client and verify the token with a handshake.
    pub async fn connect(config: &MessagingConfig) -> Result<Self, MessagingError> {
        let Some(bot_token) = config.bot_token.clone().filter(|t| !t.is_empty()) else {
            return Err(MessagingError::Disabled);
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.handshake_timeout_secs.max(1)))
            .build()?;
        let connection = Connection {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token,
        };

        let response = connection
            .http
            .get(format!("{}/v1/me", connection.api_url))
            .bearer_auth(&connection.bot_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MessagingError::Status(response.status()));
        }
        tracing::info!(api_url = %connection.api_url, "Messaging provider handshake succeeded");

        let (tx, rx) = mpsc::channel(config.outbox_capacity.max(1));
        Ok(Self {
            connection: Some(connection),
            outbox_tx: Some(tx),
            outbox_rx: Mutex::new(Some(rx)),
            stop: CancellationToken::new(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.connection.is_some()
    }

    /// Start the outbox dispatch loop. No-op when disabled, stopped or started.
    pub fn start(&self) {
        let Some(connection) = self.connection.clone() else {
            return;
        };
        if self.stop.is_cancelled() {
            return;
        }
        let Some(mut outbox) = self
            .outbox_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        else {
            return;
        };

        let stop = self.stop.clone();
        tokio::spawn(async move {
            tracing::info!("Messaging dispatch loop starting");
            loop {
                let notification = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    next = outbox.recv() => match next {
                        Some(n) => n,
                        None => break,
                    },
                };

                let sent = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    res = connection.post("/v1/messages", &notification) => res,
                };
                if let Err(e) = sent {
                    tracing::warn!(recipient = %notification.recipient, error = %e, "Failed to deliver notification");
                }
            }
            tracing::info!(dropped = outbox.len(), "Messaging dispatch loop stopped");
        });
    }

    /// Queue a notification for delivery.
    pub fn notify(&self, notification: Notification) -> Result<(), MessagingError> {
        let Some(tx) = &self.outbox_tx else {
            return Err(MessagingError::Disabled);
        };
        if self.stop.is_cancelled() {
            return Err(MessagingError::Stopped);
        }
        tx.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MessagingError::OutboxFull,
            mpsc::error::TrySendError::Closed(_) => MessagingError::Stopped,
        })
    }

    /// Ask the provider to deliver updates to `url`.
    pub async fn register_webhook(&self, url: &str) -> Result<(), MessagingError> {
        let Some(connection) = &self.connection else {
            return Err(MessagingError::Disabled);
        };
        if self.stop.is_cancelled() {
            return Err(MessagingError::Stopped);
        }
        connection
            .post("/v1/webhook", &serde_json::json!({ "url": url }))
            .await
    }

    /// Token for work that must stop with this adapter.
    pub fn child_token(&self) -> CancellationToken {
        self.stop.child_token()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl Adapter for MessagingClient {
    fn name(&self) -> &'static str {
        "messaging"
    }

    fn shutdown(&self) {
        if self.connection.is_none() {
            return;
        }
        if !self.stop.is_cancelled() {
            tracing::info!("Stopping messaging adapter");
        }
        self.stop.cancel();
    }
}

impl std::fmt::Debug for MessagingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingClient")
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
