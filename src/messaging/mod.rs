//! Messaging provider integration.
//!
//! Optional: without a bot token the service runs with a disabled client
//! and reports the integration as degraded.

pub mod client;
pub mod webhook;

pub use client::{MessagingClient, MessagingError, Notification};
pub use webhook::Registration;
