//! Payment provider integration.
//!
//! Mandatory: the service refuses to start if the handshake fails.

pub mod client;

pub use client::{PaymentsClient, PaymentsError};
