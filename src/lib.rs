//! Booking service backend: process lifecycle, storage guard and HTTP surface.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod messaging;
pub mod net;
pub mod observability;
pub mod payments;
pub mod resilience;
pub mod security;
pub mod storage;

pub use config::AppConfig;
pub use lifecycle::{initialize, ServiceHandle, ShutdownSequencer};
pub use storage::ResourceGuard;
