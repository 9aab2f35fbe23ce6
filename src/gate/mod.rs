//! HTTP gateway
//!
//! Exposes the relay to browsers: `POST /api/generate` answers with the
//! completion as a live plain-text body.

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use handlers::GatewayState;
