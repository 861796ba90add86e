//! HTTP API.
//!
//! Exposes request negotiation and the month calendar as JSON endpoints
//! under `/api/`, plus a WebSocket push channel for notifications.
//!
//! The router is composable: `api_router()` returns a `Router` that can
//! be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;
pub mod websocket;

pub use router::api_router;
pub use server::{start_api_server, ApiServer};
pub use types::ApiContext;
