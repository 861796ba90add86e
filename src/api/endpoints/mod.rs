//! API endpoint handlers.
//!
//! Engine calls touch SQLite synchronously, so handlers run them on the
//! blocking pool through `run_blocking`.

pub mod appointments;
pub mod calendar;
pub mod health;
pub mod requests;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;
use crate::negotiation::NegotiationError;

pub(crate) async fn run_blocking<T, F>(ctx: &ApiContext, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&CoreState) -> Result<T, NegotiationError> + Send + 'static,
    T: Send + 'static,
{
    let core = ctx.core.clone();
    tokio::task::spawn_blocking(move || f(&core))
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}
