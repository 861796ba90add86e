//! API router.
//!
//! Returns a composable `Router`: JSON routes nested under `/api/`, the
//! notification WebSocket at `/ws/notifications`, wrapped in CORS and
//! request tracing layers.

use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::api::websocket;
use crate::core_state::CoreState;

/// Build the full service router.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/requests",
            post(endpoints::requests::create).get(endpoints::requests::list),
        )
        .route("/requests/:id", get(endpoints::requests::detail))
        .route(
            "/requests/:id/transitions",
            post(endpoints::requests::transition),
        )
        .route(
            "/requests/:id/transitions/allowed",
            get(endpoints::requests::allowed),
        )
        .route("/appointments/:id", get(endpoints::appointments::detail))
        .route("/calendar/month", post(endpoints::calendar::month))
        .with_state(ctx.clone());

    let ws_routes = Router::new()
        .route("/ws/notifications", get(websocket::ws_upgrade))
        .with_state(ctx);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .nest("/api", api)
        .merge(ws_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
