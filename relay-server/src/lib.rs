//! Boundary Adapter (spec §4.I): translates HTTP/WebSocket traffic to the
//! core engine's operations and back, performing display-endian hex
//! conversion at the edge.

mod auth;
mod dto;
mod error;
mod rescan_handle;
mod routes;
mod state;
mod ws;

use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Builds the full router: every route from spec §6 plus ambient
/// CORS/trace/timeout middleware and, when `state.api_key` is set, the
/// constant-time auth layer in front of everything.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/relay", get(routes::status).delete(routes::wipe))
        .route("/relay/latest/:max_id", get(routes::latest))
        .route("/relay/rescan", axum::routing::post(routes::rescan))
        .route("/relay/outpoint/:hash/:index", get(routes::get_outpoint))
        .route("/relay/script/:script", get(routes::get_script))
        .route("/relay/request/:id", get(routes::get_request))
        .route(
            "/relay/request",
            get(routes::list_requests)
                .put(routes::put_request)
                .delete(routes::delete_request),
        )
        .route("/relay/ws", get(ws::upgrade));

    let api = api.route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        auth::require_api_key,
    ));

    api.layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
