//! Defines the gateway's HTTP address space.
//!
//! ## Structure
//! - `GET  /healthz`, `GET /readyz`: liveness and readiness
//! - `POST /` and `POST /{*path}`: entry creation; the path is resolved into
//!   `/{database}/{collection}[/{id}[/...]]` by the dispatcher, not by the router
//!
//! `POST /healthz` and `POST /readyz` are database-only addresses and go
//! through the same pipeline as any other POST.

use crate::{
    handlers::{
        entry_handlers::create_entry,
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the router for every gateway route, without state.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz).post(create_entry))
        .route("/readyz", get(readyz).post(create_entry))
        .route("/", post(create_entry))
        .route("/{*path}", post(create_entry))
}

/// The complete service: routes, state and request tracing. The body limit
/// is enforced by the entry handler once the request head has been checked.
pub fn app(state: AppState) -> Router {
    routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
