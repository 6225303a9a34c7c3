//! HTTP handler for AtomPub entry creation.
//! Runs the address and credential checks on the request head, reads the
//! body only when they pass, then asks the backend to create the resource.

use crate::{
    errors::{AppError, GatewayError},
    models::entry::ResourceRef,
    state::AppState,
};
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::Instrument;
use uuid::Uuid;

/// `POST` on any address.
pub async fn create_entry(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("post", %request_id, path = %parts.uri.path());

    async move {
        let target = state
            .dispatcher
            .authorize(parts.uri.path(), &parts.headers)
            .await
            .map_err(|err| reject(&state, err))?;

        let limit = state.dispatcher.config().max_body_bytes;
        let bytes = read_body(body, limit)
            .await
            .map_err(|err| reject(&state, err))?;

        let intent = state
            .dispatcher
            .accept(target, &bytes)
            .map_err(|err| reject(&state, err))?;

        let created = state
            .creator
            .create(&intent)
            .await
            .map_err(|err| reject(&state, err.into()))?;

        tracing::info!("created {}", created.location);
        Ok::<_, AppError>(created_response(&created))
    }
    .instrument(span)
    .await
}

/// Collect at most `limit` bytes of `body`.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(GatewayError::PayloadTooLarge(limit))
        }
        Err(err) => Err(GatewayError::BodyUnreadable(err.to_string())),
    }
}

fn reject(state: &AppState, err: GatewayError) -> AppError {
    match &err {
        GatewayError::BackendUnavailable(cause) => tracing::error!("backend failure: {}", cause),
        other => tracing::warn!("rejected with {}: {}", other.status(), other),
    }
    AppError::from_gateway(&err, &state.dispatcher.config().realm)
}

fn created_response(created: &ResourceRef) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::CREATED;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&created.location) {
        headers.insert(header::LOCATION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", created.etag)) {
        headers.insert(header::ETAG, value);
    }
    response
}
