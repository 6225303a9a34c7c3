use crate::services::{backend::BackendError, body_validator::BodyError};
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;
use thiserror::Error;

/// Every way the POST pipeline can reject a request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no credentials supplied")]
    AuthMissing,
    #[error("method not allowed on the root address")]
    MethodNotAllowed,
    #[error("collection `{database}/{collection}` not found")]
    NotFound { database: String, collection: String },
    #[error("credentials rejected for `{0}`")]
    AuthInvalid(String),
    #[error("POST must target a collection, not `{0}`")]
    ClientAddressing(String),
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("request body could not be read: {0}")]
    BodyUnreadable(String),
    #[error(transparent)]
    MalformedBody(#[from] BodyError),
    #[error(transparent)]
    BackendUnavailable(#[from] BackendError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AuthMissing => StatusCode::UNAUTHORIZED,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::AuthInvalid(_) => StatusCode::FORBIDDEN,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::ClientAddressing(_)
            | GatewayError::BodyUnreadable(_)
            | GatewayError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            GatewayError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Final HTTP form of a rejection: a status and an optional text body.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: Option<String>,
    /// Sent as `WWW-Authenticate` on 401.
    pub challenge: Option<String>,
}

impl AppError {
    /// Convert a pipeline error, attaching the Basic challenge for `realm`.
    pub fn from_gateway(err: &GatewayError, realm: &str) -> Self {
        let status = err.status();
        let message = match err {
            GatewayError::MalformedBody(body) => Some(body.to_string()),
            _ => None,
        };
        let challenge = matches!(err, GatewayError::AuthMissing)
            .then(|| format!("Basic realm=\"{}\"", realm));
        Self {
            status,
            message,
            challenge,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{} {}", self.status, message),
            None => write!(f, "{}", self.status),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = match self.message {
            Some(message) => (
                self.status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                message,
            )
                .into_response(),
            None => self.status.into_response(),
        };

        if let Some(value) = self
            .challenge
            .and_then(|challenge| HeaderValue::from_str(&challenge).ok())
        {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}
