use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{
    auth::{jwt::TokenError, services::AuthError},
    generation::services::GenerationError,
    profile::services::ProfileError,
    upstream::UpstreamError,
};

/// Error returned by every handler. Renders as `{ "code": <status>, "msg": <text> }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed input rejected before any business logic runs.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Auth(e) => match e {
                AuthError::NotActivated => (StatusCode::FORBIDDEN, e.to_string()),
                AuthError::Token(t) => token_status(t),
                AuthError::Internal(inner) => internal(inner),
                AuthError::DuplicateEmail
                | AuthError::InvalidOrExpiredToken
                | AuthError::InvalidCredentials => (StatusCode::BAD_REQUEST, e.to_string()),
            },
            AppError::Token(t) => token_status(t),
            AppError::Profile(e) => match e {
                ProfileError::Internal(inner) => internal(inner),
                _ => (StatusCode::BAD_REQUEST, e.to_string()),
            },
            AppError::Generation(e) => match e {
                GenerationError::EmptyText => (StatusCode::BAD_REQUEST, e.to_string()),
                GenerationError::Upstream(u) => upstream(u),
                GenerationError::Internal(inner) => internal(inner),
            },
            AppError::Upstream(u) => upstream(u),
            AppError::Internal(inner) => internal(inner),
        }
    }
}

fn token_status(err: &TokenError) -> (StatusCode, String) {
    match err {
        TokenError::MissingKey => {
            tracing::error!("token signing key is not configured");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server is not configured for authentication".into(),
            )
        }
        TokenError::Invalid(_) => (StatusCode::UNAUTHORIZED, "invalid or expired token".into()),
    }
}

fn upstream(err: &UpstreamError) -> (StatusCode, String) {
    tracing::warn!(error = %err, "upstream call failed");
    (StatusCode::BAD_GATEWAY, err.to_string())
}

fn internal(err: &anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = ?err, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "an internal error occurred".into(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = self.status_and_message();
        let body = Json(json!({ "code": status.as_u16(), "msg": msg }));
        if status == StatusCode::UNAUTHORIZED {
            return (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response();
        }
        (status, body).into_response()
    }
}
