use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{ActivateQuery, LoginResponse, UserRequest},
    extractors::AuthUser,
    services::{self, Activation},
};
use crate::{error::AppResult, response::ApiResponse, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/user/register", post(register))
        .route("/user/active", get(activate))
        .route("/user/login", post(login))
        .route("/user/logout", post(logout))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<UserRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let payload = payload.validate()?;
    services::register(&state, &payload.email, &payload.password).await?;
    Ok(Json(ApiResponse::message(
        "registered; an activation link has been sent to your email",
    )))
}

#[instrument(skip(state, query))]
pub async fn activate(
    State(state): State<AppState>,
    Query(query): Query<ActivateQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    let msg = match services::activate(&state, &query.token).await? {
        Activation::Activated => "account activated; you can now log in",
        Activation::AlreadyActive => "account is already active",
    };
    Ok(Json(ApiResponse::message(msg)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<UserRequest>,
) -> AppResult<Json<LoginResponse>> {
    let payload = payload.validate()?;
    let (user, access_token) = services::login(&state, &payload.email, &payload.password).await?;
    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer",
        user_id: user.id,
        email: user.email,
    }))
}

#[instrument(skip_all, fields(user_id = auth.user.id))]
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> Json<ApiResponse<()>> {
    services::logout(&state, &auth.user, &auth.token).await;
    Json(ApiResponse::message(
        "logged out; this token can no longer be used",
    ))
}
