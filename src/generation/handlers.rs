use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{GalleryItem, GeneratedImage, StableRequest, TranslateRequest, TranslateResponse},
    services,
};
use crate::{auth::extractors::AuthUser, error::AppResult, response::ApiResponse, state::AppState};

pub fn generation_routes() -> Router<AppState> {
    Router::new()
        .route("/translate", post(translate))
        .route("/stable", post(stable))
        .route("/stable/gallery", get(gallery))
}

#[instrument(skip_all, fields(user_id = auth.user.id))]
pub async fn translate(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<TranslateRequest>,
) -> AppResult<Json<TranslateResponse>> {
    let out = services::translate(&state, &payload.target_lang, &payload.text).await?;
    Ok(Json(out))
}

#[instrument(skip_all, fields(user_id = auth.user.id, style = %payload.model))]
pub async fn stable(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<StableRequest>,
) -> AppResult<Json<ApiResponse<GeneratedImage>>> {
    let image = services::generate_images(&state, &auth.user, &payload.text, &payload.model).await?;
    Ok(Json(ApiResponse::ok("image generated", image)))
}

#[instrument(skip_all, fields(user_id = auth.user.id))]
pub async fn gallery(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<GalleryItem>>>> {
    let items = services::gallery(&state, &auth.user).await?;
    Ok(Json(ApiResponse::ok("ok", items)))
}
