use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::instrument;

use super::{
    dto::{
        AvatarData, ChangeNicknameRequest, ChangePwdRequest, HobbyData, HobbyListRequest,
        NicknameData, UserInfo,
    },
    services::{self, MAX_AVATAR_BYTES, MAX_HOBBIES},
};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    response::ApiResponse,
    state::AppState,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/user/info", get(info))
        .route("/user/change_pwd", post(change_pwd))
        .route("/user/change_nickname", post(change_nickname))
        .route("/user/save_hobby", post(save_hobby))
        .route(
            "/user/upload_avatar",
            // headroom so oversize files reach the size check instead of a 413
            post(upload_avatar).layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES + 1024 * 1024)),
        )
}

#[instrument(skip_all, fields(user_id = auth.user.id))]
pub async fn info(auth: AuthUser) -> Json<ApiResponse<UserInfo>> {
    Json(ApiResponse::ok("ok", UserInfo::from(&auth.user)))
}

#[instrument(skip_all, fields(user_id = auth.user.id))]
pub async fn change_pwd(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePwdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let payload = payload.validate()?;
    services::change_password(&state, &auth.user, &payload.old_password, &payload.new_password)
        .await?;
    Ok(Json(ApiResponse::message(
        "password changed; please log in again",
    )))
}

#[instrument(skip_all, fields(user_id = auth.user.id))]
pub async fn change_nickname(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangeNicknameRequest>,
) -> AppResult<Json<ApiResponse<NicknameData>>> {
    let payload = payload.validate()?;
    let user = services::change_nickname(&state, &auth.user, &payload.nickname).await?;
    Ok(Json(ApiResponse::ok(
        "nickname updated",
        NicknameData {
            nickname: user.nickname,
        },
    )))
}

#[instrument(skip_all, fields(user_id = auth.user.id))]
pub async fn save_hobby(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<HobbyListRequest>,
) -> AppResult<Json<ApiResponse<HobbyData>>> {
    let user = services::save_hobbies(&state, &auth.user, &payload.hobby_list).await?;
    let hobby_list = user.hobbies();
    Ok(Json(ApiResponse::ok(
        format!(
            "hobbies saved: {} of at most {}",
            hobby_list.len(),
            MAX_HOBBIES
        ),
        HobbyData { hobby_list },
    )))
}

/// Multipart form with a single `file` field.
#[instrument(skip_all, fields(user_id = auth.user.id))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    auth: AuthUser,
    mut mp: Multipart,
) -> AppResult<Json<ApiResponse<AvatarData>>> {
    let mut upload: Option<(Option<String>, Bytes)> = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        upload = Some((filename, data));
        break;
    }

    let (filename, data) = upload.unwrap_or((None, Bytes::new()));
    let user = services::upload_avatar(&state, &auth.user, filename.as_deref(), data).await?;
    Ok(Json(ApiResponse::ok(
        "avatar uploaded",
        AvatarData {
            avatar_url: user.avatar,
        },
    )))
}
