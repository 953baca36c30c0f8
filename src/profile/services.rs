use anyhow::Context;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{
        password::{hash_password, verify_password},
        repo::UserChange,
        repo_types::{join_hobbies, User, HOBBY_DELIMITER},
    },
    state::AppState,
};

pub const MAX_HOBBIES: usize = 10;
/// Ten hobbies of this length plus delimiters fit the 1000-char column.
pub const MAX_HOBBY_CHARS: usize = 50;
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;
const AVATAR_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("old password is incorrect")]
    WrongOldPassword,

    #[error("new password must differ from the old one")]
    SamePassword,

    #[error("choose an avatar file to upload")]
    MissingFile,

    #[error("only jpg/jpeg/png/webp images are accepted")]
    UnsupportedFormat,

    #[error("avatar must not exceed 5MB")]
    TooLarge,

    #[error("at most 10 hobbies are allowed")]
    TooManyHobbies,

    #[error("each hobby must be at most 50 characters")]
    HobbyTooLong,

    #[error("hobbies must not contain ','")]
    DelimiterInHobby,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub async fn change_password(
    st: &AppState,
    user: &User,
    old: &str,
    new: &str,
) -> Result<User, ProfileError> {
    if !verify_password(old, &user.password_hash).await? {
        return Err(ProfileError::WrongOldPassword);
    }
    if old == new {
        return Err(ProfileError::SamePassword);
    }
    let hash = hash_password(new).await?;
    let saved = st
        .users
        .update(user.id, UserChange::PasswordHash(hash))
        .await?;
    info!(user_id = saved.id, "password changed");
    Ok(saved)
}

/// Length is checked at the request boundary.
pub async fn change_nickname(st: &AppState, user: &User, nickname: &str) -> Result<User, ProfileError> {
    let change = UserChange::Nickname(nickname.to_string());
    Ok(st.users.update(user.id, change).await?)
}

pub async fn upload_avatar(
    st: &AppState,
    user: &User,
    filename: Option<&str>,
    body: Bytes,
) -> Result<User, ProfileError> {
    let filename = filename
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or(ProfileError::MissingFile)?;
    let ext = avatar_extension(filename).ok_or(ProfileError::UnsupportedFormat)?;
    if body.len() > MAX_AVATAR_BYTES {
        return Err(ProfileError::TooLarge);
    }

    let key = format!("avatar/{}.{}", Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, body)
        .await
        .with_context(|| format!("store avatar {key}"))?;

    let change = UserChange::Avatar(st.storage.public_url(&key));
    let saved = st.users.update(user.id, change).await?;
    info!(user_id = saved.id, %key, "avatar stored");
    Ok(saved)
}

pub async fn save_hobbies(st: &AppState, user: &User, hobbies: &[String]) -> Result<User, ProfileError> {
    let hobbies = normalize_hobbies(hobbies)?;
    let change = UserChange::HobbyList(join_hobbies(&hobbies));
    Ok(st.users.update(user.id, change).await?)
}

/// Trims, drops blanks, removes duplicates keeping first occurrence.
pub fn normalize_hobbies(raw: &[String]) -> Result<Vec<String>, ProfileError> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for h in raw.iter().map(|h| h.trim()).filter(|h| !h.is_empty()) {
        if h.contains(HOBBY_DELIMITER) {
            return Err(ProfileError::DelimiterInHobby);
        }
        if h.chars().count() > MAX_HOBBY_CHARS {
            return Err(ProfileError::HobbyTooLong);
        }
        if !out.iter().any(|seen| seen == h) {
            out.push(h.to_string());
        }
    }
    if out.len() > MAX_HOBBIES {
        return Err(ProfileError::TooManyHobbies);
    }
    Ok(out)
}

fn avatar_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    AVATAR_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}
