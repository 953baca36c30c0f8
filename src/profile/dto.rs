use serde::{Deserialize, Serialize};
use time::macros::format_description;

use crate::{auth::repo_types::User, auth::validate_password, error::AppError};

use super::services::MAX_HOBBIES;

pub const NICKNAME_MIN: usize = 2;
pub const NICKNAME_MAX: usize = 20;

#[derive(Debug, Deserialize)]
pub struct ChangePwdRequest {
    pub old_password: String,
    pub new_password: String,
}

impl ChangePwdRequest {
    pub fn validate(self) -> Result<Self, AppError> {
        validate_password("new password", &self.new_password)?;
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeNicknameRequest {
    pub nickname: String,
}

impl ChangeNicknameRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.nickname = self.nickname.trim().to_string();
        let len = self.nickname.chars().count();
        if !(NICKNAME_MIN..=NICKNAME_MAX).contains(&len) {
            return Err(AppError::validation(format!(
                "nickname must be {NICKNAME_MIN}-{NICKNAME_MAX} characters"
            )));
        }
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct HobbyListRequest {
    pub hobby_list: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct NicknameData {
    pub nickname: String,
}

#[derive(Debug, Serialize)]
pub struct AvatarData {
    pub avatar_url: String,
}

#[derive(Debug, Serialize)]
pub struct HobbyData {
    pub hobby_list: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub user_id: i64,
    pub email: String,
    pub nickname: String,
    pub avatar: String,
    pub hobby_list: Vec<String>,
    pub is_active: bool,
    pub create_time: String,
    pub hobby_count: usize,
    pub max_hobby_num: usize,
}

impl From<&User> for UserInfo {
    fn from(u: &User) -> Self {
        let hobby_list = u.hobbies();
        let create_time = u
            .created_at
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .unwrap_or_default();
        Self {
            user_id: u.id,
            email: u.email.clone(),
            nickname: u.nickname.clone(),
            avatar: u.avatar.clone(),
            hobby_count: hobby_list.len(),
            hobby_list,
            is_active: u.is_active,
            create_time,
            max_hobby_num: MAX_HOBBIES,
        }
    }
}
