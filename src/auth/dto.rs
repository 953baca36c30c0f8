use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 20;
pub const EMAIL_MAX: usize = 100;

/// Request body for registration and login.
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub email: String,
    pub password: String,
}

impl UserRequest {
    /// Normalises the email and checks both fields.
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.email = self.email.trim().to_lowercase();
        if self.email.chars().count() > EMAIL_MAX {
            return Err(AppError::validation("email must be at most 100 characters"));
        }
        if !is_valid_email(&self.email) {
            return Err(AppError::validation("invalid email format"));
        }
        validate_password("password", &self.password)?;
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct ActivateQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user_id: i64,
    pub email: String,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn validate_password(field: &str, password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
        return Err(AppError::validation(format!(
            "{field} must be {PASSWORD_MIN}-{PASSWORD_MAX} characters"
        )));
    }
    Ok(())
}
