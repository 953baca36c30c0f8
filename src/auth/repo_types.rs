use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Separator of the persisted hobby list.
pub const HOBBY_DELIMITER: char = ',';

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 hash, not exposed in JSON
    pub nickname: String,
    pub avatar: String,               // public URL, empty until uploaded
    pub hobby_list: String,           // delimited, see `hobbies()`
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn hobbies(&self) -> Vec<String> {
        self.hobby_list
            .split(HOBBY_DELIMITER)
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Storage form of an already normalised hobby list.
pub fn join_hobbies(hobbies: &[String]) -> String {
    hobbies.join(&HOBBY_DELIMITER.to_string())
}
