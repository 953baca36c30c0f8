use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purpose of a JWT. Activation links must never work as session tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Activation,
}

/// JWT payload for both access and activation tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,     // user email
    pub iat: i64,        // issued at (unix timestamp)
    pub exp: i64,        // expires at (unix timestamp)
    pub jti: Uuid,       // makes every issued token string distinct
    pub kind: TokenKind,
}
