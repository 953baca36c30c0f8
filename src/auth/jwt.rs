use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::{
    claims::{Claims, TokenKind},
    revocation::Revoker,
};
use crate::config::JwtConfig;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing key is not configured")]
    MissingKey,

    /// Bad signature, malformed, expired, or of the wrong kind.
    #[error("invalid token: {0}")]
    Invalid(String),
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and checks HS256 tokens; consults the revocation set for logout.
pub struct TokenService {
    keys: Option<Keys>,
    access_ttl: Duration,
    activation_ttl: Duration,
    revoker: Arc<dyn Revoker>,
}

impl TokenService {
    pub fn new(cfg: &JwtConfig, revoker: Arc<dyn Revoker>) -> Self {
        let keys = cfg.secret.as_ref().map(|secret| Keys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        });
        Self {
            keys,
            access_ttl: Duration::minutes(cfg.ttl_minutes),
            activation_ttl: Duration::hours(cfg.activation_ttl_hours),
            revoker,
        }
    }

    fn keys(&self) -> Result<&Keys, TokenError> {
        self.keys.as_ref().ok_or(TokenError::MissingKey)
    }

    fn sign_with_kind(&self, email: &str, kind: TokenKind) -> Result<String, TokenError> {
        let keys = self.keys()?;
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Activation => self.activation_ttl,
        };
        let claims = Claims {
            sub: email.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            jti: Uuid::new_v4(),
            kind,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        debug!(email, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn issue_access_token(&self, email: &str) -> Result<String, TokenError> {
        self.sign_with_kind(email, TokenKind::Access)
    }

    pub fn issue_activation_token(&self, email: &str) -> Result<String, TokenError> {
        self.sign_with_kind(email, TokenKind::Activation)
    }

    /// Checks signature and expiry only.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let keys = self.keys()?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        let data = decode::<Claims>(token, &keys.decoding, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        Ok(data.claims)
    }

    fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.kind != kind {
            return Err(TokenError::Invalid(format!("expected {kind:?} token")));
        }
        debug!(email = %claims.sub, kind = ?kind, "jwt verified");
        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn verify_activation(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Activation)
    }

    /// Idempotent. The entry lives until the token's own expiry; tokens whose
    /// claims cannot be read are kept for a full access TTL.
    pub async fn revoke(&self, token: &str) {
        let expires_at = self
            .expiry_unchecked(token)
            .unwrap_or_else(|| OffsetDateTime::now_utc() + self.access_ttl);
        self.revoker.revoke(token, expires_at).await;
    }

    pub async fn is_revoked(&self, token: &str) -> bool {
        self.revoker.is_revoked(token).await
    }

    fn expiry_unchecked(&self, token: &str) -> Option<OffsetDateTime> {
        let keys = self.keys().ok()?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);
        let data = decode::<Claims>(token, &keys.decoding, &validation).ok()?;
        OffsetDateTime::from_unix_timestamp(data.claims.exp).ok()
    }
}
