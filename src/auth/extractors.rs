use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::{jwt::TokenError, repo_types::User};
use crate::{error::AppError, state::AppState};

/// Authenticated caller plus the exact token presented, so logout can revoke it.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl AuthUser {
    /// Checks run in order: scheme, revocation, signature/expiry, user lookup.
    pub async fn from_header(state: &AppState, header: Option<&str>) -> Result<Self, AppError> {
        let header =
            header.ok_or_else(|| AppError::Unauthenticated("missing Authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthenticated("invalid auth scheme".into()))?;

        if state.tokens.is_revoked(token).await {
            warn!("revoked token presented");
            return Err(AppError::Unauthenticated(
                "token has been revoked; please log in again".into(),
            ));
        }

        let claims = state.tokens.verify_access(token).map_err(|e| match e {
            TokenError::MissingKey => AppError::Token(e),
            TokenError::Invalid(_) => {
                warn!("invalid or expired token");
                AppError::Unauthenticated("invalid or expired token".into())
            }
        })?;

        let user = state
            .users
            .find_by_email(&claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(email = %claims.sub, "token subject not found");
                AppError::Unauthenticated("user not found".into())
            })?;

        Ok(AuthUser {
            user,
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        AuthUser::from_header(state, header).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    fn assert_unauthenticated(res: Result<AuthUser, AppError>) {
        match res {
            Err(AppError::Unauthenticated(_)) => {}
            Err(other) => panic!("expected Unauthenticated, got {other:?}"),
            Ok(_) => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn accepts_valid_bearer_token() {
        let ctx = TestContext::new();
        let (user, token) = ctx.active_user("u@x.com", "secret1").await;
        let header = format!("Bearer {token}");
        let auth = AuthUser::from_header(&ctx.state, Some(&header)).await.unwrap();
        assert_eq!(auth.user.id, user.id);
        assert_eq!(auth.token, token);
    }

    #[tokio::test]
    async fn rejects_missing_header_and_wrong_scheme() {
        let ctx = TestContext::new();
        let (_, token) = ctx.active_user("u@x.com", "secret1").await;
        assert_unauthenticated(AuthUser::from_header(&ctx.state, None).await);
        assert_unauthenticated(AuthUser::from_header(&ctx.state, Some(&token)).await);
        assert_unauthenticated(
            AuthUser::from_header(&ctx.state, Some(&format!("Basic {token}"))).await,
        );
        assert_unauthenticated(AuthUser::from_header(&ctx.state, Some("Bearer ")).await);
    }

    #[tokio::test]
    async fn rejects_revoked_token_before_expiry() {
        let ctx = TestContext::new();
        let (_, token) = ctx.active_user("u@x.com", "secret1").await;
        ctx.state.tokens.revoke(&token).await;
        assert_unauthenticated(
            AuthUser::from_header(&ctx.state, Some(&format!("Bearer {token}"))).await,
        );
    }

    #[tokio::test]
    async fn rejects_activation_token() {
        let ctx = TestContext::new();
        ctx.active_user("u@x.com", "secret1").await;
        let token = ctx.state.tokens.issue_activation_token("u@x.com").unwrap();
        assert_unauthenticated(
            AuthUser::from_header(&ctx.state, Some(&format!("Bearer {token}"))).await,
        );
    }

    #[tokio::test]
    async fn rejects_token_for_unknown_user() {
        let ctx = TestContext::new();
        let token = ctx.state.tokens.issue_access_token("ghost@x.com").unwrap();
        assert_unauthenticated(
            AuthUser::from_header(&ctx.state, Some(&format!("Bearer {token}"))).await,
        );
    }
}
