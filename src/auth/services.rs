use tracing::{error, info, warn};

use super::{
    jwt::TokenError,
    password::{hash_password, verify_password},
    repo::UserChange,
    repo_types::User,
};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("activation link is invalid or expired; please register again")]
    InvalidOrExpiredToken,

    /// Same message for unknown email and wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is not activated; check your inbox for the activation link")]
    NotActivated,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Activated,
    AlreadyActive,
}

/// Creates a pending user and mails the activation link. Mail failures are
/// logged only; the caller sees success as soon as the user exists.
pub async fn register(st: &AppState, email: &str, password: &str) -> Result<User, AuthError> {
    if st.users.find_by_email(email).await?.is_some() {
        warn!(email, "email already registered");
        return Err(AuthError::DuplicateEmail);
    }

    // issued before the insert so a missing key leaves no orphaned user
    let activation_token = st.tokens.issue_activation_token(email)?;
    let hash = hash_password(password).await?;

    let user = st
        .users
        .create(email, &hash)
        .await?
        .ok_or(AuthError::DuplicateEmail)?;
    info!(user_id = user.id, email, "user registered");

    let link = format!(
        "{}/api/user/active?token={}",
        st.config.server_domain, activation_token
    );
    if let Err(e) = st.mailer.send_activation(email, &link).await {
        error!(error = %e, email, "activation email delivery failed");
    }
    Ok(user)
}

pub async fn activate(st: &AppState, token: &str) -> Result<Activation, AuthError> {
    let claims = st.tokens.verify_activation(token).map_err(|e| match e {
        TokenError::MissingKey => AuthError::Token(e),
        TokenError::Invalid(reason) => {
            warn!(%reason, "activation token rejected");
            AuthError::InvalidOrExpiredToken
        }
    })?;

    let user = st
        .users
        .find_by_email(&claims.sub)
        .await?
        .ok_or(AuthError::InvalidOrExpiredToken)?;

    if user.is_active {
        return Ok(Activation::AlreadyActive);
    }
    st.users.update(user.id, UserChange::Activate).await?;
    info!(user_id = user.id, "user activated");
    Ok(Activation::Activated)
}

/// Returns the user together with a fresh access token.
pub async fn login(st: &AppState, email: &str, password: &str) -> Result<(User, String), AuthError> {
    let Some(user) = st.users.find_by_email(email).await? else {
        warn!(email, "login unknown email");
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(password, &user.password_hash).await? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    if !user.is_active {
        warn!(user_id = user.id, "login before activation");
        return Err(AuthError::NotActivated);
    }

    let token = st.tokens.issue_access_token(&user.email)?;
    info!(user_id = user.id, "user logged in");
    Ok((user, token))
}

pub async fn logout(st: &AppState, user: &User, token: &str) {
    st.tokens.revoke(token).await;
    info!(user_id = user.id, "user logged out");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    #[tokio::test]
    async fn register_then_login_is_not_activated() {
        let ctx = TestContext::new();
        register(&ctx.state, "u@x.com", "secret1").await.unwrap();
        let err = login(&ctx.state, "u@x.com", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::NotActivated));
    }

    #[tokio::test]
    async fn wrong_password_on_pending_account_is_invalid_credentials() {
        let ctx = TestContext::new();
        register(&ctx.state, "u@x.com", "secret1").await.unwrap();
        let err = login(&ctx.state, "u@x.com", "wrong-1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_email_is_invalid_credentials() {
        let ctx = TestContext::new();
        let err = login(&ctx.state, "ghost@x.com", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let ctx = TestContext::new();
        register(&ctx.state, "u@x.com", "secret1").await.unwrap();
        let err = register(&ctx.state, "u@x.com", "secret2").await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn registration_sends_activation_link() {
        let ctx = TestContext::new();
        register(&ctx.state, "u@x.com", "secret1").await.unwrap();
        let sent = ctx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "u@x.com");
        assert!(sent[0].1.starts_with("https://muse.test/api/user/active?token="));
    }

    #[tokio::test]
    async fn registration_succeeds_when_mail_fails() {
        let ctx = TestContext::new();
        ctx.mailer.fail_next();
        let user = register(&ctx.state, "u@x.com", "secret1").await.unwrap();
        assert!(!user.is_active);
        assert!(ctx.state.users.find_by_email("u@x.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn activation_is_idempotent() {
        let ctx = TestContext::new();
        register(&ctx.state, "u@x.com", "secret1").await.unwrap();
        let token = ctx.mailer.last_token().unwrap();

        assert_eq!(activate(&ctx.state, &token).await.unwrap(), Activation::Activated);
        assert_eq!(activate(&ctx.state, &token).await.unwrap(), Activation::AlreadyActive);
        let user = ctx.state.users.find_by_email("u@x.com").await.unwrap().unwrap();
        assert!(user.is_active);
    }

    #[tokio::test]
    async fn activation_rejects_bad_token_and_unknown_subject() {
        let ctx = TestContext::new();
        let err = activate(&ctx.state, "nonsense").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));

        let orphan = ctx.state.tokens.issue_activation_token("ghost@x.com").unwrap();
        let err = activate(&ctx.state, &orphan).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn access_token_cannot_activate() {
        let ctx = TestContext::new();
        register(&ctx.state, "u@x.com", "secret1").await.unwrap();
        let access = ctx.state.tokens.issue_access_token("u@x.com").unwrap();
        let err = activate(&ctx.state, &access).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn login_after_activation_issues_access_token() {
        let ctx = TestContext::new();
        register(&ctx.state, "u@x.com", "secret1").await.unwrap();
        activate(&ctx.state, &ctx.mailer.last_token().unwrap()).await.unwrap();

        let (user, token) = login(&ctx.state, "u@x.com", "secret1").await.unwrap();
        let claims = ctx.state.tokens.verify_access(&token).unwrap();
        assert_eq!(claims.sub, user.email);
    }

    #[tokio::test]
    async fn logout_revokes_presented_token() {
        let ctx = TestContext::new();
        let (user, token) = ctx.active_user("u@x.com", "secret1").await;
        logout(&ctx.state, &user, &token).await;
        logout(&ctx.state, &user, &token).await;
        assert!(ctx.state.tokens.is_revoked(&token).await);
    }
}
