use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::auth::repo_types::User;

const USER_COLUMNS: &str =
    "id, email, password_hash, nickname, avatar, hobby_list, is_active, created_at, updated_at";

/// Credential store. Emails are expected to be normalised by the caller.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;

    /// Creates an inactive user. `Ok(None)` when the email is already taken.
    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<Option<User>>;

    /// Writes a single column and bumps `updated_at`; other columns keep
    /// whatever concurrent requests stored.
    async fn update(&self, id: i64, change: UserChange) -> anyhow::Result<User>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserChange {
    PasswordHash(String),
    Nickname(String),
    Avatar(String),
    HobbyList(String),
    Activate,
}

impl UserChange {
    /// SQL assignment; `$2` is bound to [`UserChange::value`].
    fn assignment(&self) -> &'static str {
        match self {
            UserChange::PasswordHash(_) => "password_hash = $2",
            UserChange::Nickname(_) => "nickname = $2",
            UserChange::Avatar(_) => "avatar = $2",
            UserChange::HobbyList(_) => "hobby_list = $2",
            UserChange::Activate => "is_active = TRUE",
        }
    }

    fn value(&self) -> Option<&str> {
        match self {
            UserChange::PasswordHash(v)
            | UserChange::Nickname(v)
            | UserChange::Avatar(v)
            | UserChange::HobbyList(v) => Some(v),
            UserChange::Activate => None,
        }
    }

    fn apply(self, user: &mut User) {
        match self {
            UserChange::PasswordHash(v) => user.password_hash = v,
            UserChange::Nickname(v) => user.nickname = v,
            UserChange::Avatar(v) => user.avatar = v,
            UserChange::HobbyList(v) => user.hobby_list = v,
            UserChange::Activate => user.is_active = true,
        }
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn update(&self, id: i64, change: UserChange) -> anyhow::Result<User> {
        let sql = format!(
            "UPDATE users SET {}, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}",
            change.assignment()
        );
        let mut query = sqlx::query_as::<_, User>(&sql).bind(id);
        if let Some(value) = change.value() {
            query = query.bind(value);
        }
        let saved = query
            .fetch_one(&self.db)
            .await
            .with_context(|| format!("update user {id}"))?;
        Ok(saved)
    }
}

#[derive(Default)]
struct MemoryInner {
    users: Vec<User>,
    last_id: i64,
}

/// In-process store with the same contract as [`PgUserStore`].
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<MemoryInner>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<Option<User>> {
        let mut inner = self.inner.write().await;
        if inner.users.iter().any(|u| u.email == email) {
            return Ok(None);
        }
        inner.last_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: inner.last_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            nickname: "new user".into(),
            avatar: String::new(),
            hobby_list: String::new(),
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        inner.users.push(user.clone());
        Ok(Some(user))
    }

    async fn update(&self, id: i64, change: UserChange) -> anyhow::Result<User> {
        let mut inner = self.inner.write().await;
        let slot = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .with_context(|| format!("user {id} not found"))?;
        change.apply(slot);
        slot.updated_at = OffsetDateTime::now_utc();
        Ok(slot.clone())
    }
}
