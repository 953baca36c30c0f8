use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::debug;

/// Registry of tokens invalidated before their natural expiry.
#[async_trait]
pub trait Revoker: Send + Sync {
    async fn revoke(&self, token: &str, expires_at: OffsetDateTime);
    async fn is_revoked(&self, token: &str) -> bool;
}

/// Single-process revocation set.
///
/// Keeps SHA-256 digests rather than raw tokens. An entry is only needed until
/// the token expires on its own, so expired entries are dropped on each insert.
#[derive(Default)]
pub struct MemoryRevoker {
    entries: Mutex<HashMap<[u8; 32], OffsetDateTime>>,
}

impl MemoryRevoker {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<[u8; 32], OffsetDateTime>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

#[async_trait]
impl Revoker for MemoryRevoker {
    async fn revoke(&self, token: &str, expires_at: OffsetDateTime) {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, exp| *exp > now);
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "expired revocations purged");
        }
        entries
            .entry(digest(token))
            .and_modify(|exp| *exp = (*exp).max(expires_at))
            .or_insert(expires_at);
    }

    async fn is_revoked(&self, token: &str) -> bool {
        self.lock().contains_key(&digest(token))
    }
}
