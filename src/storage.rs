use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

/// A stored file directly under a listed prefix.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub name: String,
    pub modified: Option<OffsetDateTime>,
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()>;
    /// `Ok(None)` when the object does not exist.
    async fn read_text(&self, key: &str) -> anyhow::Result<Option<String>>;
    /// Files directly under `prefix`; an absent prefix lists as empty.
    async fn list_objects(&self, prefix: &str) -> anyhow::Result<Vec<ObjectInfo>>;
    fn public_url(&self, key: &str) -> String;
}

/// Files under a directory on disk, served publicly below `{domain}/static`.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, server_domain: &str) -> Self {
        Self {
            root: root.into(),
            public_base: format!("{}/static", server_domain.trim_end_matches('/')),
        }
    }

    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        anyhow::ensure!(safe && !key.is_empty(), "invalid storage key {key:?}");
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    async fn read_text(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.resolve(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn list_objects(&self, prefix: &str) -> anyhow::Result<Vec<ObjectInfo>> {
        let dir = self.resolve(prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("read dir {}", dir.display())),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            out.push(ObjectInfo {
                key: format!("{}/{}", prefix.trim_end_matches('/'), name),
                name,
                modified: meta.modified().ok().map(OffsetDateTime::from),
            });
        }
        Ok(out)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }
}

#[cfg(test)]
mod storage_tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let st = LocalStorage::new(dir.path(), "https://muse.example/");
        (dir, st)
    }

    #[tokio::test]
    async fn put_then_read_text() {
        let (_dir, st) = storage();
        st.put_object("alice/prompts/a_prompt.txt", Bytes::from_static(b"a cat"))
            .await
            .unwrap();
        let text = st.read_text("alice/prompts/a_prompt.txt").await.unwrap();
        assert_eq!(text.as_deref(), Some("a cat"));
        assert!(st.read_text("alice/prompts/missing.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_skips_subdirectories_and_missing_prefix() {
        let (_dir, st) = storage();
        st.put_object("bob/one.png", Bytes::from_static(b"1")).await.unwrap();
        st.put_object("bob/prompts/one_prompt.txt", Bytes::from_static(b"p"))
            .await
            .unwrap();

        let listed = st.list_objects("bob").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "one.png");
        assert_eq!(listed[0].key, "bob/one.png");
        assert!(listed[0].modified.is_some());

        assert!(st.list_objects("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let (_dir, st) = storage();
        assert!(st.put_object("../outside.txt", Bytes::new()).await.is_err());
        assert!(st.put_object("/etc/passwd", Bytes::new()).await.is_err());
    }

    #[test]
    fn public_url_uses_static_prefix() {
        let (_dir, st) = storage();
        assert_eq!(
            st.public_url("avatar/x.png"),
            "https://muse.example/static/avatar/x.png"
        );
    }
}
