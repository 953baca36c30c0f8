//! In-memory `AppState` and scripted collaborators for unit and HTTP tests.

use std::{
    collections::VecDeque,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tempfile::TempDir;

use crate::{
    auth::{
        jwt::TokenService,
        repo::MemoryUserStore,
        repo_types::User,
        revocation::MemoryRevoker,
        services::{activate, login, register},
    },
    config::{AppConfig, JwtConfig, LlmConfig, UpstreamConfig},
    generation::{
        llm::LlmClient,
        sd::{ImageGenerator, Txt2ImgRequest},
    },
    mail::{MailError, Mailer},
    state::AppState,
    storage::{LocalStorage, ObjectInfo, StorageClient},
    upstream::UpstreamError,
};

pub const TEST_DOMAIN: &str = "https://muse.test";

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
    fail_next: Mutex<bool>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    /// Token query parameter of the most recent activation link.
    pub fn last_token(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let (_, link) = sent.last()?;
        link.split_once("token=").map(|(_, t)| t.to_string())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_activation(&self, to: &str, link: &str) -> Result<(), MailError> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(MailError::Build("scripted delivery failure".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), link.to_string()));
        Ok(())
    }
}

/// Replies are consumed in order; an empty script is a format error.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<Value, UpstreamError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn reply(&self, value: Value) {
        self.replies.lock().unwrap().push_back(Ok(value));
    }

    pub fn fail(&self, err: UpstreamError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete_json(&self, prompt: &str) -> Result<Value, UpstreamError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::Format("no scripted reply".into())))
    }
}

/// Succeeds with a tiny payload unless a failure was queued.
#[derive(Default)]
pub struct ScriptedImages {
    failures: Mutex<VecDeque<UpstreamError>>,
    requests: Mutex<Vec<Txt2ImgRequest>>,
}

impl ScriptedImages {
    pub fn fail_next(&self, err: UpstreamError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn requests(&self) -> Vec<Txt2ImgRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedImages {
    async fn txt2img(&self, req: &Txt2ImgRequest) -> Result<Vec<u8>, UpstreamError> {
        self.requests.lock().unwrap().push(req.clone());
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(b"\x89PNG fake".to_vec()),
        }
    }
}

/// Delegates to the wrapped storage but rejects the first write whose key
/// ends with `suffix`.
pub struct FailingPuts<S> {
    inner: S,
    suffix: &'static str,
    armed: Mutex<bool>,
}

impl<S> FailingPuts<S> {
    pub fn once(inner: S, suffix: &'static str) -> Self {
        Self {
            inner,
            suffix,
            armed: Mutex::new(true),
        }
    }
}

#[async_trait]
impl<S: StorageClient> StorageClient for FailingPuts<S> {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        if key.ends_with(self.suffix) && std::mem::take(&mut *self.armed.lock().unwrap()) {
            bail!("scripted write failure for {key}");
        }
        self.inner.put_object(key, body).await
    }

    async fn read_text(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.read_text(key).await
    }

    async fn list_objects(&self, prefix: &str) -> anyhow::Result<Vec<ObjectInfo>> {
        self.inner.list_objects(prefix).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }
}

pub struct TestContext {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    pub llm: Arc<ScriptedLlm>,
    pub images: Arc<ScriptedImages>,
    dir: TempDir,
}

pub fn test_config(static_dir: &Path) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        jwt: JwtConfig {
            secret: Some("test-secret".into()),
            ttl_minutes: 120,
            activation_ttl_hours: 24,
        },
        server_domain: TEST_DOMAIN.into(),
        static_dir: static_dir.to_path_buf(),
        smtp: None,
        llm: LlmConfig {
            api_key: None,
            base_url: "http://llm.invalid".into(),
            model: "qwen-plus".into(),
        },
        sd_api_url: "http://sd.invalid".into(),
        upstream: UpstreamConfig {
            timeout_secs: 1,
            max_attempts: 1,
        },
    }
}

impl TestContext {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let mailer = Arc::new(RecordingMailer::default());
        let llm = Arc::new(ScriptedLlm::default());
        let images = Arc::new(ScriptedImages::default());
        let tokens = Arc::new(TokenService::new(
            &config.jwt,
            Arc::new(MemoryRevoker::default()),
        ));

        let state = AppState {
            storage: Arc::new(LocalStorage::new(dir.path(), TEST_DOMAIN)),
            config: Arc::new(config),
            users: Arc::new(MemoryUserStore::default()),
            tokens,
            mailer: mailer.clone(),
            llm: llm.clone(),
            images: images.clone(),
        };

        Self {
            state,
            mailer,
            llm,
            images,
            dir,
        }
    }

    pub fn static_root(&self) -> &Path {
        self.dir.path()
    }

    /// A second handle on the same static root.
    pub fn local_storage(&self) -> LocalStorage {
        LocalStorage::new(self.dir.path(), TEST_DOMAIN)
    }

    /// Registers, activates and logs in; returns the user and its access token.
    pub async fn active_user(&self, email: &str, password: &str) -> (User, String) {
        register(&self.state, email, password).await.unwrap();
        let token = self.mailer.last_token().unwrap();
        activate(&self.state, &token).await.unwrap();
        login(&self.state, email, password).await.unwrap()
    }
}
