use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::warn;

use crate::{
    auth::{
        jwt::TokenService,
        repo::{PgUserStore, UserStore},
        revocation::{MemoryRevoker, Revoker},
    },
    config::AppConfig,
    generation::{
        llm::{ChatCompletionsClient, LlmClient},
        sd::{ImageGenerator, SdWebUiClient},
    },
    mail::{LogMailer, Mailer, SmtpMailer},
    storage::{LocalStorage, StorageClient},
    upstream::{http_client, RetryPolicy},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<TokenService>,
    pub storage: Arc<dyn StorageClient>,
    pub mailer: Arc<dyn Mailer>,
    pub llm: Arc<dyn LlmClient>,
    pub images: Arc<dyn ImageGenerator>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            warn!(error = %e, "migration failed; continuing");
        }

        let revoker = Arc::new(MemoryRevoker::default()) as Arc<dyn Revoker>;
        let tokens = Arc::new(TokenService::new(&config.jwt, revoker));

        let storage = Arc::new(LocalStorage::new(
            config.static_dir.clone(),
            &config.server_domain,
        )) as Arc<dyn StorageClient>;

        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp.clone())),
            None => {
                warn!("SMTP_HOST not set; activation links will only be logged");
                Arc::new(LogMailer)
            }
        };

        let http = http_client(&config.upstream)?;
        let retry = RetryPolicy::from_config(&config.upstream);
        let llm = Arc::new(ChatCompletionsClient::new(
            http.clone(),
            config.llm.clone(),
            retry,
        )) as Arc<dyn LlmClient>;
        let images = Arc::new(SdWebUiClient::new(http, config.sd_api_url.clone(), retry))
            as Arc<dyn ImageGenerator>;

        Ok(Self {
            config: Arc::new(config),
            users: Arc::new(PgUserStore::new(db)),
            tokens,
            storage,
            mailer,
            llm,
            images,
        })
    }
}
