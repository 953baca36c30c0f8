use std::path::PathBuf;

const DEFAULT_LLM_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC key. Issuing or verifying without it is a configuration error.
    pub secret: Option<String>,
    pub ttl_minutes: i64,
    pub activation_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_address: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Public origin prepended to every URL handed back to clients.
    pub server_domain: String,
    pub static_dir: PathBuf,
    pub smtp: Option<SmtpConfig>,
    pub llm: LlmConfig,
    pub sd_api_url: String,
    pub upstream: UpstreamConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(120),
            activation_ttl_hours: env_parse("JWT_ACTIVATION_TTL_HOURS").unwrap_or(24),
        };
        if jwt.secret.is_none() {
            tracing::warn!("JWT_SECRET is not set; login and activation will fail");
        }

        let smtp = std::env::var("SMTP_HOST").ok().map(|host| SmtpConfig {
            host,
            port: env_parse("SMTP_PORT").unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .or_else(|_| std::env::var("SMTP_USER"))
                .unwrap_or_else(|_| "noreply@muse.local".into()),
            user: std::env::var("SMTP_USER").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
        });

        let llm = LlmConfig {
            api_key: std::env::var("LLM_API_KEY").ok(),
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.into()),
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "qwen-plus".into()),
        };

        Ok(Self {
            database_url,
            jwt,
            server_domain: std::env::var("SERVER_DOMAIN")
                .map(|d| d.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            static_dir: std::env::var("STATIC_DIR")
                .unwrap_or_else(|_| "static".into())
                .into(),
            smtp,
            llm,
            sd_api_url: std::env::var("SD_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://127.0.0.1:7860".into()),
            upstream: UpstreamConfig {
                timeout_secs: env_parse("UPSTREAM_TIMEOUT_SECS").unwrap_or(120),
                max_attempts: env_parse::<u32>("UPSTREAM_MAX_ATTEMPTS")
                    .unwrap_or(3)
                    .max(1),
            },
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
