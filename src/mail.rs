use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::SmtpConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("email build error: {0}")]
    Build(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_activation(&self, to: &str, link: &str) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_activation(&self, to: &str, link: &str) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to.parse()?)
            .subject("Activate your account")
            .header(ContentType::TEXT_HTML)
            .body(activation_body(link))
            .map_err(|e| MailError::Build(e.to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)?
            .port(self.config.port);
        if let (Some(user), Some(pass)) = (&self.config.user, &self.config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        builder.build().send(email).await?;
        info!(to, "activation email sent");
        Ok(())
    }
}

/// Used when no SMTP host is configured: the link only goes to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_activation(&self, to: &str, link: &str) -> Result<(), MailError> {
        info!(to, link, "SMTP not configured; activation link logged instead of mailed");
        Ok(())
    }
}

fn activation_body(link: &str) -> String {
    format!(
        "Hello! Click the link to activate your account: <a href='{link}'>{link}</a>. \
         The link expires after a limited time."
    )
}
