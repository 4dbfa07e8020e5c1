//! Transport gateway. Everything that leaves the building as email goes
//! through a [`Mailer`].

use futures::future::BoxFuture;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSendmailTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email delivery is not configured")]
    NotConfigured,

    #[error("invalid address {0:?}")]
    Address(String),

    #[error("could not build message: {0}")]
    Build(String),

    #[error("could not fetch attachment {url}: {reason}")]
    Attachment { url: String, reason: String },

    #[error("{0}")]
    Transport(String),
}

/// A file attached by reference; the bytes are fetched at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub url: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<MailAttachment>,
}

impl OutgoingMail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            to_name: None,
            subject: subject.into(),
            html: html.into(),
            attachments: Vec::new(),
        }
    }
}

/// SMTP account configured in a user's settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: Option<String>,
}

pub trait Mailer: Send + Sync {
    /// Delivers `mail`, through `account` when given, else the server's own
    /// transport.
    fn send<'a>(
        &'a self,
        mail: &'a OutgoingMail,
        account: Option<&'a SmtpCredentials>,
    ) -> BoxFuture<'a, Result<(), MailError>>;
}

/// lettre-backed transport: SMTP relay or the local sendmail binary.
pub struct SmtpMailer {
    config: SmtpConfig,
    http: reqwest::Client,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn mailbox(name: &str, email: &str) -> Result<Mailbox, MailError> {
        let text = if name.is_empty() {
            email.to_string()
        } else {
            format!("{} <{}>", name, email)
        };
        text.parse()
            .map_err(|_| MailError::Address(email.to_string()))
    }

    async fn fetch(&self, attachment: &MailAttachment) -> Result<SinglePart, MailError> {
        let failed = |reason: String| MailError::Attachment {
            url: attachment.url.clone(),
            reason,
        };
        let response = self
            .http
            .get(&attachment.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failed(e.to_string()))?;
        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        let content_type = ContentType::parse(&attachment.mime_type)
            .or_else(|_| ContentType::parse("application/octet-stream"))
            .map_err(|e| failed(e.to_string()))?;
        Ok(Attachment::new(attachment.filename.clone()).body(bytes.to_vec(), content_type))
    }

    async fn build(
        &self,
        mail: &OutgoingMail,
        account: Option<&SmtpCredentials>,
    ) -> Result<Message, MailError> {
        let from_email = account
            .and_then(|a| a.from_email.as_deref())
            .unwrap_or(&self.config.from_email);
        let to = Self::mailbox(mail.to_name.as_deref().unwrap_or(""), &mail.to)?;

        let builder = Message::builder()
            .from(Self::mailbox(&self.config.from_name, from_email)?)
            .to(to)
            .subject(mail.subject.clone());

        let message = if mail.attachments.is_empty() {
            builder
                .header(ContentType::TEXT_HTML)
                .body(mail.html.clone())
        } else {
            let mut parts = MultiPart::mixed().singlepart(SinglePart::html(mail.html.clone()));
            for attachment in &mail.attachments {
                parts = parts.singlepart(self.fetch(attachment).await?);
            }
            builder.multipart(parts)
        };
        message.map_err(|e| MailError::Build(e.to_string()))
    }

    async fn deliver(
        &self,
        mail: &OutgoingMail,
        account: Option<&SmtpCredentials>,
    ) -> Result<(), MailError> {
        if account.is_none() && !self.config.enabled {
            return Err(MailError::NotConfigured);
        }
        let message = self.build(mail, account).await?;

        match account {
            Some(account) => {
                let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&account.host)
                    .map_err(|e| MailError::Transport(e.to_string()))?
                    .credentials(Credentials::new(
                        account.username.clone(),
                        account.password.clone(),
                    ))
                    .port(account.port)
                    .build();
                transport
                    .send(message)
                    .await
                    .map_err(|e| MailError::Transport(e.to_string()))?;
            }
            None if self.config.use_sendmail => {
                let transport = AsyncSendmailTransport::<Tokio1Executor>::new();
                transport
                    .send(message)
                    .await
                    .map_err(|e| MailError::Transport(e.to_string()))?;
            }
            None => {
                let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
                    .map_err(|e| MailError::Transport(e.to_string()))?
                    .credentials(Credentials::new(
                        self.config.username.clone(),
                        self.config.password.clone(),
                    ))
                    .port(self.config.port)
                    .build();
                transport
                    .send(message)
                    .await
                    .map_err(|e| MailError::Transport(e.to_string()))?;
            }
        }

        tracing::info!("Sent email to {} ({})", mail.to, mail.subject);
        Ok(())
    }
}

impl Mailer for SmtpMailer {
    fn send<'a>(
        &'a self,
        mail: &'a OutgoingMail,
        account: Option<&'a SmtpCredentials>,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(self.deliver(mail, account))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every send. Mail to an address in `fail_for` fails.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<OutgoingMail>>,
        fail_for: Mutex<Vec<String>>,
    }

    impl RecordingMailer {
        pub fn sent(&self) -> Vec<OutgoingMail> {
            self.sent.lock().unwrap().clone()
        }

        pub fn fail_for(&self, address: &str) {
            self.fail_for.lock().unwrap().push(address.to_string());
        }

        pub fn recover(&self) {
            self.fail_for.lock().unwrap().clear();
        }
    }

    impl Mailer for RecordingMailer {
        fn send<'a>(
            &'a self,
            mail: &'a OutgoingMail,
            _account: Option<&'a SmtpCredentials>,
        ) -> BoxFuture<'a, Result<(), MailError>> {
            Box::pin(async move {
                if self.fail_for.lock().unwrap().contains(&mail.to) {
                    return Err(MailError::Transport("connection refused".into()));
                }
                self.sent.lock().unwrap().push(mail.clone());
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_transport_refuses() {
        let mailer = SmtpMailer::new(SmtpConfig::default());
        let mail = OutgoingMail::new("buyer@example.com", "Hello", "<p>Hi</p>");
        let err = mailer.send(&mail, None).await.unwrap_err();
        assert!(matches!(err, MailError::NotConfigured));
    }

    #[tokio::test]
    async fn test_build_plain_html() {
        let mailer = SmtpMailer::new(SmtpConfig::default());
        let mut mail = OutgoingMail::new("buyer@example.com", "Price list", "<p>Attached</p>");
        mail.to_name = Some("Jane Buyer".into());
        let message = mailer.build(&mail, None).await.unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Price list"));
        assert!(raw.contains("Jane Buyer"));
    }

    #[tokio::test]
    async fn test_bad_recipient() {
        let mailer = SmtpMailer::new(SmtpConfig::default());
        let mail = OutgoingMail::new("not an address", "x", "y");
        let err = mailer.build(&mail, None).await.unwrap_err();
        assert!(matches!(err, MailError::Address(_)));
    }
}
