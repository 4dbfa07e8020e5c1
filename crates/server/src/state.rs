use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    config::{Config, StorageBackend},
    crypto::SecretBox,
    db::{Database, Settings},
    mailer::{Mailer, SmtpCredentials, SmtpMailer},
    ratelimit::RateLimiter,
    storage::{CdnCredentials, CloudinaryStorage, LocalStorage, ObjectStorage},
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub mailer: Arc<dyn Mailer>,
    pub storage: Arc<dyn ObjectStorage>,
    pub limiter: Arc<RateLimiter>,
    pub secrets: SecretBox,
    /// Held for the duration of a scheduled-delivery sweep.
    pub sweep_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(config.smtp.clone()));
        let storage: Arc<dyn ObjectStorage> = match config.storage.backend {
            StorageBackend::Cloudinary => Arc::new(CloudinaryStorage::new(config.storage.clone())),
            StorageBackend::Local => Arc::new(LocalStorage::new(
                &config.storage.local_dir,
                &config.storage.folder,
                &config.server.public_url,
            )),
        };
        Self::with_gateways(db, config, mailer, storage)
    }

    pub fn with_gateways(
        db: Database,
        config: Config,
        mailer: Arc<dyn Mailer>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            secrets: SecretBox::new(&config.security.encryption_key),
            sweep_lock: Arc::new(Mutex::new(())),
            db,
            config,
            mailer,
            storage,
        }
    }

    fn open_secret(&self, sealed: Option<&str>, what: &str) -> Option<String> {
        let sealed = sealed?;
        match self.secrets.open(sealed) {
            Ok(secret) => Some(secret),
            Err(e) => {
                tracing::warn!("Ignoring stored {}: {}", what, e);
                None
            }
        }
    }

    /// SMTP account from the user's settings, when one is fully configured.
    pub fn smtp_account(&self, settings: &Settings) -> Option<SmtpCredentials> {
        let host = settings.smtp_host.as_deref().filter(|h| !h.trim().is_empty())?;
        let password = self.open_secret(settings.smtp_password_enc.as_deref(), "SMTP password")?;
        Some(SmtpCredentials {
            host: host.to_string(),
            port: settings
                .smtp_port
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(587),
            username: settings.smtp_username.clone().unwrap_or_default(),
            password,
            from_email: settings.smtp_from_email.clone(),
        })
    }

    /// CDN account from the user's settings, when one is fully configured.
    pub fn cdn_account(&self, settings: &Settings) -> Option<CdnCredentials> {
        let cloud_name = settings.cloud_name.as_deref().filter(|c| !c.trim().is_empty())?;
        let api_key = settings.cloud_api_key.clone()?;
        let api_secret =
            self.open_secret(settings.cloud_api_secret_enc.as_deref(), "CDN secret")?;
        Some(CdnCredentials {
            cloud_name: cloud_name.to_string(),
            api_key,
            api_secret,
        })
    }

    /// SMTP account to send as `user_id`, if that user configured one.
    pub async fn smtp_account_for(&self, user_id: Option<&str>) -> anyhow::Result<Option<SmtpCredentials>> {
        let Some(user_id) = user_id else {
            return Ok(None);
        };
        let settings = self.db.get_user_settings(user_id).await?;
        Ok(self.smtp_account(&settings))
    }

    pub async fn cdn_account_for(&self, user_id: &str) -> anyhow::Result<Option<CdnCredentials>> {
        let settings = self.db.get_user_settings(user_id).await?;
        Ok(self.cdn_account(&settings))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::mailer::testing::RecordingMailer;
    use crate::storage::testing::RecordingStorage;

    pub struct TestApp {
        pub state: AppState,
        pub mailer: Arc<RecordingMailer>,
        pub storage: Arc<RecordingStorage>,
    }

    /// State over an in-memory database and recording gateways.
    pub async fn test_app() -> TestApp {
        let db = Database::in_memory().await.unwrap();
        let mut config = Config::default();
        config.auth.jwt_secret = "test-secret".into();
        config.scheduler.cron_secret = "cron-secret".into();
        let mailer = Arc::new(RecordingMailer::default());
        let storage = Arc::new(RecordingStorage::default());
        let state = AppState::with_gateways(db, config, mailer.clone(), storage.clone());
        TestApp {
            state,
            mailer,
            storage,
        }
    }
}
