use anyhow::Result;
use chrono::Utc;

use super::{Database, Settings};

impl Database {
    /// Settings for `user_id`, created with defaults on first access.
    pub async fn get_user_settings(&self, user_id: &str) -> Result<Settings> {
        let now = Utc::now();
        sqlx::query(
            "INSERT OR IGNORE INTO settings (user_id, created_at, updated_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let settings = sqlx::query_as::<_, Settings>("SELECT * FROM settings WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(settings)
    }

    /// Writes every column of `settings` back. Returns the stored row.
    pub async fn save_settings(&self, settings: &Settings) -> Result<Settings> {
        sqlx::query(
            r#"
            UPDATE settings SET
                company_name = ?, company_email = ?, company_phone = ?, company_address = ?,
                logo_url = ?, smtp_host = ?, smtp_port = ?, smtp_username = ?,
                smtp_password_enc = ?, smtp_from_email = ?, email_notifications = ?,
                quote_notifications = ?, message_notifications = ?, product_notifications = ?,
                notification_email = ?, cloud_name = ?, cloud_api_key = ?,
                cloud_api_secret_enc = ?, session_timeout_minutes = ?, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(&settings.company_name)
        .bind(&settings.company_email)
        .bind(&settings.company_phone)
        .bind(&settings.company_address)
        .bind(&settings.logo_url)
        .bind(&settings.smtp_host)
        .bind(settings.smtp_port)
        .bind(&settings.smtp_username)
        .bind(&settings.smtp_password_enc)
        .bind(&settings.smtp_from_email)
        .bind(settings.email_notifications)
        .bind(settings.quote_notifications)
        .bind(settings.message_notifications)
        .bind(settings.product_notifications)
        .bind(&settings.notification_email)
        .bind(&settings.cloud_name)
        .bind(&settings.cloud_api_key)
        .bind(&settings.cloud_api_secret_enc)
        .bind(settings.session_timeout_minutes)
        .bind(Utc::now())
        .bind(&settings.user_id)
        .execute(&self.pool)
        .await?;

        self.get_user_settings(&settings.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_created_once() {
        let db = Database::in_memory().await.unwrap();
        let user = db.create_user("a@example.com", "h", None).await.unwrap();

        let mut settings = db.get_user_settings(&user.id).await.unwrap();
        assert!(settings.email_notifications);
        assert!(settings.quote_notifications);
        assert!(!settings.product_notifications);
        assert!(settings.smtp_password_enc.is_none());

        settings.company_name = "Prime Cuts Export".into();
        settings.message_notifications = false;
        db.save_settings(&settings).await.unwrap();

        let again = db.get_user_settings(&user.id).await.unwrap();
        assert_eq!(again.company_name, "Prime Cuts Export");
        assert!(!again.message_notifications);
    }
}
