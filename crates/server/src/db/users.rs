use anyhow::Result;
use chrono::Utc;
use shared::Role;

use super::{new_id, Database, User};

impl Database {
    /// Creates a user. The very first account becomes the administrator.
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        name: Option<&str>,
    ) -> Result<User> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, created_at)
            SELECT ?, ?, ?, ?,
                   CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'USER' ELSE 'ADMIN' END,
                   ?
            "#,
        )
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_user_by_id(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? COLLATE NOCASE")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Ids of every administrator, oldest account first.
    pub async fn admin_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM users WHERE role = ? ORDER BY created_at ASC",
        )
        .bind(Role::Admin)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let db = Database::in_memory().await.unwrap();
        let first = db.create_user("owner@example.com", "h", Some("Owner")).await.unwrap();
        let second = db.create_user("staff@example.com", "h", None).await.unwrap();
        assert_eq!(first.role, Role::Admin);
        assert_eq!(second.role, Role::User);
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let db = Database::in_memory().await.unwrap();
        db.create_user("Owner@Example.com", "h", None).await.unwrap();
        let found = db.get_user_by_email("owner@example.com").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = Database::in_memory().await.unwrap();
        db.create_user("a@example.com", "h", None).await.unwrap();
        assert!(db.create_user("a@example.com", "h", None).await.is_err());
    }
}
