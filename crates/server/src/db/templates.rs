use anyhow::Result;
use chrono::Utc;
use shared::TemplateInput;
use sqlx::SqliteConnection;

use super::{new_id, Database, ReplyTemplate};

async fn clear_default(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("UPDATE reply_templates SET is_default = 0 WHERE is_default = 1")
        .execute(conn)
        .await?;
    Ok(())
}

impl Database {
    pub async fn list_templates(&self) -> Result<Vec<ReplyTemplate>> {
        let templates = sqlx::query_as::<_, ReplyTemplate>(
            "SELECT * FROM reply_templates ORDER BY is_default DESC, name COLLATE NOCASE ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(templates)
    }

    pub async fn get_template(&self, id: &str) -> Result<Option<ReplyTemplate>> {
        let template = sqlx::query_as::<_, ReplyTemplate>("SELECT * FROM reply_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(template)
    }

    pub async fn get_default_template(&self) -> Result<Option<ReplyTemplate>> {
        let template =
            sqlx::query_as::<_, ReplyTemplate>("SELECT * FROM reply_templates WHERE is_default = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(template)
    }

    /// Creates a template. A new default displaces the previous one.
    pub async fn create_template(&self, input: &TemplateInput, created_by: &str) -> Result<ReplyTemplate> {
        let id = new_id();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        if input.is_default {
            clear_default(&mut tx).await?;
        }
        sqlx::query(
            r#"
            INSERT INTO reply_templates (id, name, subject, body, is_default, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.is_default)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let template = sqlx::query_as::<_, ReplyTemplate>("SELECT * FROM reply_templates WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(template)
    }

    pub async fn update_template(&self, id: &str, input: &TemplateInput) -> Result<Option<ReplyTemplate>> {
        let mut tx = self.pool.begin().await?;

        if input.is_default {
            clear_default(&mut tx).await?;
        }
        let result = sqlx::query(
            r#"
            UPDATE reply_templates
            SET name = ?, subject = ?, body = ?, is_default = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&input.name)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.is_default)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction undoes the cleared default
            return Ok(None);
        }
        tx.commit().await?;
        self.get_template(id).await
    }

    pub async fn set_default_template(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        clear_default(&mut tx).await?;
        let result = sqlx::query("UPDATE reply_templates SET is_default = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    pub async fn delete_template(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reply_templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
