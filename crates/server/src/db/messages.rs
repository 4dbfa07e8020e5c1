use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::{Folder, FolderCounts, MessageListQuery, MessageStatus, MessageType, UploadedFile};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::{
    new_id, order_clause, page_window, push_date_range, push_search, Attachment, Database, Message,
};

const SEARCH_COLUMNS: &[&str] = &["name", "email", "subject", "body"];

/// Fields of a message row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
    pub kind: MessageType,
    pub status: MessageStatus,
    pub is_draft: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub thread_id: Option<String>,
    pub parent_message_id: Option<String>,
    pub user_id: Option<String>,
}

impl NewMessage {
    /// A message received through the public contact form.
    pub fn inbound(name: String, email: String, subject: String, body: String) -> Self {
        Self {
            name,
            email,
            subject,
            body,
            kind: MessageType::Inbound,
            status: MessageStatus::Unread,
            is_draft: false,
            scheduled_for: None,
            sent_at: None,
            thread_id: None,
            parent_message_id: None,
            user_id: None,
        }
    }
}

/// Replacement content for a draft being edited or submitted.
#[derive(Debug, Clone)]
pub struct MessageContent {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
    pub status: MessageStatus,
    pub is_draft: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Rows belonging to `folder`, as seen by `user_id`. Must agree with
/// [`Folder::admits`].
fn push_folder(qb: &mut QueryBuilder<'_, Sqlite>, folder: Folder, user_id: &str) {
    match folder {
        Folder::Inbox => {
            qb.push(" AND message_type = ")
                .push_bind(MessageType::Inbound)
                .push(" AND status NOT IN (")
                .push_bind(MessageStatus::Archived)
                .push(", ")
                .push_bind(MessageStatus::Trash)
                .push(")");
        }
        Folder::Sent => {
            qb.push(" AND message_type = ")
                .push_bind(MessageType::Outbound)
                .push(" AND is_draft = 0");
        }
        Folder::Drafts => {
            qb.push(" AND message_type = ")
                .push_bind(MessageType::Outbound)
                .push(" AND is_draft = 1");
        }
        Folder::Archived => {
            qb.push(" AND status = ").push_bind(MessageStatus::Archived);
        }
        Folder::Trash => {
            qb.push(" AND status = ").push_bind(MessageStatus::Trash);
        }
        Folder::Scheduled => {
            qb.push(" AND status = ").push_bind(MessageStatus::Scheduled);
        }
    }
    if folder.is_owner_scoped() {
        qb.push(" AND user_id = ").push_bind(user_id.to_string());
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &MessageListQuery, user_id: &str) {
    push_folder(qb, query.status, user_id);
    push_search(qb, SEARCH_COLUMNS, query.search.as_deref());
    push_date_range(qb, query.date_from, query.date_to);
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, ids: &[String]) {
    qb.push(" AND ").push(column).push(" IN (");
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(id.clone());
    }
    list.push_unseparated(")");
}

async fn insert_attachments(
    conn: &mut SqliteConnection,
    message_id: &str,
    files: &[UploadedFile],
) -> Result<()> {
    let now = Utc::now();
    for file in files {
        sqlx::query(
            r#"
            INSERT INTO attachments (id, message_id, filename, file_url, file_size, mime_type, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_id())
        .bind(message_id)
        .bind(&file.filename)
        .bind(&file.url)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

impl Database {
    /// Inserts a message together with its attachment rows.
    pub async fn create_message(
        &self,
        new: &NewMessage,
        attachments: &[UploadedFile],
    ) -> Result<Message> {
        let id = new_id();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, name, email, subject, body, message_type, status, is_draft,
                                  scheduled_for, sent_at, thread_id, parent_message_id, user_id,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.subject)
        .bind(&new.body)
        .bind(new.kind)
        .bind(new.status)
        .bind(new.is_draft)
        .bind(new.scheduled_for)
        .bind(new.sent_at)
        .bind(&new.thread_id)
        .bind(&new.parent_message_id)
        .bind(&new.user_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        insert_attachments(&mut tx, &id, attachments).await?;

        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(message)
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(message)
    }

    pub async fn get_attachments(&self, message_id: &str) -> Result<Vec<Attachment>> {
        let attachments = sqlx::query_as::<_, Attachment>(
            "SELECT * FROM attachments WHERE message_id = ? ORDER BY uploaded_at ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attachments)
    }

    pub async fn get_attachments_for(&self, message_ids: &[String]) -> Result<Vec<Attachment>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM attachments WHERE 1=1");
        push_id_list(&mut qb, "message_id", message_ids);
        let attachments = qb
            .build_query_as::<Attachment>()
            .fetch_all(&self.pool)
            .await?;
        Ok(attachments)
    }

    /// Other messages of the thread rooted at `root`, oldest first.
    pub async fn get_thread(&self, root: &str, exclude: &str) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE (id = ? OR thread_id = ?) AND id != ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(root)
        .bind(root)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// One page of a folder plus the folder's total size.
    pub async fn get_contact_messages(
        &self,
        query: &MessageListQuery,
        user_id: &str,
    ) -> Result<(Vec<Message>, u64)> {
        let (_, limit, offset) = page_window(query.page, query.limit);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM messages WHERE 1=1");
        push_filters(&mut count, query, user_id);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM messages WHERE 1=1");
        push_filters(&mut select, query, user_id);
        select.push(order_clause(query.sort_by));
        select
            .push(" LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(offset);
        let messages = select
            .build_query_as::<Message>()
            .fetch_all(&self.pool)
            .await?;

        Ok((messages, total.max(0) as u64))
    }

    /// The requesting admin's sent folder.
    pub async fn get_sent_messages(
        &self,
        query: &MessageListQuery,
        user_id: &str,
    ) -> Result<(Vec<Message>, u64)> {
        let query = MessageListQuery {
            status: Folder::Sent,
            ..query.clone()
        };
        self.get_contact_messages(&query, user_id).await
    }

    /// Every row matching the listing filters, ignoring pagination.
    pub async fn export_messages(
        &self,
        query: &MessageListQuery,
        user_id: &str,
    ) -> Result<Vec<Message>> {
        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM messages WHERE 1=1");
        push_filters(&mut select, query, user_id);
        select.push(order_clause(query.sort_by));
        let messages = select
            .build_query_as::<Message>()
            .fetch_all(&self.pool)
            .await?;
        Ok(messages)
    }

    pub async fn folder_counts(&self, user_id: &str) -> Result<FolderCounts> {
        let mut counts = FolderCounts::default();
        for folder in Folder::ALL {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM messages WHERE 1=1");
            push_folder(&mut qb, folder, user_id);
            let n: i64 = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
            let n = n.max(0) as u64;
            match folder {
                Folder::Inbox => counts.inbox = n,
                Folder::Sent => counts.sent = n,
                Folder::Drafts => counts.drafts = n,
                Folder::Archived => counts.archived = n,
                Folder::Trash => counts.trash = n,
                Folder::Scheduled => counts.scheduled = n,
            }
        }

        let unread: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE message_type = ? AND status = ?",
        )
        .bind(MessageType::Inbound)
        .bind(MessageStatus::Unread)
        .fetch_one(&self.pool)
        .await?;
        counts.unread = unread.max(0) as u64;

        Ok(counts)
    }

    /// Moves a message from `from` to `to`. Returns false when the row no
    /// longer has status `from`. An outbound message without `sent_at`
    /// becomes a draft and loses its schedule.
    pub async fn set_message_status(
        &self,
        id: &str,
        from: MessageStatus,
        to: MessageStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET status = ?,
                is_draft = CASE WHEN message_type = ? AND sent_at IS NULL THEN 1 ELSE is_draft END,
                scheduled_for = NULL, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to)
        .bind(MessageType::Outbound)
        .bind(Utc::now())
        .bind(id)
        .bind(from)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One batch update: every listed row whose status is in `sources`
    /// moves to `target`.
    pub async fn update_message_status_many(
        &self,
        ids: &[String],
        target: MessageStatus,
        sources: &[MessageStatus],
    ) -> Result<u64> {
        if ids.is_empty() || sources.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE messages SET status = ");
        qb.push_bind(target)
            .push(", is_draft = CASE WHEN message_type = ")
            .push_bind(MessageType::Outbound)
            .push(" AND sent_at IS NULL THEN 1 ELSE is_draft END, scheduled_for = NULL")
            .push(", updated_at = ")
            .push_bind(Utc::now())
            .push(" WHERE 1=1");
        push_id_list(&mut qb, "id", ids);
        qb.push(" AND status IN (");
        let mut list = qb.separated(", ");
        for status in sources {
            list.push_bind(*status);
        }
        list.push_unseparated(")");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Overwrites a draft's content and attachment set. Returns the
    /// attachments that were dropped so their stored files can be removed.
    pub async fn rewrite_draft(
        &self,
        id: &str,
        content: &MessageContent,
        attachments: &[UploadedFile],
    ) -> Result<Vec<Attachment>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE messages
            SET name = ?, email = ?, subject = ?, body = ?, status = ?, is_draft = ?,
                scheduled_for = ?, sent_at = ?, updated_at = ?
            WHERE id = ? AND is_draft = 1
            "#,
        )
        .bind(&content.name)
        .bind(&content.email)
        .bind(&content.subject)
        .bind(&content.body)
        .bind(content.status)
        .bind(content.is_draft)
        .bind(content.scheduled_for)
        .bind(content.sent_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let existing = sqlx::query_as::<_, Attachment>(
            "SELECT * FROM attachments WHERE message_id = ?",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let (kept, dropped): (Vec<_>, Vec<_>) = existing
            .into_iter()
            .partition(|a| attachments.iter().any(|f| f.url == a.file_url));
        for attachment in &dropped {
            sqlx::query("DELETE FROM attachments WHERE id = ?")
                .bind(&attachment.id)
                .execute(&mut *tx)
                .await?;
        }
        let added: Vec<UploadedFile> = attachments
            .iter()
            .filter(|f| !kept.iter().any(|a| a.file_url == f.url))
            .cloned()
            .collect();
        insert_attachments(&mut tx, id, &added).await?;

        tx.commit().await?;
        Ok(dropped)
    }

    /// Marks a scheduled message delivered. A row that stopped being
    /// SCHEDULED in the meantime is left alone and false is returned.
    pub async fn mark_sent(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE messages SET status = ?, sent_at = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(MessageStatus::Sent)
        .bind(at)
        .bind(at)
        .bind(id)
        .bind(MessageStatus::Scheduled)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Turns a scheduled message back into a draft.
    pub async fn unschedule(&self, id: &str, status: MessageStatus, is_draft: bool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET status = ?, is_draft = ?, scheduled_for = NULL, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(status)
        .bind(is_draft)
        .bind(Utc::now())
        .bind(id)
        .bind(MessageStatus::Scheduled)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Scheduled messages whose time has come, at most `limit` of them.
    pub async fn due_messages(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE status = ? AND scheduled_for <= ?
            ORDER BY scheduled_for ASC
            LIMIT ?
            "#,
        )
        .bind(MessageStatus::Scheduled)
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Deletes a message; its attachment rows go with it.
    pub async fn delete_message(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_messages(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM messages WHERE 1=1");
        push_id_list(&mut qb, "id", ids);
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn trash_attachments(&self) -> Result<Vec<Attachment>> {
        let attachments = sqlx::query_as::<_, Attachment>(
            r#"
            SELECT a.* FROM attachments a
            JOIN messages m ON m.id = a.message_id
            WHERE m.status = ?
            "#,
        )
        .bind(MessageStatus::Trash)
        .fetch_all(&self.pool)
        .await?;
        Ok(attachments)
    }

    pub async fn delete_messages_by_status(&self, status: MessageStatus) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE status = ?")
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
