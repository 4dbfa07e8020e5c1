use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::{QuoteCounts, QuoteForm, QuoteStatus, SortOrder};
use sqlx::{QueryBuilder, Sqlite};

use super::{
    new_id, order_clause, page_window, push_date_range, push_search, Database, Quote, QuoteReply,
};

const SEARCH_COLUMNS: &[&str] = &["name", "email", "phone", "company", "product_interest", "message"];

/// Listing filters for quotes, with the status already parsed.
#[derive(Debug, Clone, Default)]
pub struct QuoteFilter {
    pub page: u32,
    pub limit: u32,
    pub status: Option<QuoteStatus>,
    pub sort_by: SortOrder,
    pub search: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &QuoteFilter) {
    match filter.status {
        Some(status) => {
            qb.push(" AND status = ").push_bind(status);
        }
        None => {
            qb.push(" AND status NOT IN (")
                .push_bind(QuoteStatus::Archived)
                .push(", ")
                .push_bind(QuoteStatus::Trash)
                .push(")");
        }
    }
    push_search(qb, SEARCH_COLUMNS, filter.search.as_deref());
    push_date_range(qb, filter.date_from, filter.date_to);
}

impl Database {
    pub async fn create_quote(&self, form: &QuoteForm) -> Result<Quote> {
        let id = new_id();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO quotes (id, name, email, phone, company, product_interest, quantity,
                                message, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&form.name)
        .bind(&form.email)
        .bind(&form.phone)
        .bind(&form.company)
        .bind(&form.product_interest)
        .bind(&form.quantity)
        .bind(&form.message)
        .bind(QuoteStatus::default())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_quote(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("quote {} vanished after insert", id))
    }

    pub async fn get_quote(&self, id: &str) -> Result<Option<Quote>> {
        let quote = sqlx::query_as::<_, Quote>("SELECT * FROM quotes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(quote)
    }

    pub async fn get_quote_replies(&self, quote_id: &str) -> Result<Vec<QuoteReply>> {
        let replies = sqlx::query_as::<_, QuoteReply>(
            "SELECT * FROM quote_replies WHERE quote_id = ? ORDER BY created_at ASC",
        )
        .bind(quote_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(replies)
    }

    pub async fn get_quotes(&self, filter: &QuoteFilter) -> Result<(Vec<Quote>, u64)> {
        let (_, limit, offset) = page_window(filter.page, filter.limit);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM quotes WHERE 1=1");
        push_filters(&mut count, filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM quotes WHERE 1=1");
        push_filters(&mut select, filter);
        select.push(order_clause(filter.sort_by));
        select
            .push(" LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(offset);
        let quotes = select.build_query_as::<Quote>().fetch_all(&self.pool).await?;

        Ok((quotes, total.max(0) as u64))
    }

    pub async fn export_quotes(&self, filter: &QuoteFilter) -> Result<Vec<Quote>> {
        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM quotes WHERE 1=1");
        push_filters(&mut select, filter);
        select.push(order_clause(filter.sort_by));
        let quotes = select.build_query_as::<Quote>().fetch_all(&self.pool).await?;
        Ok(quotes)
    }

    pub async fn quote_status_counts(&self) -> Result<QuoteCounts> {
        let rows: Vec<(QuoteStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM quotes GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = QuoteCounts::default();
        for (status, n) in rows {
            let n = n.max(0) as u64;
            if status.visible_in(None) {
                counts.all += n;
            }
            match status {
                QuoteStatus::Unread => counts.unread = n,
                QuoteStatus::Read => counts.read = n,
                QuoteStatus::Pending => counts.pending = n,
                QuoteStatus::Processed => counts.processed = n,
                QuoteStatus::Responded => counts.responded = n,
                QuoteStatus::Archived => counts.archived = n,
                QuoteStatus::Trash => counts.trash = n,
            }
        }
        Ok(counts)
    }

    pub async fn set_quote_status(&self, id: &str, status: QuoteStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE quotes SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_quote_status_many(&self, ids: &[String], status: QuoteStatus) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE quotes SET status = ");
        qb.push_bind(status)
            .push(", updated_at = ")
            .push_bind(Utc::now())
            .push(" WHERE id IN (");
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(id.clone());
        }
        list.push_unseparated(")");
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Records a reply and marks the quote RESPONDED in one transaction.
    pub async fn reply_to_quote(
        &self,
        quote_id: &str,
        user_id: &str,
        subject: &str,
        body: &str,
    ) -> Result<QuoteReply> {
        let id = new_id();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO quote_replies (id, quote_id, user_id, subject, body, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(quote_id)
        .bind(user_id)
        .bind(subject)
        .bind(body)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE quotes SET status = ?, updated_at = ? WHERE id = ?")
            .bind(QuoteStatus::Responded)
            .bind(now)
            .bind(quote_id)
            .execute(&mut *tx)
            .await?;

        let reply = sqlx::query_as::<_, QuoteReply>("SELECT * FROM quote_replies WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(reply)
    }

    pub async fn delete_quote(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM quotes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_quotes_by_status(&self, status: QuoteStatus) -> Result<u64> {
        let result = sqlx::query("DELETE FROM quotes WHERE status = ?")
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
