use chrono::{DateTime, Utc};
use shared::{
    AttachmentView, MessageStatus, MessageType, MessageView, ProductType, ProductView,
    QuoteReplyView, QuoteStatus, QuoteView, Role, SettingsView, TemplateView, UserView,
};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
    #[sqlx(rename = "message_type")]
    pub kind: MessageType,
    pub status: MessageStatus,
    pub is_draft: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub thread_id: Option<String>,
    pub parent_message_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn into_view(self, attachments: Vec<Attachment>) -> MessageView {
        MessageView {
            id: self.id,
            name: self.name,
            email: self.email,
            subject: self.subject,
            body: self.body,
            kind: self.kind,
            status: self.status,
            is_draft: self.is_draft,
            scheduled_for: self.scheduled_for,
            sent_at: self.sent_at,
            thread_id: self.thread_id,
            parent_message_id: self.parent_message_id,
            user_id: self.user_id,
            created_at: self.created_at,
            attachments: attachments.into_iter().map(Into::into).collect(),
        }
    }

    /// Root of the conversation this message belongs to.
    pub fn thread_root(&self) -> &str {
        self.thread_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Attachment {
    pub id: String,
    pub message_id: String,
    pub filename: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Attachment> for AttachmentView {
    fn from(a: Attachment) -> Self {
        Self {
            id: a.id,
            filename: a.filename,
            file_url: a.file_url,
            file_size: a.file_size,
            mime_type: a.mime_type,
            uploaded_at: a.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Quote {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: Option<String>,
    pub product_interest: Option<String>,
    pub quantity: Option<String>,
    pub message: Option<String>,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn into_view(self, replies: Vec<QuoteReply>) -> QuoteView {
        QuoteView {
            id: self.id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            product_interest: self.product_interest,
            quantity: self.quantity,
            message: self.message,
            status: self.status,
            created_at: self.created_at,
            replies: replies.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct QuoteReply {
    pub id: String,
    pub quote_id: String,
    pub user_id: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<QuoteReply> for QuoteReplyView {
    fn from(r: QuoteReply) -> Self {
        Self {
            id: r.id,
            quote_id: r.quote_id,
            user_id: r.user_id,
            subject: r.subject,
            body: r.body,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub product_type: ProductType,
    pub image_url: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductView {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            price: p.price,
            category: p.category,
            product_type: p.product_type,
            image_url: p.image_url,
            created_by: p.created_by,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Per-user settings row. Secret columns hold sealed ciphertext.
#[derive(Debug, Clone, FromRow)]
pub struct Settings {
    pub user_id: String,
    pub company_name: String,
    pub company_email: String,
    pub company_phone: String,
    pub company_address: String,
    pub logo_url: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i64>,
    pub smtp_username: Option<String>,
    pub smtp_password_enc: Option<String>,
    pub smtp_from_email: Option<String>,
    pub email_notifications: bool,
    pub quote_notifications: bool,
    pub message_notifications: bool,
    pub product_notifications: bool,
    pub notification_email: Option<String>,
    pub cloud_name: Option<String>,
    pub cloud_api_key: Option<String>,
    pub cloud_api_secret_enc: Option<String>,
    pub session_timeout_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Settings> for SettingsView {
    fn from(s: Settings) -> Self {
        Self {
            company_name: s.company_name,
            company_email: s.company_email,
            company_phone: s.company_phone,
            company_address: s.company_address,
            logo_url: s.logo_url,
            smtp_host: s.smtp_host,
            smtp_port: s.smtp_port,
            smtp_username: s.smtp_username,
            smtp_from_email: s.smtp_from_email,
            has_smtp_password: s.smtp_password_enc.is_some(),
            email_notifications: s.email_notifications,
            quote_notifications: s.quote_notifications,
            message_notifications: s.message_notifications,
            product_notifications: s.product_notifications,
            notification_email: s.notification_email,
            cloud_name: s.cloud_name,
            cloud_api_key: s.cloud_api_key,
            has_cloud_api_secret: s.cloud_api_secret_enc.is_some(),
            session_timeout_minutes: s.session_timeout_minutes,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ReplyTemplate {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub is_default: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReplyTemplate> for TemplateView {
    fn from(t: ReplyTemplate) -> Self {
        Self {
            id: t.id,
            name: t.name,
            subject: t.subject,
            body: t.body,
            is_default: t.is_default,
            created_at: t.created_at,
        }
    }
}
