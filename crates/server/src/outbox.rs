//! Outbound side of the message lifecycle: composing, replying, forwarding
//! and resubmitting drafts.

use chrono::Utc;
use shared::{
    message::check_resubmittable, ComposeRequest, DeliveryPlan, MessageType, UploadedFile,
};

use crate::{
    db::{Attachment, Message, MessageContent, NewMessage},
    error::AppError,
    mailer::{MailAttachment, OutgoingMail},
    state::AppState,
    storage::destroy_best_effort,
};

impl From<&UploadedFile> for MailAttachment {
    fn from(file: &UploadedFile) -> Self {
        Self {
            filename: file.filename.clone(),
            url: file.url.clone(),
            mime_type: file.mime_type.clone(),
        }
    }
}

impl From<Attachment> for MailAttachment {
    fn from(a: Attachment) -> Self {
        Self {
            filename: a.filename,
            url: a.file_url,
            mime_type: a.mime_type,
        }
    }
}

/// An outbound message as submitted by an admin.
#[derive(Debug, Clone, Default)]
pub struct Outbound {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<UploadedFile>,
    pub scheduled_for: Option<chrono::DateTime<Utc>>,
    pub save_as_draft: bool,
    /// Draft this submission replaces.
    pub draft_id: Option<String>,
    pub thread_id: Option<String>,
    pub parent_message_id: Option<String>,
}

impl From<ComposeRequest> for Outbound {
    fn from(req: ComposeRequest) -> Self {
        Self {
            name: req.name.unwrap_or_default().trim().to_string(),
            email: req.email.trim().to_string(),
            subject: req.subject,
            body: req.body,
            attachments: req.attachments,
            scheduled_for: req.scheduled_for,
            save_as_draft: req.save_as_draft,
            draft_id: req.draft_id,
            thread_id: None,
            parent_message_id: None,
        }
    }
}

/// `subject` with `prefix` in front, unless it already starts with it.
pub fn prefixed(prefix: &str, subject: &str) -> String {
    let subject = subject.trim();
    if subject
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    {
        subject.to_string()
    } else {
        format!("{}{}", prefix, subject)
    }
}

/// A message with a parent but no thread is a forward. The original's files
/// are sent along with it without being stored a second time.
pub async fn forwarded_attachments(
    state: &AppState,
    thread_id: Option<&str>,
    parent_message_id: Option<&str>,
) -> anyhow::Result<Vec<Attachment>> {
    match (thread_id, parent_message_id) {
        (None, Some(parent)) => state.db.get_attachments(parent).await,
        _ => Ok(Vec::new()),
    }
}

fn url_and_mime_type(a: &Attachment) -> (&str, &str) {
    (a.file_url.as_str(), a.mime_type.as_str())
}

/// Removes stored files of attachments that are gone. Failures are logged.
pub async fn discard_files(state: &AppState, user_id: &str, attachments: &[Attachment]) {
    if attachments.is_empty() {
        return;
    }
    let account = match state.cdn_account_for(user_id).await {
        Ok(account) => account,
        Err(e) => {
            tracing::warn!("Could not load storage account for {}: {}", user_id, e);
            None
        }
    };
    destroy_best_effort(
        state.storage.as_ref(),
        attachments
            .iter()
            .map(url_and_mime_type),
        account.as_ref(),
    )
    .await;
}

/// Sends, schedules or saves `out` on behalf of `user_id`.
///
/// Sending happens before anything is written: if the transport refuses the
/// message no row is created and an existing draft is left as it was.
pub async fn submit(state: &AppState, user_id: &str, out: Outbound) -> Result<Message, AppError> {
    let now = Utc::now();
    let plan = DeliveryPlan::choose(out.scheduled_for, out.save_as_draft, now)?;

    let draft = match &out.draft_id {
        Some(id) => {
            let draft = state
                .db
                .get_message(id)
                .await?
                .ok_or(AppError::NotFound("Draft"))?;
            check_resubmittable(draft.kind, draft.status, draft.is_draft)?;
            Some(draft)
        }
        None => None,
    };
    let thread_id = draft
        .as_ref()
        .map_or(out.thread_id.clone(), |d| d.thread_id.clone());
    let parent_message_id = draft
        .as_ref()
        .map_or(out.parent_message_id.clone(), |d| d.parent_message_id.clone());

    let (status, is_draft) = plan.outcome();
    let sent_at = match plan {
        DeliveryPlan::SendNow => {
            let mut mail = OutgoingMail::new(out.email.clone(), out.subject.clone(), out.body.clone());
            if !out.name.is_empty() {
                mail.to_name = Some(out.name.clone());
            }
            mail.attachments = out.attachments.iter().map(MailAttachment::from).collect();
            mail.attachments.extend(
                forwarded_attachments(state, thread_id.as_deref(), parent_message_id.as_deref())
                    .await?
                    .into_iter()
                    .map(MailAttachment::from),
            );
            let account = state.smtp_account_for(Some(user_id)).await?;
            state.mailer.send(&mail, account.as_ref()).await?;
            Some(now)
        }
        DeliveryPlan::Schedule(_) | DeliveryPlan::SaveDraft => None,
    };

    let message = match draft {
        Some(draft) => {
            let content = MessageContent {
                name: out.name,
                email: out.email,
                subject: out.subject,
                body: out.body,
                status,
                is_draft,
                scheduled_for: plan.scheduled_for(),
                sent_at,
            };
            let dropped = state
                .db
                .rewrite_draft(&draft.id, &content, &out.attachments)
                .await?;
            discard_files(state, user_id, &dropped).await;
            state
                .db
                .get_message(&draft.id)
                .await?
                .ok_or(AppError::NotFound("Draft"))?
        }
        None => {
            let new = NewMessage {
                name: out.name,
                email: out.email,
                subject: out.subject,
                body: out.body,
                kind: MessageType::Outbound,
                status,
                is_draft,
                scheduled_for: plan.scheduled_for(),
                sent_at,
                thread_id,
                parent_message_id,
                user_id: Some(user_id.to_string()),
            };
            state.db.create_message(&new, &out.attachments).await?
        }
    };

    match plan {
        DeliveryPlan::SendNow => tracing::info!("Sent message {} to {}", message.id, message.email),
        DeliveryPlan::Schedule(at) => {
            tracing::info!("Scheduled message {} for {}", message.id, at.to_rfc3339())
        }
        DeliveryPlan::SaveDraft => tracing::info!("Saved draft {}", message.id),
    }
    Ok(message)
}
