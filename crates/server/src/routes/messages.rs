use std::collections::HashMap;

use axum::{extract::State, http::header, response::IntoResponse};
use shared::{
    message::{batch_sources, check_cancellable, resolve_target},
    Ack, ActionResponse, Affected, BulkDelete, BulkStatusUpdate, ComposeRequest, Data,
    FolderCounts, ForwardRequest, MessageDetail, MessageListQuery, MessageStatus, MessageView,
    Page, ReplyRequest, ScheduleRequest, StatusUpdate,
};

use super::extract::{Json, Path, Query};
use super::auth::{AdminUser, ClientIp};
use crate::{
    db::Message,
    error::AppError,
    export,
    notify::escape_html,
    outbox::{self, prefixed, Outbound},
    state::AppState,
    sweeper,
    validation::{validate_compose, validate_forward, validate_reply},
};

type MessageResponse = Json<ActionResponse<Data<MessageView>>>;

fn parse_status(raw: &str) -> Result<MessageStatus, AppError> {
    raw.parse::<MessageStatus>()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

async fn find(state: &AppState, id: &str) -> Result<Message, AppError> {
    state
        .db
        .get_message(id)
        .await?
        .ok_or(AppError::NotFound("Message"))
}

async fn view(state: &AppState, message: Message) -> Result<MessageView, AppError> {
    let attachments = state.db.get_attachments(&message.id).await?;
    Ok(message.into_view(attachments))
}

/// Views for a page of messages, attachments fetched in one query.
async fn views(state: &AppState, messages: Vec<Message>) -> Result<Vec<MessageView>, AppError> {
    let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
    let mut by_message: HashMap<String, Vec<_>> = HashMap::new();
    for attachment in state.db.get_attachments_for(&ids).await? {
        by_message
            .entry(attachment.message_id.clone())
            .or_default()
            .push(attachment);
    }
    Ok(messages
        .into_iter()
        .map(|m| {
            let attachments = by_message.remove(&m.id).unwrap_or_default();
            m.into_view(attachments)
        })
        .collect())
}

fn respond(view: MessageView, message: &str) -> MessageResponse {
    Json(ActionResponse::ok_with(message, Data { data: view }))
}

pub async fn list_messages(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ActionResponse<Page<MessageView>>>, AppError> {
    let (messages, total) = state.db.get_contact_messages(&query, admin.id()).await?;
    let items = views(&state, messages).await?;
    let (page, limit, _) = crate::db::page_window(query.page, query.limit);
    Ok(Json(ActionResponse::ok(Page::new(items, total, page, limit))))
}

pub async fn counts(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Json<ActionResponse<FolderCounts>>, AppError> {
    let counts = state.db.folder_counts(admin.id()).await?;
    Ok(Json(ActionResponse::ok(counts)))
}

pub async fn get_message(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse<MessageDetail>>, AppError> {
    let message = find(&state, &id).await?;
    let thread = state.db.get_thread(message.thread_root(), &message.id).await?;
    let detail = MessageDetail {
        message: view(&state, message).await?,
        thread: views(&state, thread).await?,
    };
    Ok(Json(ActionResponse::ok(detail)))
}

pub async fn update_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate>,
) -> Result<MessageResponse, AppError> {
    let target = parse_status(&req.status)?;
    let message = find(&state, &id).await?;
    let next = resolve_target(target, message.status)?;

    if !state.db.set_message_status(&id, message.status, next).await? {
        return Err(AppError::BadRequest(
            "Message was changed by someone else, please refresh".to_string(),
        ));
    }
    tracing::info!("Message {}: {} -> {}", id, message.status, next);

    let updated = find(&state, &id).await?;
    Ok(respond(view(&state, updated).await?, "Message updated"))
}

pub async fn bulk_update_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<BulkStatusUpdate>,
) -> Result<Json<ActionResponse<Affected>>, AppError> {
    let target = parse_status(&req.status)?;
    let sources = batch_sources(target)?;
    let affected = state
        .db
        .update_message_status_many(&req.ids, target, &sources)
        .await?;
    tracing::info!("Moved {} of {} messages to {}", affected, req.ids.len(), target);
    Ok(Json(ActionResponse::ok_with(
        format!("{} messages updated", affected),
        Affected { affected },
    )))
}

pub async fn compose(
    State(state): State<AppState>,
    admin: AdminUser,
    ip: ClientIp,
    Json(req): Json<ComposeRequest>,
) -> Result<MessageResponse, AppError> {
    state.rate_limit(&ip)?;
    validate_compose(&req)?;
    let message = outbox::submit(&state, admin.id(), Outbound::from(req)).await?;
    let note = outcome_note(&message);
    Ok(respond(view(&state, message).await?, note))
}

pub async fn schedule(
    State(state): State<AppState>,
    admin: AdminUser,
    ip: ClientIp,
    Json(req): Json<ScheduleRequest>,
) -> Result<MessageResponse, AppError> {
    state.rate_limit(&ip)?;
    let mut payload = req.payload;
    payload.scheduled_for = Some(req.send_at);
    payload.save_as_draft = false;
    validate_compose(&payload)?;

    let message = outbox::submit(&state, admin.id(), Outbound::from(payload)).await?;
    Ok(respond(view(&state, message).await?, "Message scheduled"))
}

pub async fn update_draft(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(mut req): Json<ComposeRequest>,
) -> Result<MessageResponse, AppError> {
    req.draft_id = Some(id);
    validate_compose(&req)?;
    let message = outbox::submit(&state, admin.id(), Outbound::from(req)).await?;
    let note = outcome_note(&message);
    Ok(respond(view(&state, message).await?, note))
}

fn outcome_note(message: &Message) -> &'static str {
    if message.is_draft {
        "Draft saved"
    } else if message.status == MessageStatus::Scheduled {
        "Message scheduled"
    } else {
        "Message sent"
    }
}

pub async fn reply(
    State(state): State<AppState>,
    admin: AdminUser,
    ip: ClientIp,
    Path(id): Path<String>,
    Json(req): Json<ReplyRequest>,
) -> Result<MessageResponse, AppError> {
    state.rate_limit(&ip)?;
    validate_reply(&req)?;
    let parent = find(&state, &id).await?;

    let out = Outbound {
        name: parent.name.clone(),
        email: parent.email.clone(),
        subject: prefixed("Re: ", &parent.subject),
        body: req.body,
        attachments: req.attachments,
        scheduled_for: req.scheduled_for,
        thread_id: Some(parent.thread_root().to_string()),
        parent_message_id: Some(parent.id.clone()),
        ..Outbound::default()
    };
    let message = outbox::submit(&state, admin.id(), out).await?;
    let note = outcome_note(&message);
    Ok(respond(view(&state, message).await?, note))
}

pub async fn forward(
    State(state): State<AppState>,
    admin: AdminUser,
    ip: ClientIp,
    Path(id): Path<String>,
    Json(req): Json<ForwardRequest>,
) -> Result<MessageResponse, AppError> {
    state.rate_limit(&ip)?;
    validate_forward(&req)?;
    let original = find(&state, &id).await?;

    let body = format!(
        "{}<br><br>---------- Forwarded message ----------<br>\
         From: {} &lt;{}&gt;<br>Date: {}<br>Subject: {}<br><br>{}",
        escape_html(&req.note),
        escape_html(&original.name),
        escape_html(&original.email),
        original.created_at.format("%Y-%m-%d %H:%M UTC"),
        escape_html(&original.subject),
        original.body,
    );
    let out = Outbound {
        name: req.name.unwrap_or_default().trim().to_string(),
        email: req.email.trim().to_string(),
        subject: prefixed("Fwd: ", &original.subject),
        body,
        scheduled_for: req.scheduled_for,
        parent_message_id: Some(original.id.clone()),
        ..Outbound::default()
    };
    let message = outbox::submit(&state, admin.id(), out).await?;
    let note = outcome_note(&message);
    Ok(respond(view(&state, message).await?, note))
}

pub async fn cancel_schedule(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<MessageResponse, AppError> {
    let message = find(&state, &id).await?;
    let (status, is_draft) = check_cancellable(message.status)?;
    if !state.db.unschedule(&id, status, is_draft).await? {
        return Err(shared::TransitionError::NotScheduled.into());
    }
    tracing::info!("Cancelled schedule of message {}", id);

    let updated = find(&state, &id).await?;
    Ok(respond(view(&state, updated).await?, "Schedule cancelled, saved as draft"))
}

pub async fn send_now(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<MessageResponse, AppError> {
    let message = sweeper::send_now(&state, &id).await?;
    let note = if message.status == MessageStatus::Sent {
        "Message sent"
    } else {
        "Message sent, but it was changed meanwhile and is not marked as sent"
    };
    Ok(respond(view(&state, message).await?, note))
}

pub async fn delete_message(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    let message = find(&state, &id).await?;
    let attachments = state.db.get_attachments(&message.id).await?;
    outbox::discard_files(&state, admin.id(), &attachments).await;
    state.db.delete_message(&message.id).await?;
    tracing::info!("Permanently deleted message {}", message.id);
    Ok(Json(Ack::done("Message deleted")))
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<BulkDelete>,
) -> Result<Json<ActionResponse<Affected>>, AppError> {
    let attachments = state.db.get_attachments_for(&req.ids).await?;
    outbox::discard_files(&state, admin.id(), &attachments).await;
    let affected = state.db.delete_messages(&req.ids).await?;
    tracing::info!("Permanently deleted {} messages", affected);
    Ok(Json(ActionResponse::ok_with(
        format!("{} messages deleted", affected),
        Affected { affected },
    )))
}

pub async fn empty_trash(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Json<ActionResponse<Affected>>, AppError> {
    let attachments = state.db.trash_attachments().await?;
    outbox::discard_files(&state, admin.id(), &attachments).await;
    let affected = state.db.delete_messages_by_status(MessageStatus::Trash).await?;
    tracing::info!("Emptied trash: {} messages", affected);
    Ok(Json(ActionResponse::ok_with(
        "Trash emptied",
        Affected { affected },
    )))
}

pub async fn export_messages(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<MessageListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let messages = state.db.export_messages(&query, admin.id()).await?;
    let csv = export::messages_csv(&messages)?;
    Ok(csv_response(csv, "messages"))
}

pub(super) fn csv_response(body: String, kind: &str) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export::file_name(kind)),
            ),
        ],
        body,
    )
}
