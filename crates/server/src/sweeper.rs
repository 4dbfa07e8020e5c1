//! Scheduled delivery. A sweep picks up due SCHEDULED messages, hands each to
//! the transport and marks it SENT only once the transport accepted it, so a
//! failed message is simply picked up again by the next sweep.

use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::{message::check_deliverable, SweepFailure, SweepSummary};
use tokio::task::JoinHandle;

use crate::{
    db::Message,
    error::AppError,
    mailer::{MailAttachment, OutgoingMail},
    outbox::forwarded_attachments,
    state::AppState,
};

/// Hands one message to the transport, with its stored attachments and
/// through its author's SMTP account when they configured one.
pub async fn deliver(state: &AppState, message: &Message) -> Result<(), AppError> {
    let mut attachments = state.db.get_attachments(&message.id).await?;
    attachments.extend(
        forwarded_attachments(
            state,
            message.thread_id.as_deref(),
            message.parent_message_id.as_deref(),
        )
        .await?,
    );
    let account = state.smtp_account_for(message.user_id.as_deref()).await?;

    let mut mail = OutgoingMail::new(message.email.clone(), message.subject.clone(), message.body.clone());
    if !message.name.is_empty() {
        mail.to_name = Some(message.name.clone());
    }
    mail.attachments = attachments.into_iter().map(MailAttachment::from).collect();

    state.mailer.send(&mail, account.as_ref()).await?;
    Ok(())
}

/// Flags a delivered message SENT. A row that stopped being SCHEDULED while
/// its mail was out is left as it is.
async fn record_sent(state: &AppState, id: &str) -> Result<bool, AppError> {
    let recorded = state.db.mark_sent(id, Utc::now()).await?;
    if !recorded {
        tracing::warn!(message_id = %id, "Message left SCHEDULED while it was being sent");
    }
    Ok(recorded)
}

/// One pass over due messages. Returns `None` when another sweep is already
/// running in this process.
pub async fn run_sweep(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<Option<SweepSummary>> {
    let Ok(_guard) = state.sweep_lock.try_lock() else {
        tracing::debug!("Sweep already in progress, skipping");
        return Ok(None);
    };

    let due = state
        .db
        .due_messages(now, state.config.scheduler.batch_size)
        .await?;
    let mut summary = SweepSummary::default();

    for message in &due {
        let outcome = match deliver(state, message).await {
            Ok(()) => record_sent(state, &message.id).await.map(|_| ()).map_err(|e| {
                tracing::error!(message_id = %message.id, error = %e, "Sent mail not recorded");
                format!("sent but not recorded: {}", e)
            }),
            Err(e) => {
                tracing::error!(message_id = %message.id, error = %e, "Scheduled send failed");
                Err(e.to_string())
            }
        };
        match outcome {
            Ok(()) => summary.sent += 1,
            Err(error) => {
                summary.failed += 1;
                summary.errors.push(SweepFailure {
                    message_id: message.id.clone(),
                    error,
                });
            }
        }
    }

    tracing::info!(
        due = due.len(),
        sent = summary.sent,
        failed = summary.failed,
        errors = ?summary.errors,
        "Scheduled sweep finished"
    );
    Ok(Some(summary))
}

/// Sends a scheduled message immediately. On transport failure the message
/// stays SCHEDULED and the error is returned. The returned row is not SENT
/// when it was changed by someone else while the mail was out.
pub async fn send_now(state: &AppState, id: &str) -> Result<Message, AppError> {
    let _guard = state.sweep_lock.lock().await;

    let message = state
        .db
        .get_message(id)
        .await?
        .ok_or(AppError::NotFound("Message not found"))?;
    check_deliverable(message.status)?;

    deliver(state, &message).await?;
    if record_sent(state, &message.id).await? {
        tracing::info!("Sent scheduled message {} on request", message.id);
    }

    state
        .db
        .get_message(id)
        .await?
        .ok_or(AppError::NotFound("Message not found"))
}

/// Runs a sweep every `scheduler.interval_secs`.
pub fn spawn_ticker(state: AppState) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.scheduler.interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = run_sweep(&state, Utc::now()).await {
                tracing::error!("Scheduled sweep aborted: {:#}", e);
            }
        }
    })
}
