use axum::extract::State;
use chrono::Utc;
use shared::{Ack, ActionResponse, Data, SettingsUpdate, SettingsView};

use super::extract::Json;
use super::auth::AuthUser;
use crate::{
    crypto::CryptoError,
    db::Settings,
    error::AppError,
    mailer::OutgoingMail,
    state::AppState,
    validation::validate_settings,
};

/// Absent leaves the field alone, empty clears it.
fn merge_optional(field: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        let value = value.trim();
        *field = (!value.is_empty()).then(|| value.to_string());
    }
}

fn merge_secret(
    state: &AppState,
    field: &mut Option<String>,
    value: Option<String>,
) -> Result<(), CryptoError> {
    if let Some(value) = value {
        *field = if value.is_empty() {
            None
        } else {
            Some(state.secrets.seal(&value)?)
        };
    }
    Ok(())
}

fn apply(state: &AppState, settings: &mut Settings, update: SettingsUpdate) -> Result<(), AppError> {
    let seal_failed = |e: CryptoError| AppError::Internal(e.to_string());

    if let Some(v) = update.company_name {
        settings.company_name = v.trim().to_string();
    }
    if let Some(v) = update.company_email {
        settings.company_email = v.trim().to_string();
    }
    if let Some(v) = update.company_phone {
        settings.company_phone = v.trim().to_string();
    }
    if let Some(v) = update.company_address {
        settings.company_address = v.trim().to_string();
    }
    merge_optional(&mut settings.logo_url, update.logo_url);
    merge_optional(&mut settings.smtp_host, update.smtp_host);
    if update.smtp_port.is_some() {
        settings.smtp_port = update.smtp_port;
    }
    merge_optional(&mut settings.smtp_username, update.smtp_username);
    merge_secret(state, &mut settings.smtp_password_enc, update.smtp_password).map_err(seal_failed)?;
    merge_optional(&mut settings.smtp_from_email, update.smtp_from_email);
    if let Some(v) = update.email_notifications {
        settings.email_notifications = v;
    }
    if let Some(v) = update.quote_notifications {
        settings.quote_notifications = v;
    }
    if let Some(v) = update.message_notifications {
        settings.message_notifications = v;
    }
    if let Some(v) = update.product_notifications {
        settings.product_notifications = v;
    }
    merge_optional(&mut settings.notification_email, update.notification_email);
    merge_optional(&mut settings.cloud_name, update.cloud_name);
    merge_optional(&mut settings.cloud_api_key, update.cloud_api_key);
    merge_secret(state, &mut settings.cloud_api_secret_enc, update.cloud_api_secret)
        .map_err(seal_failed)?;
    if update.session_timeout_minutes.is_some() {
        settings.session_timeout_minutes = update.session_timeout_minutes;
    }
    settings.updated_at = Utc::now();
    Ok(())
}

pub async fn get_settings(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ActionResponse<Data<SettingsView>>>, AppError> {
    let settings = state.db.get_user_settings(&user.id).await?;
    Ok(Json(ActionResponse::ok(Data {
        data: settings.into(),
    })))
}

pub async fn update_settings(
    State(state): State<AppState>,
    user: AuthUser,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<ActionResponse<Data<SettingsView>>>, AppError> {
    validate_settings(&update)?;
    let mut settings = state.db.get_user_settings(&user.id).await?;
    apply(&state, &mut settings, update)?;
    let saved = state.db.save_settings(&settings).await?;
    tracing::info!("Settings updated for {}", user.id);
    Ok(Json(ActionResponse::ok_with(
        "Settings saved",
        Data { data: saved.into() },
    )))
}

/// Sends a test email through the caller's configured transport.
pub async fn send_test_email(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Ack>, AppError> {
    let settings = state.db.get_user_settings(&user.id).await?;
    let account = state
        .db
        .get_user_by_id(&user.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    let to = settings
        .notification_email
        .clone()
        .filter(|e| !e.is_empty())
        .or_else(|| Some(settings.company_email.clone()).filter(|e| !e.is_empty()))
        .unwrap_or(account.email);

    let mail = OutgoingMail::new(
        to.clone(),
        "Test email",
        "<p>Your email settings are working.</p>",
    );
    let smtp = state.smtp_account(&settings);
    state.mailer.send(&mail, smtp.as_ref()).await?;
    tracing::info!("Test email sent to {}", to);
    Ok(Json(Ack::done(format!("Test email sent to {}", to))))
}
