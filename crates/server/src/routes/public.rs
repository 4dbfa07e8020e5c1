//! Forms submitted from the public website. No sign-in; rate limited per
//! client address.

use axum::extract::State;
use shared::{Ack, ContactForm, QuoteForm};

use super::extract::Json;
use super::auth::ClientIp;
use crate::{
    db::NewMessage,
    error::AppError,
    notify::{self, Event},
    state::AppState,
    validation::{validate_contact, validate_quote_form},
};

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn submit_contact(
    State(state): State<AppState>,
    ip: ClientIp,
    Json(form): Json<ContactForm>,
) -> Result<Json<Ack>, AppError> {
    state.rate_limit(&ip)?;
    validate_contact(&form)?;

    let new = NewMessage::inbound(
        form.name.trim().to_string(),
        form.email.trim().to_string(),
        form.subject.trim().to_string(),
        form.message,
    );
    let message = state.db.create_message(&new, &[]).await?;
    tracing::info!("Contact message {} from {}", message.id, message.email);

    notify::notify_admins(&state, Event::Message(&message)).await;
    Ok(Json(Ack::done(
        "Thank you for your message. We will get back to you soon.",
    )))
}

pub async fn submit_quote(
    State(state): State<AppState>,
    ip: ClientIp,
    Json(form): Json<QuoteForm>,
) -> Result<Json<Ack>, AppError> {
    state.rate_limit(&ip)?;
    validate_quote_form(&form)?;

    let form = QuoteForm {
        name: form.name.trim().to_string(),
        email: form.email.trim().to_string(),
        phone: form.phone.trim().to_string(),
        company: trimmed(form.company),
        product_interest: trimmed(form.product_interest),
        quantity: trimmed(form.quantity),
        message: trimmed(form.message),
    };
    let quote = state.db.create_quote(&form).await?;
    tracing::info!("Quote request {} from {}", quote.id, quote.email);

    notify::notify_admins(&state, Event::Quote(&quote)).await;
    // A failed confirmation does not undo the request.
    let _ = notify::send_quote_confirmation(&state, &quote).await;

    Ok(Json(Ack::done(
        "Thank you for your quote request. We will contact you shortly.",
    )))
}
