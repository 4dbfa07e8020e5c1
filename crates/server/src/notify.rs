//! Notification gateway. All notification mail is routed through here so the
//! per-user toggles are honoured in one place. Nothing in this module returns
//! an error the caller has to propagate: failures come back as a
//! [`NotifyFailure`] reason and are logged.

use serde::Serialize;

use crate::{
    db::{Message, Product, Quote, Settings},
    mailer::OutgoingMail,
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyFailure {
    NotificationsDisabled,
    SendFailed,
}

/// Something an admin may be told about.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    Quote(&'a Quote),
    Message(&'a Message),
    Product(&'a Product),
}

impl Event<'_> {
    /// Master toggle and the category toggle must both be on.
    fn enabled(&self, settings: &Settings) -> bool {
        settings.email_notifications
            && match self {
                Event::Quote(_) => settings.quote_notifications,
                Event::Message(_) => settings.message_notifications,
                Event::Product(_) => settings.product_notifications,
            }
    }

    fn render(&self, company: &str) -> (String, String) {
        match self {
            Event::Quote(q) => (
                format!("New quote request from {}", q.name),
                format!(
                    "<h2>New quote request</h2>\
                     <p><strong>Name:</strong> {}</p>\
                     <p><strong>Email:</strong> {}</p>\
                     <p><strong>Phone:</strong> {}</p>\
                     <p><strong>Company:</strong> {}</p>\
                     <p><strong>Product interest:</strong> {}</p>\
                     <p><strong>Quantity:</strong> {}</p>\
                     <p><strong>Message:</strong></p><p>{}</p>{}",
                    escape_html(&q.name),
                    escape_html(&q.email),
                    escape_html(&q.phone),
                    escape_html(q.company.as_deref().unwrap_or("-")),
                    escape_html(q.product_interest.as_deref().unwrap_or("-")),
                    escape_html(q.quantity.as_deref().unwrap_or("-")),
                    escape_html(q.message.as_deref().unwrap_or("")),
                    footer(company),
                ),
            ),
            Event::Message(m) => (
                format!("New message: {}", display_subject(&m.subject)),
                format!(
                    "<h2>New contact message</h2>\
                     <p><strong>From:</strong> {} &lt;{}&gt;</p>\
                     <p><strong>Subject:</strong> {}</p>\
                     <p>{}</p>{}",
                    escape_html(&m.name),
                    escape_html(&m.email),
                    escape_html(display_subject(&m.subject)),
                    escape_html(&m.body),
                    footer(company),
                ),
            ),
            Event::Product(p) => (
                format!("Product added: {}", p.name),
                format!(
                    "<h2>New product</h2>\
                     <p><strong>Name:</strong> {}</p>\
                     <p><strong>Category:</strong> {}</p>\
                     <p><strong>Type:</strong> {}</p>\
                     <p><strong>Price:</strong> {:.2}</p>{}",
                    escape_html(&p.name),
                    escape_html(&p.category),
                    p.product_type,
                    p.price,
                    footer(company),
                ),
            ),
        }
    }
}

fn display_subject(subject: &str) -> &str {
    if subject.trim().is_empty() {
        "(no subject)"
    } else {
        subject
    }
}

fn footer(company: &str) -> String {
    if company.is_empty() {
        String::new()
    } else {
        format!("<hr><p><small>{}</small></p>", escape_html(company))
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            _ => out.push(c),
        }
    }
    out
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Where a user's notifications go: the dedicated address, else the company
/// address, else the account's own email.
fn recipient(settings: &Settings, account_email: &str) -> String {
    non_empty(settings.notification_email.as_deref())
        .or_else(|| non_empty(Some(&settings.company_email)))
        .unwrap_or(account_email)
        .to_string()
}

/// Tells `user_id` about `event` if their settings allow it.
pub async fn send_notification(
    state: &AppState,
    user_id: &str,
    event: Event<'_>,
) -> Result<(), NotifyFailure> {
    let settings = match state.db.get_user_settings(user_id).await {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load settings for {}: {}", user_id, e);
            return Err(NotifyFailure::SendFailed);
        }
    };
    if !event.enabled(&settings) {
        tracing::debug!("Notifications disabled for {}", user_id);
        return Err(NotifyFailure::NotificationsDisabled);
    }

    let account_email = match state.db.get_user_by_id(user_id).await {
        Ok(Some(user)) => user.email,
        Ok(None) => {
            tracing::warn!("Notification for unknown user {}", user_id);
            return Err(NotifyFailure::SendFailed);
        }
        Err(e) => {
            tracing::error!("Failed to load user {}: {}", user_id, e);
            return Err(NotifyFailure::SendFailed);
        }
    };

    let (subject, html) = event.render(&settings.company_name);
    let mail = OutgoingMail::new(recipient(&settings, &account_email), subject, html);
    let account = state.smtp_account(&settings);
    match state.mailer.send(&mail, account.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("Notification to {} failed: {}", mail.to, e);
            Err(NotifyFailure::SendFailed)
        }
    }
}

pub async fn send_quote_notification(
    state: &AppState,
    user_id: &str,
    quote: &Quote,
) -> Result<(), NotifyFailure> {
    send_notification(state, user_id, Event::Quote(quote)).await
}

pub async fn send_message_notification(
    state: &AppState,
    user_id: &str,
    message: &Message,
) -> Result<(), NotifyFailure> {
    send_notification(state, user_id, Event::Message(message)).await
}

pub async fn send_product_notification(
    state: &AppState,
    user_id: &str,
    product: &Product,
) -> Result<(), NotifyFailure> {
    send_notification(state, user_id, Event::Product(product)).await
}

/// Notifies every administrator. Returns how many notifications went out.
pub async fn notify_admins(state: &AppState, event: Event<'_>) -> usize {
    let admins = match state.db.admin_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!("Failed to list administrators: {}", e);
            return 0;
        }
    };
    let mut delivered = 0;
    for admin in admins {
        if send_notification(state, &admin, event).await.is_ok() {
            delivered += 1;
        }
    }
    delivered
}

/// Acknowledges a quote request to the customer. Sent regardless of any
/// admin's notification settings.
pub async fn send_quote_confirmation(state: &AppState, quote: &Quote) -> Result<(), NotifyFailure> {
    let mut mail = OutgoingMail::new(
        quote.email.clone(),
        "We received your quote request",
        format!(
            "<p>Dear {},</p>\
             <p>Thank you for your interest{}. Our sales team will review your request \
             and get back to you shortly.</p>\
             <p>Quantity: {}</p>",
            escape_html(&quote.name),
            quote
                .product_interest
                .as_deref()
                .map(|p| format!(" in {}", escape_html(p)))
                .unwrap_or_default(),
            escape_html(quote.quantity.as_deref().unwrap_or("-")),
        ),
    );
    mail.to_name = Some(quote.name.clone());

    match state.mailer.send(&mail, None).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("Quote confirmation to {} failed: {}", quote.email, e);
            Err(NotifyFailure::SendFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::test_app;
    use shared::{ProductInput, ProductType, QuoteForm};

    fn john() -> QuoteForm {
        QuoteForm {
            name: "John Doe".into(),
            email: "john@x.com".into(),
            phone: "555".into(),
            product_interest: Some("beef".into()),
            quantity: Some("10kg".into()),
            ..QuoteForm::default()
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>\"Tom\" & 'Jerry'</b>"),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_failure_reasons_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(NotifyFailure::NotificationsDisabled).unwrap(),
            "notifications_disabled"
        );
        assert_eq!(serde_json::to_value(NotifyFailure::SendFailed).unwrap(), "send_failed");
    }

    #[tokio::test]
    async fn test_quote_notification_honours_toggles() {
        let app = test_app().await;
        let admin = app.state.db.create_user("admin@example.com", "h", None).await.unwrap();
        let quote = app.state.db.create_quote(&john()).await.unwrap();

        let mut settings = app.state.db.get_user_settings(&admin.id).await.unwrap();
        settings.quote_notifications = false;
        app.state.db.save_settings(&settings).await.unwrap();

        let result = send_quote_notification(&app.state, &admin.id, &quote).await;
        assert_eq!(result, Err(NotifyFailure::NotificationsDisabled));
        assert!(app.mailer.sent().is_empty());

        settings.quote_notifications = true;
        settings.email_notifications = false;
        app.state.db.save_settings(&settings).await.unwrap();
        let result = send_quote_notification(&app.state, &admin.id, &quote).await;
        assert_eq!(result, Err(NotifyFailure::NotificationsDisabled));
        assert!(app.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_notification_goes_to_configured_address() {
        let app = test_app().await;
        let admin = app.state.db.create_user("admin@example.com", "h", None).await.unwrap();
        let mut settings = app.state.db.get_user_settings(&admin.id).await.unwrap();
        settings.company_email = "office@example.com".into();
        app.state.db.save_settings(&settings).await.unwrap();

        let message = app
            .state
            .db
            .create_message(
                &crate::db::NewMessage::inbound(
                    "Jane".into(),
                    "jane@example.com".into(),
                    "".into(),
                    "<script>".into(),
                ),
                &[],
            )
            .await
            .unwrap();
        send_message_notification(&app.state, &admin.id, &message).await.unwrap();

        let sent = app.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "office@example.com");
        assert_eq!(sent[0].subject, "New message: (no subject)");
        assert!(sent[0].html.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_not_raised() {
        let app = test_app().await;
        let admin = app.state.db.create_user("admin@example.com", "h", None).await.unwrap();
        let quote = app.state.db.create_quote(&john()).await.unwrap();
        app.mailer.fail_for("admin@example.com");

        let result = send_quote_notification(&app.state, &admin.id, &quote).await;
        assert_eq!(result, Err(NotifyFailure::SendFailed));
    }

    #[tokio::test]
    async fn test_product_notifications_are_off_by_default() {
        let app = test_app().await;
        let admin = app.state.db.create_user("admin@example.com", "h", None).await.unwrap();
        let product = app
            .state
            .db
            .create_product(
                &ProductInput {
                    name: "Lamb rack".into(),
                    description: String::new(),
                    price: 21.5,
                    category: "Lamb".into(),
                    product_type: ProductType::Frozen,
                    image_url: None,
                },
                &admin.id,
            )
            .await
            .unwrap();

        let result = send_product_notification(&app.state, &admin.id, &product).await;
        assert_eq!(result, Err(NotifyFailure::NotificationsDisabled));
    }

    #[tokio::test]
    async fn test_quote_form_flow_notifies_admin_and_confirms_customer() {
        let app = test_app().await;
        let admin = app.state.db.create_user("admin@example.com", "h", None).await.unwrap();
        app.state.db.create_user("staff@example.com", "h", None).await.unwrap();

        let quote = app.state.db.create_quote(&john()).await.unwrap();
        assert_eq!(quote.status, shared::QuoteStatus::Unread);

        assert_eq!(notify_admins(&app.state, Event::Quote(&quote)).await, 1);
        send_quote_confirmation(&app.state, &quote).await.unwrap();

        let sent = app.mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "admin@example.com");
        assert!(sent[0].html.contains("10kg"));
        assert_eq!(sent[1].to, "john@x.com");

        // Confirmation does not depend on the admin's toggles.
        let mut settings = app.state.db.get_user_settings(&admin.id).await.unwrap();
        settings.email_notifications = false;
        app.state.db.save_settings(&settings).await.unwrap();
        assert_eq!(notify_admins(&app.state, Event::Quote(&quote)).await, 0);
        send_quote_confirmation(&app.state, &quote).await.unwrap();
        assert_eq!(app.mailer.sent().len(), 3);
    }
}
