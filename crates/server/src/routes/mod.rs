use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::StorageBackend;
use crate::state::AppState;

pub mod auth;
mod cron;
mod dashboard;
mod extract;
mod health;
mod messages;
mod products;
mod public;
mod quotes;
mod settings;
mod templates;
mod uploads;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/password", post(auth::change_password))
        // Public website forms
        .route("/api/contact", post(public::submit_contact))
        .route("/api/quote", post(public::submit_quote))
        // Messages
        .route("/api/messages", get(messages::list_messages))
        .route("/api/messages/counts", get(messages::counts))
        .route("/api/messages/export", get(messages::export_messages))
        .route("/api/messages/compose", post(messages::compose))
        .route("/api/messages/schedule", post(messages::schedule))
        .route("/api/messages/bulk-status", post(messages::bulk_update_status))
        .route("/api/messages/bulk-delete", post(messages::bulk_delete))
        .route("/api/messages/trash", delete(messages::empty_trash))
        .route("/api/messages/sweep", post(cron::sweep_now))
        .route(
            "/api/messages/:id",
            get(messages::get_message)
                .put(messages::update_draft)
                .delete(messages::delete_message),
        )
        .route("/api/messages/:id/status", patch(messages::update_status))
        .route("/api/messages/:id/reply", post(messages::reply))
        .route("/api/messages/:id/forward", post(messages::forward))
        .route("/api/messages/:id/cancel", post(messages::cancel_schedule))
        .route("/api/messages/:id/send-now", post(messages::send_now))
        // Quotes
        .route("/api/quotes", get(quotes::list_quotes))
        .route("/api/quotes/counts", get(quotes::counts))
        .route("/api/quotes/export", get(quotes::export_quotes))
        .route("/api/quotes/bulk-status", post(quotes::bulk_update_status))
        .route("/api/quotes/trash", delete(quotes::empty_trash))
        .route("/api/quotes/:id", get(quotes::get_quote).delete(quotes::delete_quote))
        .route("/api/quotes/:id/status", patch(quotes::update_status))
        .route("/api/quotes/:id/reply", post(quotes::reply))
        // Products
        .route(
            "/api/products",
            get(products::list_products).post(products::create_product),
        )
        .route("/api/products/categories", get(products::categories))
        .route(
            "/api/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        // Settings & templates
        .route(
            "/api/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/api/settings/test-email", post(settings::send_test_email))
        .route(
            "/api/templates",
            get(templates::list_templates).post(templates::create_template),
        )
        .route(
            "/api/templates/:id",
            axum::routing::put(templates::update_template).delete(templates::delete_template),
        )
        .route("/api/templates/:id/default", post(templates::set_default))
        // Uploads
        .route(
            "/api/uploads",
            post(uploads::upload).layer(DefaultBodyLimit::max(uploads::MAX_UPLOAD_BYTES + 64 * 1024)),
        )
        // Dashboard & scheduler
        .route("/api/dashboard", get(dashboard::stats))
        .route("/api/cron/send-scheduled", post(cron::send_scheduled));

    if state.config.storage.backend == StorageBackend::Local {
        router = router.nest_service("/uploads", ServeDir::new(&state.config.storage.local_dir));
    }

    router
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{test_app, TestApp};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use shared::MessageStatus;
    use tower::ServiceExt;

    async fn call(
        app: &TestApp,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = create_router(app.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn register(app: &TestApp, email: &str) -> String {
        let (status, json) = call(
            app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": email, "password": "correct horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        json["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let app = test_app().await;
        let token = register(&app, "Owner@Example.com").await;

        let (status, json) = call(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["email"], "owner@example.com");
        assert_eq!(json["data"]["role"], "ADMIN");

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "owner@example.com", "password": "wrong password" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_admin_routes_need_admin_role() {
        let app = test_app().await;
        register(&app, "owner@example.com").await;
        let staff = register(&app, "staff@example.com").await;

        let (status, _) = call(&app, Method::GET, "/api/messages", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) = call(&app, Method::GET, "/api/messages", Some(&staff), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["message"], "Admin access required");
    }

    #[tokio::test]
    async fn test_contact_form_lands_in_inbox() {
        let app = test_app().await;
        let admin = register(&app, "owner@example.com").await;

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/contact",
            None,
            Some(json!({ "name": "Jane", "email": "jane@example.com", "message": "Do you ship to Dubai?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", json);

        let (_, json) = call(&app, Method::GET, "/api/messages?status=inbox", Some(&admin), None).await;
        assert_eq!(json["total"], 1);
        assert_eq!(json["items"][0]["status"], "UNREAD");
        assert_eq!(json["items"][0]["type"], "INBOUND");
        // Default settings have message notifications on.
        assert_eq!(app.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_contact_form_validation_errors() {
        let app = test_app().await;
        let (status, json) = call(
            &app,
            Method::POST,
            "/api/contact",
            None,
            Some(json!({ "name": "", "email": "nope", "message": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["errors"]["name"].is_array());
        assert!(json["errors"]["email"].is_array());
        assert!(json["errors"]["message"].is_array());
    }

    #[tokio::test]
    async fn test_malformed_input_gets_failure_envelope() {
        let app = test_app().await;
        let admin = register(&app, "owner@example.com").await;

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/quote",
            None,
            Some(json!({ "name": "John Doe", "email": "john@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["success"], false);
        assert_eq!(json["errors"]["phone"][0], "Phone is required");

        let (status, json) = call(&app, Method::GET, "/api/messages?status=spam", Some(&admin), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert!(json["message"].as_str().unwrap().contains("spam"));

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/messages/bulk-status",
            Some(&admin),
            Some(json!({ "ids": "x", "status": "READ" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_public_forms_are_rate_limited() {
        let app = test_app().await;
        let form = json!({ "name": "John Doe", "email": "john@x.com", "phone": "555" });
        let limit = app.state.config.rate_limit.max_requests;
        for _ in 0..limit {
            let (status, _) = call(&app, Method::POST, "/api/quote", None, Some(form.clone())).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, json) = call(&app, Method::POST, "/api/quote", None, Some(form)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_archive_then_unarchive_returns_to_read() {
        let app = test_app().await;
        let admin = register(&app, "owner@example.com").await;
        call(
            &app,
            Method::POST,
            "/api/contact",
            None,
            Some(json!({ "name": "Jane", "email": "jane@example.com", "message": "Hi" })),
        )
        .await;
        let (_, list) = call(&app, Method::GET, "/api/messages", Some(&admin), None).await;
        let id = list["items"][0]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/messages/{}/status", id);

        let (status, json) = call(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "status": "ARCHIVED" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "ARCHIVED");

        let (_, json) = call(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "status": "READ" }))).await;
        assert_eq!(json["data"]["status"], "READ");

        let (status, _) = call(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "status": "SENT" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = call(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "status": "BOGUS" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_schedule_cancel_and_cron_sweep() {
        let app = test_app().await;
        let admin = register(&app, "owner@example.com").await;

        let send_at = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let (status, json) = call(
            &app,
            Method::POST,
            "/api/messages/schedule",
            Some(&admin),
            Some(json!({
                "email": "buyer@example.com",
                "subject": "Offer",
                "body": "<p>Prices</p>",
                "send_at": send_at,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        assert_eq!(json["data"]["status"], "SCHEDULED");
        let id = json["data"]["id"].as_str().unwrap().to_string();

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/cron/send-scheduled",
            Some("cron-secret"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sent"], 0);

        let (status, _) = call(&app, Method::POST, "/api/cron/send-scheduled", Some("guess"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) = call(
            &app,
            Method::POST,
            &format!("/api/messages/{}/cancel", id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["is_draft"], true);
        assert_eq!(json["data"]["status"], "READ");
        let message = app.state.db.get_message(&id).await.unwrap().unwrap();
        assert_ne!(message.status, MessageStatus::Scheduled);
        assert!(message.scheduled_for.is_none());
    }

    #[tokio::test]
    async fn test_restored_scheduled_message_returns_to_drafts() {
        let app = test_app().await;
        let admin = register(&app, "owner@example.com").await;

        let send_at = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let (_, json) = call(
            &app,
            Method::POST,
            "/api/messages/schedule",
            Some(&admin),
            Some(json!({
                "email": "buyer@example.com",
                "subject": "Offer",
                "body": "<p>Prices</p>",
                "send_at": send_at,
            })),
        )
        .await;
        let id = json["data"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/messages/{}/status", id);

        let (status, _) = call(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "status": "TRASH" }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, json) = call(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "status": "READ" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "READ");
        assert_eq!(json["data"]["is_draft"], true);
        assert!(json["data"]["scheduled_for"].is_null());

        let (_, sent) = call(&app, Method::GET, "/api/messages?status=sent", Some(&admin), None).await;
        assert_eq!(sent["total"], 0);
        let (_, drafts) = call(&app, Method::GET, "/api/messages?status=drafts", Some(&admin), None).await;
        assert_eq!(drafts["total"], 1);
        assert!(app.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_empty_trash_cleans_storage() {
        let app = test_app().await;
        let admin = register(&app, "owner@example.com").await;
        let (_, json) = call(
            &app,
            Method::POST,
            "/api/messages/compose",
            Some(&admin),
            Some(json!({
                "email": "buyer@example.com",
                "subject": "Specs",
                "body": "<p>Attached</p>",
                "attachments": [{
                    "url": "https://cdn.test/raw/upload/v1/backoffice/spec.pdf",
                    "filename": "spec.pdf",
                    "size": 100,
                    "mime_type": "application/pdf"
                }]
            })),
        )
        .await;
        let id = json["data"]["id"].as_str().unwrap().to_string();

        call(
            &app,
            Method::POST,
            "/api/messages/bulk-status",
            Some(&admin),
            Some(json!({ "ids": [id], "status": "TRASH" })),
        )
        .await;
        let (status, json) = call(&app, Method::DELETE, "/api/messages/trash", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["affected"], 1);
        assert_eq!(app.storage.destroyed().len(), 1);
    }

    #[tokio::test]
    async fn test_quote_reply_with_default_template() {
        let app = test_app().await;
        let admin = register(&app, "owner@example.com").await;
        call(
            &app,
            Method::POST,
            "/api/templates",
            Some(&admin),
            Some(json!({ "name": "Standard", "subject": "Your quote", "body": "<p>$12/kg</p>", "is_default": true })),
        )
        .await;
        call(
            &app,
            Method::POST,
            "/api/quote",
            None,
            Some(json!({ "name": "John Doe", "email": "john@x.com", "phone": "555" })),
        )
        .await;
        let (_, list) = call(&app, Method::GET, "/api/quotes", Some(&admin), None).await;
        let id = list["items"][0]["id"].as_str().unwrap().to_string();

        let (status, json) = call(
            &app,
            Method::POST,
            &format!("/api/quotes/{}/reply", id),
            Some(&admin),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        assert_eq!(json["data"]["status"], "RESPONDED");
        assert_eq!(json["data"]["replies"][0]["subject"], "Your quote");
        let last = app.mailer.sent().pop().unwrap();
        assert_eq!(last.to, "john@x.com");
    }

    #[tokio::test]
    async fn test_quote_reply_not_recorded_when_mail_fails() {
        let app = test_app().await;
        let admin = register(&app, "owner@example.com").await;
        let quote = app
            .state
            .db
            .create_quote(&shared::QuoteForm {
                name: "John Doe".into(),
                email: "john@x.com".into(),
                phone: "555".into(),
                ..shared::QuoteForm::default()
            })
            .await
            .unwrap();
        app.mailer.fail_for("john@x.com");

        let (status, json) = call(
            &app,
            Method::POST,
            &format!("/api/quotes/{}/reply", quote.id),
            Some(&admin),
            Some(json!({ "subject": "Quote", "body": "<p>$12/kg</p>" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["success"], false);
        assert!(app.state.db.get_quote_replies(&quote.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_is_csv() {
        let app = test_app().await;
        let admin = register(&app, "owner@example.com").await;
        let request = Request::builder()
            .uri("/api/quotes/export")
            .header(header::AUTHORIZATION, format!("Bearer {}", admin))
            .body(Body::empty())
            .unwrap();
        let response = create_router(app.state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(bytes.to_vec()).unwrap().starts_with("Name,Email,Phone"));
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let app = test_app().await;
        let admin = register(&app, "owner@example.com").await;
        call(
            &app,
            Method::POST,
            "/api/quote",
            None,
            Some(json!({ "name": "John Doe", "email": "john@x.com", "phone": "555" })),
        )
        .await;
        let (status, json) = call(&app, Method::GET, "/api/dashboard", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["unread_quotes"], 1);
        assert_eq!(json["unread_messages"], 0);
    }
}
