use axum::extract::State;
use shared::{ActionResponse, DashboardStats};

use super::extract::Json;
use super::auth::AdminUser;
use crate::{error::AppError, state::AppState};

pub async fn stats(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Json<ActionResponse<DashboardStats>>, AppError> {
    let messages = state.db.folder_counts(admin.id()).await?;
    let quotes = state.db.quote_status_counts().await?;
    Ok(Json(ActionResponse::ok(DashboardStats {
        unread_messages: messages.unread,
        unread_quotes: quotes.unread,
        scheduled_messages: messages.scheduled,
        products: state.db.count_products().await?,
    })))
}
