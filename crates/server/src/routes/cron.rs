use axum::extract::State;
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use shared::{ActionResponse, SweepSummary};

use super::extract::Json;
use super::auth::AdminUser;
use crate::{error::AppError, state::AppState, sweeper};

type SweepResponse = Json<ActionResponse<SweepSummary>>;

async fn sweep(state: &AppState) -> Result<SweepResponse, AppError> {
    match sweeper::run_sweep(state, Utc::now()).await? {
        Some(summary) => Ok(Json(ActionResponse::ok_with(
            format!("{} sent, {} failed", summary.sent, summary.failed),
            summary,
        ))),
        None => Ok(Json(ActionResponse::done("A sweep is already running"))),
    }
}

/// Trigger for an external scheduler, authorised by the shared cron secret.
pub async fn send_scheduled(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<SweepResponse, AppError> {
    let expected = state.config.scheduler.cron_secret.as_str();
    if expected.is_empty() {
        return Err(AppError::Forbidden("Cron trigger is not configured".to_string()));
    }
    match auth {
        Some(TypedHeader(Authorization(bearer))) if bearer.token() == expected => {}
        _ => return Err(AppError::AuthError("Invalid cron secret".to_string())),
    }
    sweep(&state).await
}

/// Same sweep, started by a signed-in administrator.
pub async fn sweep_now(State(state): State<AppState>, _admin: AdminUser) -> Result<SweepResponse, AppError> {
    sweep(&state).await
}
