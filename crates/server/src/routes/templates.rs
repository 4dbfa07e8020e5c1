use axum::extract::State;
use shared::{Ack, ActionResponse, Data, TemplateInput, TemplateView};

use super::extract::{Json, Path};
use super::auth::AdminUser;
use crate::{error::AppError, state::AppState, validation::validate_template};

type TemplateResponse = Json<ActionResponse<Data<TemplateView>>>;

pub async fn list_templates(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ActionResponse<Data<Vec<TemplateView>>>>, AppError> {
    let templates = state.db.list_templates().await?;
    Ok(Json(ActionResponse::ok(Data {
        data: templates.into_iter().map(Into::into).collect(),
    })))
}

pub async fn create_template(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(input): Json<TemplateInput>,
) -> Result<TemplateResponse, AppError> {
    validate_template(&input)?;
    let template = state.db.create_template(&input, admin.id()).await?;
    tracing::info!("Created reply template {}", template.id);
    Ok(Json(ActionResponse::ok_with(
        "Template created",
        Data {
            data: template.into(),
        },
    )))
}

pub async fn update_template(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<TemplateInput>,
) -> Result<TemplateResponse, AppError> {
    validate_template(&input)?;
    let template = state
        .db
        .update_template(&id, &input)
        .await?
        .ok_or(AppError::NotFound("Template"))?;
    Ok(Json(ActionResponse::ok_with(
        "Template updated",
        Data {
            data: template.into(),
        },
    )))
}

pub async fn set_default(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    if !state.db.set_default_template(&id).await? {
        return Err(AppError::NotFound("Template"));
    }
    tracing::info!("Reply template {} is now the default", id);
    Ok(Json(Ack::done("Default template updated")))
}

pub async fn delete_template(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    if !state.db.delete_template(&id).await? {
        return Err(AppError::NotFound("Template"));
    }
    Ok(Json(Ack::done("Template deleted")))
}
