use axum::extract::{Multipart, State};
use shared::{ActionResponse, UploadedFile};

use super::extract::Json;
use super::auth::AdminUser;
use crate::{error::AppError, state::AppState, storage::FileUpload};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Stores the `file` field of a multipart form.
pub async fn upload(
    State(state): State<AppState>,
    admin: AdminUser,
    mut multipart: Multipart,
) -> Result<Json<ActionResponse<UploadedFile>>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::BadRequest("File name is missing".to_string()))?;
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest("File is empty".to_string()));
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::BadRequest("File is larger than 10 MB".to_string()));
        }

        let account = state.cdn_account_for(admin.id()).await?;
        let stored = state
            .storage
            .upload(
                FileUpload {
                    filename,
                    mime_type,
                    bytes: bytes.to_vec(),
                },
                account.as_ref(),
            )
            .await?;
        tracing::info!("Stored upload {} ({} bytes)", stored.url, stored.size);
        return Ok(Json(ActionResponse::ok_with("File uploaded", stored)));
    }
    Err(AppError::BadRequest("No file provided".to_string()))
}
