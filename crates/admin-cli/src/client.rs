//! JSON client for the back-office API. Every response is an action
//! envelope; a `success: false` envelope becomes [`ApiError::Rejected`].

use std::path::Path;

use reqwest::{multipart, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{ActionStatus, FieldErrors, UploadedFile};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Rejected {
        status: StatusCode,
        message: String,
        errors: Option<FieldErrors>,
    },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Could not read file: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Rejected { errors, .. } => errors.as_ref(),
            _ => None,
        }
    }
}

/// Successful envelope: its message plus the payload spread into it.
#[derive(Debug, Clone)]
pub struct Reply<T> {
    pub message: Option<String>,
    pub data: T,
}

/// Splits an envelope into its status and payload.
pub fn decode<T: DeserializeOwned>(status: StatusCode, value: Value) -> Result<Reply<T>, ApiError> {
    let envelope: ActionStatus = serde_json::from_value(value.clone())?;
    if !envelope.success {
        return Err(ApiError::Rejected {
            status,
            message: envelope
                .message
                .unwrap_or_else(|| status.to_string()),
            errors: envelope.errors,
        });
    }
    Ok(Reply {
        message: envelope.message,
        data: serde_json::from_value(value)?,
    })
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(server: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: server.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn server(&self) -> &str {
        &self.base
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn call<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Reply<T>, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => decode(status, value),
            Err(_) if !status.is_success() => Err(ApiError::Rejected {
                status,
                message: status.to_string(),
                errors: None,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Reply<T>, ApiError> {
        self.call(self.request(Method::GET, path)).await
    }

    pub async fn get_query<T, Q>(&self, path: &str, query: &Q) -> Result<Reply<T>, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.call(self.request(Method::GET, path).query(query)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<Reply<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(self.request(Method::POST, path).json(body)).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<Reply<T>, ApiError> {
        self.call(self.request(Method::POST, path)).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<Reply<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<Reply<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(self.request(Method::PATCH, path).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Reply<T>, ApiError> {
        self.call(self.request(Method::DELETE, path)).await
    }

    /// Uploads a local file as the `file` field of a multipart form.
    pub async fn upload(&self, path: &Path) -> Result<Reply<UploadedFile>, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let part = multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str(guess_mime(path))?;
        let form = multipart::Form::new().part("file", part);
        self.call(self.request(Method::POST, "/api/uploads").multipart(form))
            .await
    }

    /// Raw body of a non-JSON download such as a CSV export.
    pub async fn download<Q>(&self, path: &str, query: &Q) -> Result<String, ApiError>
    where
        Q: Serialize + ?Sized,
    {
        let response = self.request(Method::GET, path).query(query).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return Ok(text);
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => decode::<Value>(status, value).map(|_| text),
            Err(_) => Err(ApiError::Rejected {
                status,
                message: status.to_string(),
                errors: None,
            }),
        }
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "csv" => "text/csv",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::{Affected, NoData};

    #[test]
    fn test_decode_spread_payload() {
        let reply: Reply<Affected> = decode(
            StatusCode::OK,
            json!({ "success": true, "message": "3 messages updated", "affected": 3 }),
        )
        .unwrap();
        assert_eq!(reply.data.affected, 3);
        assert_eq!(reply.message.as_deref(), Some("3 messages updated"));
    }

    #[test]
    fn test_decode_failure_keeps_field_errors() {
        let err = decode::<NoData>(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "success": false,
                "message": "Validation failed",
                "errors": { "email": ["Invalid email address"] }
            }),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Validation failed");
        assert!(err.field_errors().is_some());
        match err {
            ApiError::Rejected { status, .. } => assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_failure_without_message_uses_status() {
        let err = decode::<NoData>(StatusCode::FORBIDDEN, json!({ "success": false })).unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("spec.PDF")), "application/pdf");
        assert_eq!(guess_mime(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("Makefile")), "application/octet-stream");
    }

    #[test]
    fn test_trailing_slash_is_dropped() {
        let client = ApiClient::new("http://localhost:8080/", None);
        assert_eq!(client.server(), "http://localhost:8080");
    }
}
