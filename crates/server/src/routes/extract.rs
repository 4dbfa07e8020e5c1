//! Drop-in `Json`, `Query` and `Path` extractors. A body or query string
//! that does not deserialize is rejected with a failure envelope; a missing
//! field is reported against that field.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    response::{IntoResponse, Response},
};
use serde::Serialize;
use shared::FieldErrors;

use crate::error::AppError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

/// Strips axum's prefix and serde_json's position suffix from a rejection.
fn serde_detail(body_text: &str) -> &str {
    let detail = body_text
        .split_once(": ")
        .map_or(body_text, |(_, rest)| rest);
    detail.split(" at line ").next().unwrap_or(detail)
}

fn missing_field(detail: &str) -> Option<&str> {
    detail
        .strip_prefix("missing field `")?
        .split('`')
        .next()
        .filter(|field| !field.is_empty())
}

fn label(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

fn schema_error(what: &str, body_text: &str) -> AppError {
    let detail = serde_detail(body_text);
    match missing_field(detail) {
        Some(field) => {
            let mut errors = FieldErrors::new();
            errors.add(field, format!("{} is required", label(field)));
            AppError::Validation(errors)
        }
        None => AppError::BadRequest(format!("Invalid {}: {}", what, detail)),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => schema_error("request body", &err.body_text()),
            JsonRejection::JsonSyntaxError(_) => {
                AppError::BadRequest("Request body is not valid JSON".into())
            }
            JsonRejection::MissingJsonContentType(_) => {
                AppError::BadRequest("Expected a JSON request body".into())
            }
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        schema_error("query", &rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_becomes_field_error() {
        let err = schema_error(
            "request body",
            "Failed to deserialize the JSON body into the target type: missing field `product_interest` at line 1 column 42",
        );
        match err {
            AppError::Validation(errors) => {
                assert_eq!(
                    errors.get("product_interest").unwrap()[0],
                    "Product interest is required"
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_other_schema_errors_are_bad_requests() {
        let err = schema_error(
            "query",
            "Failed to deserialize query string: unknown variant `spam`, expected one of `inbox`, `sent`",
        );
        match err {
            AppError::BadRequest(message) => {
                assert!(message.starts_with("Invalid query: unknown variant `spam`"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
