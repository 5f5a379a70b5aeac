//! Request extractors whose rejections answer with the JSON envelope.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ApiError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(format!("Invalid query: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(format!("Invalid path: {}", rejection.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Validation(format!("Invalid upload: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use crate::api::tests::{body_json, send, test_state, token_for};
    use crate::models::UserRole;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    async fn assert_envelope(response: axum::response::Response, prefix: &str) {
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["statusCode"], 400);
        assert!(body["data"].is_null());
        let message = body["message"].as_str().unwrap();
        assert!(message.starts_with(prefix), "unexpected message: {}", message);
    }

    #[tokio::test]
    async fn missing_body_field_answers_with_envelope() {
        let state = test_state();
        let token = token_for(&state, UserRole::Manager, None).await;

        let response = send(
            &state,
            Method::POST,
            "/api/announcements",
            Some(&token),
            Some(json!({ "title": "x", "message": "y" })),
        )
        .await;

        assert_envelope(response, "Invalid request body:").await;
    }

    #[tokio::test]
    async fn unknown_enum_value_answers_with_envelope() {
        let state = test_state();
        let token = token_for(&state, UserRole::Manager, None).await;

        let response = send(
            &state,
            Method::POST,
            "/api/announcements",
            Some(&token),
            Some(json!({ "title": "x", "message": "y", "targetType": "EVERYONE" })),
        )
        .await;

        assert_envelope(response, "Invalid request body:").await;
    }

    #[tokio::test]
    async fn malformed_uuid_answers_with_envelope() {
        let state = test_state();
        let token = token_for(&state, UserRole::Accountant, None).await;

        let response = send(
            &state,
            Method::GET,
            "/api/v1/accounting/invoices/not-a-uuid",
            Some(&token),
            None,
        )
        .await;

        assert_envelope(response, "Invalid path:").await;
    }

    #[tokio::test]
    async fn malformed_query_answers_with_envelope() {
        let state = test_state();
        let token = token_for(&state, UserRole::Accountant, None).await;

        let response = send(
            &state,
            Method::GET,
            "/api/v1/accounting/invoices?month=eleven",
            Some(&token),
            None,
        )
        .await;

        assert_envelope(response, "Invalid query:").await;
    }
}
