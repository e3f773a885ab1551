//! HTTP error responses.
//!
//! Every error body is `{"detail": "..."}`. Orchestrator failures are all
//! reported as `500` with the uniform [`XformError::detail`] message; only
//! problems with the request itself (unreadable multipart, no `file` field)
//! get a `4xx`.

use crate::error::XformError;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// The request never reached the orchestrator.
    BadRequest(String),
    PayloadTooLarge(String),
    /// The orchestrator failed; always a `500`.
    Conversion(XformError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Conversion(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::BadRequest(msg) | ApiError::PayloadTooLarge(msg) => msg.clone(),
            ApiError::Conversion(e) => e.detail(),
        }
    }
}

impl From<XformError> for ApiError {
    fn from(e: XformError) -> Self {
        ApiError::Conversion(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        let detail = format!("Failed to read multipart body: {}", e.body_text());
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(detail)
        } else {
            ApiError::BadRequest(detail)
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();

        match &self {
            ApiError::Conversion(e) => tracing::error!(error = %e, "Request failed"),
            _ => tracing::warn!(status = status.as_u16(), detail = %detail, "Rejected request"),
        }

        (status, Json(ErrorBody { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConverterError;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn conversion_failure_is_500_with_prefixed_detail() {
        let err: ApiError = XformError::from(ConverterError::Rejected {
            message: "Unknown question type 'txt'.".into(),
        })
        .into();
        let resp = err.into_response();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await["detail"],
            "Failed to convert XLS to XForm: Unknown question type 'txt'."
        );
    }

    #[tokio::test]
    async fn staging_failure_is_also_500() {
        let err: ApiError = XformError::InvalidFilename { name: "..".into() }.into();
        let resp = err.into_response();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body_json(resp).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Failed to convert XLS to XForm: "));
    }

    #[tokio::test]
    async fn bad_request_is_400() {
        let resp = ApiError::BadRequest("No file provided".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["detail"], "No file provided");
    }
}
