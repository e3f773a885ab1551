//! Route handlers.

use super::error::ApiError;
use crate::convert::ConversionService;
use crate::error::XformError;
use crate::pipeline::upload::Upload;
use axum::body::Body;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{Html, IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

/// Name of the multipart field carrying the spreadsheet.
pub const FILE_FIELD: &str = "file";

const INDEX_HTML: &str = include_str!("../../assets/index.html");

/// `GET /`
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// `POST /xls/to/xform`
///
/// Responds with the converted XForm as an `application/xml` attachment
/// named after the uploaded form, e.g. `survey.xlsx` → `survey.xml`.
pub async fn xls_to_xform(
    State(service): State<Arc<ConversionService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let upload = extract_upload(multipart?).await?;
    debug!(
        file = upload.file_name(),
        size_bytes = upload.len(),
        "Received upload"
    );

    let form = service.handle_upload_and_convert(upload).await?;
    let disposition = format!("attachment; filename=\"{}\"", form.file_name());
    let stream = form.into_stream().await.map_err(|e| {
        XformError::Internal(format!("could not open converted form: {e}"))
    })?;

    Ok((
        [
            (CONTENT_TYPE, "application/xml".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Read exactly one `file` field. Other fields are skipped.
async fn extract_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        if upload.is_some() {
            return Err(ApiError::BadRequest(format!(
                "Multiple '{FILE_FIELD}' fields are not allowed; send exactly one"
            )));
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::BadRequest(format!("Field '{FILE_FIELD}' must be a file upload"))
            })?;
        let content = field.bytes().await?;
        upload = Some(Upload::new(file_name, content));
    }

    upload.ok_or_else(|| ApiError::BadRequest(format!("No '{FILE_FIELD}' field provided")))
}
