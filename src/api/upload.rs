//! Multipart upload reading with request-level validation.
//!
//! Limits and the format pre-check run while fields are read, so a
//! malformed request is rejected before any document reaches a worker.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;

use crate::config::ServiceConfig;
use crate::pipeline::batch::BatchDocument;
use crate::pipeline::extraction::detect_format;

use super::error::ApiError;

/// Field carrying the one document of `/extract-grades`.
pub const SINGLE_FIELD: &str = "file";
/// Repeated field carrying batch documents.
pub const BATCH_FIELD: &str = "files";

/// Read every `file`/`files` field of the request, in upload order.
///
/// Other fields are skipped. At most `max_files` documents are accepted.
pub async fn read_documents(
    multipart: &mut Multipart,
    config: &ServiceConfig,
    max_files: usize,
) -> Result<Vec<BatchDocument>, ApiError> {
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, config))?
    {
        let name = field.name().unwrap_or("");
        if name != SINGLE_FIELD && name != BATCH_FIELD {
            tracing::debug!(field = name, "Skipping non-file multipart field");
            continue;
        }
        if documents.len() == max_files {
            return Err(ApiError::TooManyFiles { limit: max_files });
        }
        documents.push(read_field(field, config).await?);
    }

    if documents.is_empty() {
        return Err(ApiError::NoFile);
    }
    tracing::debug!(documents = documents.len(), "Upload received");
    Ok(documents)
}

/// Read exactly one document; extra files are refused.
pub async fn read_single(
    multipart: &mut Multipart,
    config: &ServiceConfig,
) -> Result<BatchDocument, ApiError> {
    let mut documents = read_documents(multipart, config, 1).await?;
    documents.pop().ok_or(ApiError::NoFile)
}

async fn read_field(mut field: Field<'_>, config: &ServiceConfig) -> Result<BatchDocument, ApiError> {
    let filename = field
        .file_name()
        .map(str::trim)
        .unwrap_or("")
        .to_string();
    if filename.is_empty() {
        return Err(ApiError::NoSelectedFile);
    }
    let declared_mime = field.content_type().map(str::to_string);

    // Stop reading as soon as the file outgrows its limit.
    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, config))?
    {
        if bytes.len() + chunk.len() > config.max_file_bytes {
            return Err(ApiError::FileTooLarge {
                filename,
                limit: config.max_file_bytes,
            });
        }
        bytes.extend_from_slice(&chunk);
    }

    let detection = detect_format(&bytes, &filename, declared_mime.as_deref());
    if !detection.format.is_supported() {
        return Err(ApiError::UnsupportedMediaType {
            filename,
            mime: detection.mime_type,
        });
    }

    Ok(BatchDocument {
        filename,
        bytes,
        declared_mime,
    })
}

fn multipart_error(err: MultipartError, config: &ServiceConfig) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::RequestTooLarge {
            limit: config.max_request_bytes,
        }
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
