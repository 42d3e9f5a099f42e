//! Single-transcript extraction.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Serialize, Serializer};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::api::upload;
use crate::models::Student;
use crate::pipeline::batch::{BatchEntry, DocumentError};
use crate::pipeline::processor::{DocumentReport, ProcessedTranscript};

/// Serialized straight to the body so the verdict keeps its written key order.
#[derive(Serialize)]
pub struct ExtractResponse {
    #[serde(rename = "grades", serialize_with = "grades_of")]
    pub student: Student,
    /// `graduation_check` or `error`.
    #[serde(flatten)]
    pub verdict: BatchEntry,
    pub diagnostics: DocumentReport,
}

fn grades_of<S: Serializer>(student: &Student, serializer: S) -> Result<S::Ok, S::Error> {
    student.grades_view().serialize(serializer)
}

/// `POST /extract-grades`: one `file`, returns the parsed record, its
/// verdict and the extraction diagnostics.
///
/// An unreadable document fails the request; a readable one that cannot be
/// evaluated still returns its grades with an error marker.
pub async fn extract(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let document = upload::read_single(&mut multipart, &ctx.config).await?;
    let filename = document.filename.clone();

    let ProcessedTranscript {
        student,
        check,
        report,
    } = ctx.runner.process_single(document).await?;

    let verdict = match check {
        Ok(check) => BatchEntry::Check(check),
        Err(err) => BatchEntry::Failed(DocumentError::from(err).marker()),
    };
    tracing::info!(
        filename = %filename,
        years = student.grade_years.len(),
        courses = student.course_count(),
        evaluated = verdict.is_ok(),
        duration_ms = report.duration_ms,
        "Transcript extracted"
    );

    Ok(Json(ExtractResponse {
        student,
        verdict,
        diagnostics: report,
    }))
}
