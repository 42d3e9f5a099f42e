//! Multi-transcript endpoints: per-student verdicts, batch runs and the
//! histogram chart.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, BatchQuery};
use crate::api::upload;
use crate::pipeline::batch::{
    render_histogram_png, BatchEntries, BatchMode, BatchOptions, BatchResult, CancelFlag,
    ProgressFn,
};

/// `POST /check-graduation`: `{ filename: { graduation_check } | { error } }`.
pub async fn check_graduation(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<BatchEntries>, ApiError> {
    let options = BatchQuery::default().into_options(BatchMode::Individual, &ctx.config)?;
    let result = run_upload(&ctx, multipart, options).await?;
    Ok(Json(result.results.unwrap_or_default()))
}

/// `POST /batch?mode=…`: the full `BatchResult`.
pub async fn run(
    State(ctx): State<ApiContext>,
    query: Result<Query<BatchQuery>, QueryRejection>,
    multipart: Multipart,
) -> Result<Json<BatchResult>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let options = query.into_options(BatchMode::Combined, &ctx.config)?;
    Ok(Json(run_upload(&ctx, multipart, options).await?))
}

/// `POST /chart`: PNG histogram of the collective statistics.
pub async fn chart(
    State(ctx): State<ApiContext>,
    query: Result<Query<BatchQuery>, QueryRejection>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut options = query.into_options(BatchMode::Collective, &ctx.config)?;
    options.mode = BatchMode::Collective;

    let result = run_upload(&ctx, multipart, options).await?;
    let statistics = result
        .statistics
        .ok_or_else(|| ApiError::Internal("collective run returned no statistics".into()))?;
    let png = render_histogram_png(&statistics)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// Read the upload and run it as one batch.
///
/// The batch is cancelled if the request future is dropped before it
/// finishes (client disconnect).
async fn run_upload(
    ctx: &ApiContext,
    mut multipart: Multipart,
    options: BatchOptions,
) -> Result<BatchResult, ApiError> {
    let documents =
        upload::read_documents(&mut multipart, &ctx.config, ctx.config.max_files_per_batch)
            .await?;

    let cancel = CancelFlag::new();
    let guard = cancel.guard();
    let result = ctx
        .runner
        .run(documents, &options, &cancel, Some(log_progress()))
        .await;
    guard.disarm();

    Ok(result)
}

fn log_progress() -> ProgressFn {
    Arc::new(|event| tracing::trace!(?event, "Batch progress"))
}
