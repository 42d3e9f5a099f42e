//! Per-document failures inside a batch.
//!
//! None of these abort the batch: each becomes the error marker of the one
//! document it concerns.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::graduation::EvaluationError;
use crate::pipeline::extraction::UnreadableDocumentError;

/// The batch deadline passed before this document finished.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Batch deadline of {}s passed before this document finished", deadline.as_secs())]
pub struct BatchTimeoutError {
    pub deadline: Duration,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error(transparent)]
    Unreadable(#[from] UnreadableDocumentError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Timeout(#[from] BatchTimeoutError),

    #[error("Batch was cancelled before this document was processed")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocumentError {
    /// Stable marker kind reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unreadable(_) => "unreadable_document",
            Self::Evaluation(EvaluationError::NoGradeYears) => "data_unavailable",
            Self::Evaluation(EvaluationError::UnsupportedEntryGrade(_)) => "policy_mismatch",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    pub fn marker(&self) -> ErrorMarker {
        ErrorMarker {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// JSON form of a failed entry: `{"kind": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMarker {
    pub kind: &'static str,
    pub message: String,
}
