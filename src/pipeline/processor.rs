//! Single-document processing: the whole chain for one upload.
//!
//! detect format → open → segment → build record → evaluate.
//!
//! Synchronous and CPU-bound; the batch runner calls it from blocking
//! workers. The policy is injected, never read from global state.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::graduation::{evaluate, EvaluationError, GraduationCheck, RequirementPolicy};
use crate::models::Student;
use crate::pipeline::batch::error::DocumentError;
use crate::pipeline::extraction::{
    detect_format, open_document, DocumentFormat, UnreadableDocumentError,
};
use crate::pipeline::segmentation::{segment, SegmentWarning};
use crate::pipeline::structuring::{
    build_student, MissingDataWarning, UnparseableCourseError, ValidationWarning,
};

/// Diagnostics gathered while processing one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentReport {
    pub filename: String,
    pub format: DocumentFormat,
    pub mime_type: String,
    pub page_count: usize,
    pub pages_read: u32,
    pub fragment_count: usize,
    pub preamble_rows: usize,
    pub terminated_by_enrollment: bool,
    pub segment_warnings: Vec<SegmentWarning>,
    pub unparseable_courses: Vec<UnparseableCourseError>,
    pub missing_data: Vec<MissingDataWarning>,
    pub validation: Vec<ValidationWarning>,
    pub duration_ms: u64,
}

/// Output of a document that could be read.
///
/// The record is kept even when evaluation fails, so collective statistics
/// and `/extract-grades` still see it.
#[derive(Debug, Clone)]
pub struct ProcessedTranscript {
    pub student: Student,
    pub check: Result<GraduationCheck, EvaluationError>,
    pub report: DocumentReport,
}

impl ProcessedTranscript {
    /// Verdict, or the marker-bearing error when evaluation was impossible.
    pub fn verdict(&self) -> Result<&GraduationCheck, DocumentError> {
        self.check.as_ref().map_err(|e| DocumentError::from(e.clone()))
    }
}

/// Turns one upload into a processed transcript. The batch runner drives
/// documents through this seam.
pub trait TranscriptProcessor: Send + Sync {
    /// Only document-level failures are returned as errors; unreadable rows
    /// and missing figures are collected in the report.
    fn process(
        &self,
        filename: &str,
        bytes: &[u8],
        declared_mime: Option<&str>,
    ) -> Result<ProcessedTranscript, DocumentError>;

    fn policy(&self) -> &RequirementPolicy;
}

/// The full pipeline over an injected policy.
#[derive(Clone)]
pub struct DocumentProcessor {
    policy: Arc<RequirementPolicy>,
}

impl DocumentProcessor {
    pub fn new(policy: Arc<RequirementPolicy>) -> Self {
        Self { policy }
    }
}

impl TranscriptProcessor for DocumentProcessor {
    fn policy(&self) -> &RequirementPolicy {
        &self.policy
    }

    fn process(
        &self,
        filename: &str,
        bytes: &[u8],
        declared_mime: Option<&str>,
    ) -> Result<ProcessedTranscript, DocumentError> {
        let start = Instant::now();

        // 1. Format
        let detection = detect_format(bytes, filename, declared_mime);
        tracing::debug!(
            filename,
            format = detection.format.as_str(),
            mime = %detection.mime_type,
            size = bytes.len(),
            "Document format detected"
        );

        // 2. Open and segment
        let source = open_document(bytes, &detection)?;
        let page_count = source.page_count();
        let segmentation = segment(source.as_ref())?;
        if segmentation.fragment_count == 0 {
            return Err(UnreadableDocumentError::NoExtractableText.into());
        }

        // 3. Typed record
        let identifier = Student::identifier_from_filename(filename);
        let built = build_student(&identifier, segmentation.blocks);

        // 4. Verdict
        let check = evaluate(&self.policy, &built.student, &built.data_gaps());

        let report = DocumentReport {
            filename: filename.to_string(),
            format: detection.format,
            mime_type: detection.mime_type,
            page_count,
            pages_read: segmentation.pages_read,
            fragment_count: segmentation.fragment_count,
            preamble_rows: segmentation.preamble_rows,
            terminated_by_enrollment: segmentation.terminated_by_enrollment,
            segment_warnings: segmentation.warnings,
            unparseable_courses: built.unparseable,
            missing_data: built.missing,
            validation: built.validation,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        tracing::info!(
            filename,
            student = %built.student.identifier,
            grade_years = built.student.grade_years.len(),
            courses = built.student.course_count(),
            evaluated = check.is_ok(),
            duration_ms = report.duration_ms,
            "Document processed"
        );

        Ok(ProcessedTranscript {
            student: built.student,
            check,
            report,
        })
    }
}
