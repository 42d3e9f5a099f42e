//! Shared request state and query types for the HTTP surface.

use std::sync::Arc;

use serde::Deserialize;

use crate::config::ServiceConfig;
use crate::graduation::RequirementPolicy;
use crate::pipeline::batch::{BatchMode, BatchOptions, BatchRunner, GpaSource, StatisticsFilter};
use crate::pipeline::processor::{DocumentProcessor, TranscriptProcessor};

use super::error::ApiError;

/// Upper bound on histogram bins a request may ask for.
const MAX_HISTOGRAM_BINS: usize = 200;

/// State shared by every handler.
///
/// The runner owns the worker pool; cloning the context shares it.
#[derive(Clone)]
pub struct ApiContext {
    pub runner: BatchRunner,
    pub config: Arc<ServiceConfig>,
}

impl ApiContext {
    pub fn new(policy: Arc<RequirementPolicy>, config: ServiceConfig) -> Self {
        let runner = BatchRunner::new(
            DocumentProcessor::new(policy),
            config.worker_count,
            config.batch_timeout,
        );
        Self {
            runner,
            config: Arc::new(config),
        }
    }

    pub fn policy(&self) -> &RequirementPolicy {
        self.runner.processor().policy()
    }
}

/// Query string of `/batch` and `/chart`.
///
/// Every field is optional; the service configuration supplies the rest.
#[derive(Debug, Default, Deserialize)]
pub struct BatchQuery {
    pub mode: Option<String>,
    pub gpa_source: Option<String>,
    pub academic_year: Option<String>,
    pub min_grade: Option<u8>,
    pub max_grade: Option<u8>,
    pub bins: Option<usize>,
}

impl BatchQuery {
    /// Resolve into runner options, falling back to `config`.
    pub fn into_options(
        self,
        default_mode: BatchMode,
        config: &ServiceConfig,
    ) -> Result<BatchOptions, ApiError> {
        let mode = match self.mode.as_deref() {
            Some(raw) => raw.parse::<BatchMode>().map_err(ApiError::BadRequest)?,
            None => default_mode,
        };
        let gpa_source = match self.gpa_source.as_deref() {
            Some(raw) => raw.parse::<GpaSource>().map_err(ApiError::BadRequest)?,
            None => config.gpa_source,
        };
        let histogram_bins = self.bins.unwrap_or(config.histogram_bins);
        if histogram_bins == 0 || histogram_bins > MAX_HISTOGRAM_BINS {
            return Err(ApiError::BadRequest(format!(
                "bins must be between 1 and {MAX_HISTOGRAM_BINS}"
            )));
        }
        if let (Some(min), Some(max)) = (self.min_grade, self.max_grade) {
            if min > max {
                return Err(ApiError::BadRequest(format!(
                    "min_grade {min} is above max_grade {max}"
                )));
            }
        }

        Ok(BatchOptions {
            mode,
            gpa_source,
            filter: StatisticsFilter {
                academic_year: self.academic_year.filter(|y| !y.trim().is_empty()),
                min_grade_level: self.min_grade,
                max_grade_level: self.max_grade,
            },
            histogram_bins,
        })
    }
}
