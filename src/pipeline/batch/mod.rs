//! Batch evaluation of many transcripts in one request.
//!
//! Individual mode returns one verdict per document, collective mode one
//! statistical summary, combined mode both from the same run.

pub mod chart;
pub mod error;
pub mod runner;
pub mod statistics;
pub mod types;

pub use chart::{render_histogram_png, ChartError};
pub use error::{BatchTimeoutError, DocumentError, ErrorMarker};
pub use runner::{BatchOptions, BatchRunner, CancelFlag, CancelOnDrop, ProgressFn};
pub use statistics::{AggregateStatistics, GpaSource, HistogramBucket, StatisticsFilter};
pub use types::*;
