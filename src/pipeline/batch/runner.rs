//! Batch orchestration: fan one request's documents out over the shared
//! worker pool and fold the outcomes into an ordered `BatchResult`.
//!
//! Each document is processed on a blocking worker gated by a semaphore.
//! A failing document only ever affects its own entry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::pipeline::processor::{ProcessedTranscript, TranscriptProcessor};

use super::error::{BatchTimeoutError, DocumentError};
use super::statistics::{build_statistics, GpaSource, StatisticsFilter};
use super::types::*;

/// Receives status events as a batch progresses.
pub type ProgressFn = Arc<dyn Fn(BatchStatusEvent) + Send + Sync>;

/// Shared cancellation flag for one batch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// A guard that cancels the batch when dropped, e.g. when the request
    /// future is dropped on client disconnect.
    pub fn guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            flag: self.clone(),
            armed: true,
        }
    }
}

pub struct CancelOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl CancelOnDrop {
    /// The batch completed; dropping the guard no longer cancels.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.cancel();
        }
    }
}

/// Per-request knobs.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub mode: BatchMode,
    pub gpa_source: GpaSource,
    pub filter: StatisticsFilter,
    pub histogram_bins: usize,
}

/// Runs batches on a worker pool shared by every request.
#[derive(Clone)]
pub struct BatchRunner {
    processor: Arc<dyn TranscriptProcessor>,
    workers: Arc<Semaphore>,
    deadline: Duration,
}

type Outcome = Result<ProcessedTranscript, DocumentError>;

impl BatchRunner {
    pub fn new(
        processor: impl TranscriptProcessor + 'static,
        worker_count: usize,
        deadline: Duration,
    ) -> Self {
        Self {
            processor: Arc::new(processor),
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
            deadline,
        }
    }

    pub fn processor(&self) -> &dyn TranscriptProcessor {
        self.processor.as_ref()
    }

    /// Process one document on the shared pool, under the same deadline as
    /// a batch.
    pub async fn process_single(
        &self,
        document: BatchDocument,
    ) -> Result<ProcessedTranscript, DocumentError> {
        let name = document.filename.clone();
        let work = process_one(
            self.processor.clone(),
            self.workers.clone(),
            CancelFlag::new(),
            None,
            Uuid::new_v4(),
            name,
            document,
        );
        tokio::time::timeout(self.deadline, work)
            .await
            .map_err(|_| {
                DocumentError::from(BatchTimeoutError {
                    deadline: self.deadline,
                })
            })?
    }

    /// Process every document and assemble the result for `options.mode`.
    ///
    /// Documents still running at the deadline get timeout markers; the
    /// ones already finished are kept.
    pub async fn run(
        &self,
        documents: Vec<BatchDocument>,
        options: &BatchOptions,
        cancel: &CancelFlag,
        progress: Option<ProgressFn>,
    ) -> BatchResult {
        let batch_id = Uuid::new_v4();
        let start = Instant::now();
        let emit = |event: BatchStatusEvent| {
            if let Some(progress) = &progress {
                progress(event);
            }
        };

        let names = disambiguate(documents.iter().map(|d| d.filename.as_str()));
        let total = documents.len();
        tracing::info!(%batch_id, documents = total, mode = options.mode.as_str(), "Batch started");
        emit(BatchStatusEvent::Started {
            batch_id,
            document_count: total,
        });

        let mut outcomes: Vec<Option<Outcome>> = (0..total).map(|_| None).collect();
        let mut set = JoinSet::new();

        for (index, document) in documents.into_iter().enumerate() {
            emit(BatchStatusEvent::Stage {
                batch_id,
                filename: names[index].clone(),
                stage: DocumentStage::Received,
            });

            let processor = self.processor.clone();
            let workers = self.workers.clone();
            let cancel = cancel.clone();
            let progress = progress.clone();
            let name = names[index].clone();

            set.spawn(async move {
                let outcome =
                    process_one(processor, workers, cancel, progress, batch_id, name, document)
                        .await;
                (index, outcome)
            });
        }

        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut timed_out = false;
        while !set.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((index, outcome)))) => {
                    emit(BatchStatusEvent::Stage {
                        batch_id,
                        filename: names[index].clone(),
                        stage: DocumentStage::Aggregating,
                    });
                    outcomes[index] = Some(outcome);
                }
                Ok(Some(Err(join_error))) => {
                    // The task's index is lost with it; the slot is filled below.
                    tracing::error!(%batch_id, error = %join_error, "Batch task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }
        if timed_out {
            set.abort_all();
        }

        let unfinished = outcomes.iter().filter(|o| o.is_none()).count();
        if timed_out {
            tracing::warn!(%batch_id, unfinished, deadline_secs = self.deadline.as_secs(), "Batch deadline reached");
            emit(BatchStatusEvent::TimedOut {
                batch_id,
                unfinished,
            });
        }
        let cancelled = cancel.is_cancelled();
        if cancelled {
            tracing::warn!(%batch_id, "Batch cancelled");
            emit(BatchStatusEvent::Cancelled { batch_id });
        }

        let outcomes: Vec<Outcome> = outcomes
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(if timed_out {
                        BatchTimeoutError {
                            deadline: self.deadline,
                        }
                        .into()
                    } else {
                        DocumentError::Internal("worker task ended without a result".into())
                    })
                })
            })
            .collect();

        let result = assemble(batch_id, names, outcomes, options, timed_out, cancelled, &emit);

        let succeeded = result.results.as_ref().map_or(0, BatchEntries::succeeded);
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(%batch_id, documents = total, duration_ms, timed_out, "Batch finished");
        emit(BatchStatusEvent::Completed {
            batch_id,
            succeeded,
            failed: result.results.as_ref().map_or(0, |r| r.len() - succeeded),
            duration_ms,
        });

        result
    }
}

async fn process_one(
    processor: Arc<dyn TranscriptProcessor>,
    workers: Arc<Semaphore>,
    cancel: CancelFlag,
    progress: Option<ProgressFn>,
    batch_id: Uuid,
    name: String,
    document: BatchDocument,
) -> Outcome {
    if cancel.is_cancelled() {
        return Err(DocumentError::Cancelled);
    }
    let permit = workers
        .acquire_owned()
        .await
        .map_err(|_| DocumentError::Internal("worker pool closed".into()))?;
    // Re-check: cancellation may have happened while queued.
    if cancel.is_cancelled() {
        return Err(DocumentError::Cancelled);
    }

    if let Some(progress) = &progress {
        progress(BatchStatusEvent::Stage {
            batch_id,
            filename: name,
            stage: DocumentStage::Extracting,
        });
    }

    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        processor.process(
            &document.filename,
            &document.bytes,
            document.declared_mime.as_deref(),
        )
    })
    .await
    .map_err(|e| DocumentError::Internal(format!("document worker failed: {e}")))?
}

/// Fold outcomes into the shape `options.mode` asks for.
fn assemble(
    batch_id: Uuid,
    names: Vec<String>,
    outcomes: Vec<Outcome>,
    options: &BatchOptions,
    timed_out: bool,
    cancelled: bool,
    emit: &dyn Fn(BatchStatusEvent),
) -> BatchResult {
    let failed = outcomes.iter().filter(|o| o.is_err()).count();

    let statistics = options.mode.wants_statistics().then(|| {
        build_statistics(
            outcomes.iter().filter_map(|o| o.as_ref().ok()).map(|t| &t.student),
            failed,
            options.gpa_source,
            &options.filter,
            options.histogram_bins,
        )
    });

    let mut entries = Vec::with_capacity(outcomes.len());
    for (name, outcome) in names.into_iter().zip(outcomes) {
        let entry = match outcome.and_then(|t| t.check.map_err(DocumentError::from)) {
            Ok(check) => BatchEntry::Check(check),
            Err(err) => {
                tracing::warn!(%batch_id, filename = %name, kind = err.kind(), error = %err, "Document failed");
                BatchEntry::Failed(err.marker())
            }
        };
        emit(BatchStatusEvent::Stage {
            batch_id,
            filename: name.clone(),
            stage: DocumentStage::Done,
        });
        entries.push((name, entry));
    }

    BatchResult {
        batch_id,
        mode: options.mode,
        results: options.mode.wants_results().then_some(BatchEntries(entries)),
        statistics,
        timed_out,
        cancelled,
    }
}

/// Make filenames unique: later duplicates get ` (2)`, ` (3)`, ...
pub fn disambiguate<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let mut taken: HashSet<String> = names.iter().map(|n| n.to_string()).collect();
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::with_capacity(names.len());

    for name in names {
        let count = seen.entry(name).or_insert(0);
        *count += 1;
        if *count == 1 {
            out.push(name.to_string());
            continue;
        }
        let mut n = *count;
        let unique = loop {
            let candidate = format!("{name} ({n})");
            if !taken.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        taken.insert(unique.clone());
        out.push(unique);
    }
    out
}
