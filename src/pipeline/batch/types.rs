//! Core types for batch runs: inputs, per-document lifecycle, status events
//! and the ordered result.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::graduation::GraduationCheck;

use super::error::ErrorMarker;
use super::statistics::AggregateStatistics;

// ═══════════════════════════════════════════
// Inputs
// ═══════════════════════════════════════════

/// One uploaded document, owned for the duration of the request.
#[derive(Debug, Clone)]
pub struct BatchDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub declared_mime: Option<String>,
}

impl BatchDocument {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            declared_mime: None,
        }
    }
}

/// What a batch returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Per-student verdicts.
    Individual,
    /// One statistical summary.
    Collective,
    /// Both, from the same run.
    #[default]
    Combined,
}

impl BatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Collective => "collective",
            Self::Combined => "combined",
        }
    }

    pub fn wants_results(&self) -> bool {
        !matches!(self, Self::Collective)
    }

    pub fn wants_statistics(&self) -> bool {
        !matches!(self, Self::Individual)
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "individual" => Ok(Self::Individual),
            "collective" => Ok(Self::Collective),
            "combined" => Ok(Self::Combined),
            other => Err(format!("unknown batch mode {other:?}")),
        }
    }
}

// ═══════════════════════════════════════════
// Lifecycle & status events
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    Received,
    Extracting,
    Aggregating,
    Done,
}

impl DocumentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Extracting => "extracting",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
        }
    }
}

/// Progress notification emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum BatchStatusEvent {
    Started {
        batch_id: Uuid,
        document_count: usize,
    },
    Stage {
        batch_id: Uuid,
        filename: String,
        stage: DocumentStage,
    },
    Completed {
        batch_id: Uuid,
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
    },
    TimedOut {
        batch_id: Uuid,
        unfinished: usize,
    },
    Cancelled {
        batch_id: Uuid,
    },
}

// ═══════════════════════════════════════════
// Result
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEntry {
    Check(GraduationCheck),
    Failed(ErrorMarker),
}

impl BatchEntry {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Check(_))
    }

    pub fn marker(&self) -> Option<&ErrorMarker> {
        match self {
            Self::Failed(marker) => Some(marker),
            Self::Check(_) => None,
        }
    }
}

impl Serialize for BatchEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Check(check) => map.serialize_entry("graduation_check", check)?,
            Self::Failed(marker) => map.serialize_entry("error", marker)?,
        }
        map.end()
    }
}

/// Filename → entry, in upload order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchEntries(pub Vec<(String, BatchEntry)>);

impl BatchEntries {
    pub fn get(&self, name: &str) -> Option<&BatchEntry> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.0.iter().filter(|(_, e)| e.is_ok()).count()
    }
}

impl Serialize for BatchEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, entry) in &self.0 {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

/// Outcome of one batch request. Lives for that request only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub mode: BatchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<BatchEntries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<AggregateStatistics>,
    pub timed_out: bool,
    pub cancelled: bool,
}
