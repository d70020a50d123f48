// Job records for the download/analysis pipeline.
//
// One record per submitted request, tracked from Queued through a terminal
// state (Completed or Error). The worker that owns a job is its sole writer
// until it reaches a terminal state; after that only the reaper touches it.

pub mod reaper;
pub mod store;

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use uuid::Uuid;

/// Lifecycle states of a job. Completed and Error are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Analyzing,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Finished artifact, held in memory until fetched or reaped.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub data: Vec<u8>,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub url: String,
    pub status: JobStatus,
    /// Percent complete; non-decreasing while the job advances, reset to 0
    /// only on the transition to Error.
    pub progress: u8,
    pub message: String,
    pub created_at: Instant,
    pub updated_at: Instant,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub bpm: Option<u32>,
    pub key: Option<String>,
    /// Present if and only if `status == Completed`.
    pub result: Option<JobResult>,
    /// Descriptive fields attached to the result (served as X-* headers).
    pub metadata: BTreeMap<String, String>,
}

/// Partial update merged into an existing record. Unset fields keep their
/// current value.
#[derive(Debug, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub bpm: Option<u32>,
    pub key: Option<String>,
    pub result: Option<JobResult>,
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Read-only status projection served to polling clients. Binary data is
/// never included here.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Result projection: the finished bytes plus response metadata.
#[derive(Debug, Clone)]
pub struct JobResultView {
    pub data: Vec<u8>,
    pub filename: String,
    pub metadata: BTreeMap<String, String>,
}
