// Error taxonomy for the service.
//
// Analysis failures are deliberately absent: the estimator absorbs them and
// reports (bpm = 0, key = "Unknown") instead of surfacing an error.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid user input, rejected before a job is created
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Attempt to create a job under an id that is already present
    #[error("Job {0} already exists")]
    DuplicateId(Uuid),

    /// Unknown job id
    #[error("Job {0} not found")]
    NotFound(Uuid),

    /// Media retrieval failure (downloader launch, exit status, missing output)
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Metadata embedding failure
    #[error("Tagging failed: {0}")]
    Tagging(String),

    /// Unexpected internal failure (task panics and the like)
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
