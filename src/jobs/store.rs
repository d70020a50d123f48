// In-memory job store.
//
// All operations serialize through one mutex over the whole map. Records are
// small and every operation is O(1), so there is no per-record locking and no
// transaction spanning multiple records. Readers copy fields out; no caller
// ever holds a reference into the map.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::{JobRecord, JobResultView, JobStatus, JobStatusView, JobUpdate};
use crate::error::Error;

#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new Queued record for `url`. Fails if the id is already
    /// present; ids are never reused within a process lifetime.
    pub fn create(&self, id: Uuid, url: &str) -> Result<(), Error> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        let now = Instant::now();
        jobs.insert(
            id,
            JobRecord {
                id,
                url: url.to_string(),
                status: JobStatus::Queued,
                progress: 0,
                message: "Download queued".to_string(),
                created_at: now,
                updated_at: now,
                artist: None,
                title: None,
                bpm: None,
                key: None,
                result: None,
                metadata: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Merge a partial update into an existing record and refresh
    /// `updated_at`. Atomic with respect to concurrent reads and updates.
    pub fn update(&self, id: Uuid, update: JobUpdate) -> Result<(), Error> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(Error::NotFound(id))?;

        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(progress) = update.progress {
            job.progress = progress;
        }
        if let Some(message) = update.message {
            job.message = message;
        }
        if let Some(artist) = update.artist {
            job.artist = Some(artist);
        }
        if let Some(title) = update.title {
            job.title = Some(title);
        }
        if let Some(bpm) = update.bpm {
            job.bpm = Some(bpm);
        }
        if let Some(key) = update.key {
            job.key = Some(key);
        }
        if let Some(result) = update.result {
            job.result = Some(result);
        }
        if let Some(metadata) = update.metadata {
            job.metadata = metadata;
        }
        job.updated_at = Instant::now();
        Ok(())
    }

    /// Copied-out status snapshot, or None for unknown ids.
    pub fn get_status(&self, id: Uuid) -> Option<JobStatusView> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(&id).map(|job| JobStatusView {
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            artist: job.artist.clone(),
            title: job.title.clone(),
            bpm: job.bpm,
            key: job.key.clone(),
        })
    }

    /// Result bytes, only once the job is Completed. Unknown ids and jobs
    /// that have not completed are indistinguishable to the caller.
    pub fn get_result(&self, id: Uuid) -> Option<JobResultView> {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs.get(&id)?;
        if job.status != JobStatus::Completed {
            return None;
        }
        let result = job.result.as_ref()?;
        Some(JobResultView {
            data: result.data.clone(),
            filename: result.filename.clone(),
            metadata: job.metadata.clone(),
        })
    }

    /// Remove a record. Idempotent.
    pub fn delete(&self, id: Uuid) {
        self.jobs.lock().unwrap().remove(&id);
    }

    /// Evict terminal records whose last update is older than `window`.
    /// Returns the number of records removed. Non-terminal jobs are never
    /// touched regardless of age.
    pub fn reap_terminal_older_than(&self, window: Duration) -> usize {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.updated_at.elapsed() > window));
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobResult;
    use std::sync::Arc;

    fn store_with_job() -> (JobStore, Uuid) {
        let store = JobStore::new();
        let id = Uuid::new_v4();
        store.create(id, "https://youtu.be/dQw4w9WgXcQ").unwrap();
        (store, id)
    }

    fn completed_update() -> JobUpdate {
        let mut metadata = BTreeMap::new();
        metadata.insert("Bpm".to_string(), "128".to_string());
        JobUpdate {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            message: Some("Download ready".to_string()),
            result: Some(JobResult {
                data: vec![1, 2, 3],
                filename: "Artist - Title.mp3".to_string(),
            }),
            metadata: Some(metadata),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_starts_queued() {
        let (store, id) = store_with_job();
        let view = store.get_status(id).unwrap();
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.progress, 0);
        assert_eq!(view.message, "Download queued");
        assert!(view.artist.is_none());
        assert!(view.bpm.is_none());
    }

    #[test]
    fn test_create_rejects_duplicate_id() {
        let (store, id) = store_with_job();
        let err = store.create(id, "https://youtu.be/other").unwrap_err();
        assert!(matches!(err, Error::DuplicateId(dup) if dup == id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let store = JobStore::new();
        let id = Uuid::new_v4();
        let err = store.update(id, JobUpdate::default()).unwrap_err();
        assert!(matches!(err, Error::NotFound(missing) if missing == id));
    }

    #[test]
    fn test_update_merges_partial_fields() {
        let (store, id) = store_with_job();
        store
            .update(
                id,
                JobUpdate {
                    status: Some(JobStatus::Analyzing),
                    progress: Some(50),
                    artist: Some("Daft Punk".to_string()),
                    title: Some("Around the World".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let view = store.get_status(id).unwrap();
        assert_eq!(view.status, JobStatus::Analyzing);
        assert_eq!(view.progress, 50);
        assert_eq!(view.artist.as_deref(), Some("Daft Punk"));
        // Untouched fields keep their previous values
        assert_eq!(view.message, "Download queued");
    }

    #[test]
    fn test_get_result_only_when_completed() {
        let (store, id) = store_with_job();
        assert!(store.get_result(id).is_none());

        store
            .update(
                id,
                JobUpdate {
                    status: Some(JobStatus::Processing),
                    progress: Some(75),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.get_result(id).is_none());

        store.update(id, completed_update()).unwrap();
        let result = store.get_result(id).unwrap();
        assert_eq!(result.data, vec![1, 2, 3]);
        assert_eq!(result.filename, "Artist - Title.mp3");
        assert_eq!(result.metadata.get("Bpm").map(String::as_str), Some("128"));
    }

    #[test]
    fn test_get_result_none_for_errored_job() {
        let (store, id) = store_with_job();
        store
            .update(
                id,
                JobUpdate {
                    status: Some(JobStatus::Error),
                    progress: Some(0),
                    message: Some("Error: fetch failed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.get_result(id).is_none());
        // The record itself remains readable
        assert_eq!(store.get_status(id).unwrap().status, JobStatus::Error);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, id) = store_with_job();
        store.delete(id);
        store.delete(id);
        assert!(store.get_status(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_reap_skips_fresh_and_non_terminal_jobs() {
        let (store, running) = store_with_job();
        let done = Uuid::new_v4();
        store.create(done, "https://youtu.be/second").unwrap();
        store.update(done, completed_update()).unwrap();

        // Generous window: nothing is old enough yet
        assert_eq!(store.reap_terminal_older_than(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 2);

        // Zero window: only the terminal job goes
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.reap_terminal_older_than(Duration::ZERO), 1);
        assert!(store.get_status(done).is_none());
        assert!(store.get_status(running).is_some());
    }

    #[test]
    fn test_status_view_serializes_lowercase() {
        let (store, id) = store_with_job();
        let value = serde_json::to_value(store.get_status(id).unwrap()).unwrap();
        assert_eq!(value["status"], "queued");
        assert_eq!(value["progress"], 0);
        // Unset optional fields are omitted entirely
        assert!(value.get("artist").is_none());
    }

    #[test]
    fn test_concurrent_jobs_do_not_cross_contaminate() {
        let store = Arc::new(JobStore::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                let mut ids = Vec::new();
                for _ in 0..50 {
                    let id = Uuid::new_v4();
                    store.create(id, "https://youtu.be/x").unwrap();
                    store
                        .update(
                            id,
                            JobUpdate {
                                status: Some(JobStatus::Completed),
                                progress: Some(100),
                                message: Some(id.to_string()),
                                ..Default::default()
                            },
                        )
                        .unwrap();
                    ids.push(id);
                }
                ids
            }));
        }

        let all_ids: Vec<Uuid> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(all_ids.len(), 400);
        assert_eq!(store.len(), 400);
        for id in all_ids {
            // Each record carries exactly its own id in the message
            assert_eq!(store.get_status(id).unwrap().message, id.to_string());
        }
    }
}
