//! Per-job progress state and its publish/subscribe fan-out.
//!
//! The tracker stores the latest update per job (last-write-wins) and fans
//! every update out to the job's observers over bounded channels. Publishing
//! never blocks: an observer whose buffer is full, or whose stream has been
//! dropped, is disconnected instead of stalling the job.

use std::collections::HashMap;
use std::sync::Mutex;

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Buffered updates per observer before it is considered dead.
const OBSERVER_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Parsing,
    Splitting,
    ProcessingChunk,
    Deduplicating,
    Saving,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Parsing => "parsing",
            JobStatus::Splitting => "splitting",
            JobStatus::ProcessingChunk => "processing_chunk",
            JobStatus::Deduplicating => "deduplicating",
            JobStatus::Saving => "saving",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub job_id: String,
    pub bank_id: String,
    pub status: JobStatus,
    pub message: String,
    /// Percentage in `[0, 100]`, non-decreasing within one job.
    pub progress: f32,
    pub total_chunks: usize,
    pub current_chunk: usize,
    pub questions_extracted: usize,
    pub questions_added: usize,
    pub duplicates_removed: usize,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(
        job_id: impl Into<String>,
        bank_id: impl Into<String>,
        status: JobStatus,
        message: impl Into<String>,
        progress: f32,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            bank_id: bank_id.into(),
            status,
            message: message.into(),
            progress,
            total_chunks: 0,
            current_chunk: 0,
            questions_extracted: 0,
            questions_added: 0,
            duplicates_removed: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_chunks(mut self, current_chunk: usize, total_chunks: usize) -> Self {
        self.current_chunk = current_chunk;
        self.total_chunks = total_chunks;
        self
    }

    pub fn with_counts(
        mut self,
        questions_extracted: usize,
        questions_added: usize,
        duplicates_removed: usize,
    ) -> Self {
        self.questions_extracted = questions_extracted;
        self.questions_added = questions_added;
        self.duplicates_removed = duplicates_removed;
        self
    }
}

#[derive(Default)]
struct JobChannel {
    latest: Option<ProgressUpdate>,
    observers: Vec<mpsc::Sender<ProgressUpdate>>,
}

/// Shared between every job task and any number of observer tasks.
#[derive(Default)]
pub struct ProgressTracker {
    jobs: Mutex<HashMap<String, JobChannel>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `update` as the job's latest state and delivers a copy to each
    /// observer. Delivery is best-effort per observer: a full or closed
    /// channel drops that observer and never delays the others. After a
    /// terminal update the observer registry for the job is emptied; the
    /// streams end on the terminal update they just received.
    pub fn publish(&self, update: ProgressUpdate) {
        let mut jobs = self.lock_jobs();
        let entry = jobs.entry(update.job_id.clone()).or_default();

        entry.latest = Some(update.clone());

        entry.observers.retain(|observer| {
            match observer.try_send(update.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(job_id = %update.job_id, "dropping stalled progress observer");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });

        if update.status.is_terminal() {
            entry.observers.clear();
        }
    }

    /// Latest stored update for a job, if any. Terminal states stay
    /// queryable until [`ProgressTracker::clear`].
    pub fn latest(&self, job_id: &str) -> Option<ProgressUpdate> {
        let jobs = self.lock_jobs();
        jobs.get(job_id).and_then(|entry| entry.latest.clone())
    }

    /// Subscribes to a job's updates. The stream replays the latest stored
    /// update first (late subscribers are not starved), then yields live
    /// updates, and ends as soon as a terminal update has been delivered.
    /// Registration and the replay snapshot happen under one lock, so no
    /// update is lost or delivered twice in between.
    pub fn subscribe(&self, job_id: &str) -> impl Stream<Item = ProgressUpdate> {
        let (replayed, mut receiver) = {
            let mut jobs = self.lock_jobs();
            let entry = jobs.entry(job_id.to_string()).or_default();

            let (sender, receiver) = mpsc::channel(OBSERVER_BUFFER);
            let replayed = entry.latest.clone();
            if !replayed.as_ref().is_some_and(|u| u.status.is_terminal()) {
                entry.observers.push(sender);
            }

            (replayed, receiver)
        };

        stream! {
            if let Some(update) = replayed {
                let terminal = update.status.is_terminal();
                yield update;
                if terminal {
                    return;
                }
            }

            while let Some(update) = receiver.recv().await {
                let terminal = update.status.is_terminal();
                yield update;
                if terminal {
                    break;
                }
            }
        }
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobChannel>> {
        // A poisoned lock only means a publisher panicked mid-update; the
        // map itself is still usable.
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Removes a job's stored state and disconnects any remaining observers.
    pub fn clear(&self, job_id: &str) {
        let mut jobs = self.lock_jobs();
        jobs.remove(job_id);
    }
}
