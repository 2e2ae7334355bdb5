//! The front door of the ingestion core: start a job for a question bank
//! and watch its progress. Everything else (HTTP, auth, storage schema) is
//! the surrounding system's concern.

use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::question_bank::{BankStatus, QuestionBank},
    },
};
use futures::Stream;
use tracing::{error, info};

use crate::{
    pipeline::{IngestionJob, IngestionPipeline, JobInput},
    progress::{JobStatus, ProgressTracker, ProgressUpdate},
};

pub struct IngestionService {
    db: Arc<SurrealDbClient>,
    pipeline: Arc<IngestionPipeline>,
    tracker: Arc<ProgressTracker>,
}

impl IngestionService {
    pub fn new(
        db: Arc<SurrealDbClient>,
        pipeline: Arc<IngestionPipeline>,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            db,
            pipeline,
            tracker,
        }
    }

    /// Starts an ingestion job for `bank_id` and returns its id. The job
    /// runs as an independent task to `Completed` or `Failed`; its outcome
    /// is observable through [`IngestionService::subscribe`] and never
    /// propagates out of the task.
    ///
    /// A bank that is already `Processing` is refused. Note that two calls
    /// racing past this check can still both seed from the same pre-upload
    /// snapshot, a deliberate carry-over of the original behavior.
    pub async fn start_job(&self, bank_id: &str, input: JobInput) -> Result<String, AppError> {
        let bank: QuestionBank = self
            .db
            .get_item(bank_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Question bank {bank_id} not found")))?;

        if bank.status == BankStatus::Processing {
            return Err(AppError::Validation(
                "Question bank is currently being processed. Please wait.".into(),
            ));
        }

        let job = IngestionJob::new(bank_id.to_string(), input);
        let job_id = job.id.clone();

        self.tracker.publish(ProgressUpdate::new(
            job_id.clone(),
            bank_id,
            JobStatus::Pending,
            "Queued for processing",
            0.0,
        ));

        info!(job_id = %job_id, bank_id = %bank_id, "ingestion job queued");

        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            // Failures are already published as a terminal update; the log
            // line is for operators, not observers.
            if let Err(err) = pipeline.run_job(job).await {
                error!(error = %err, "ingestion job ended with error");
            }
        });

        Ok(job_id)
    }

    /// Streams a job's progress updates; see [`ProgressTracker::subscribe`].
    pub fn subscribe(&self, job_id: &str) -> impl Stream<Item = ProgressUpdate> {
        self.tracker.subscribe(job_id)
    }

    pub fn latest_progress(&self, job_id: &str) -> Option<ProgressUpdate> {
        self.tracker.latest(job_id)
    }

    pub fn clear_progress(&self, job_id: &str) {
        self.tracker.clear(job_id);
    }
}
