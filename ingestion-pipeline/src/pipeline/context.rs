use common::{error::AppError, storage::types::question::AnswerOrigin};
use tracing::error;

use crate::{
    dedup::DedupScope,
    extractor::CandidateQuestion,
    progress::{JobStatus, ProgressTracker, ProgressUpdate},
};

use super::{config::PipelineConfig, services::PipelineServices, IngestionJob};

/// How the extract stage will obtain candidates, decided during prepare.
pub enum ExtractionPlan {
    NativeBinary { file_name: String, data: Vec<u8> },
    Text { text: String },
}

/// An accepted candidate with its answer resolved (provided, generated, or
/// explicitly missing), ready to become a stored question.
pub struct PreparedQuestion {
    pub candidate: CandidateQuestion,
    pub answer: String,
    pub origin: AnswerOrigin,
}

pub struct JobContext<'a> {
    pub job: &'a IngestionJob,
    pub config: &'a PipelineConfig,
    pub services: &'a dyn PipelineServices,
    pub tracker: &'a ProgressTracker,
    pub plan: Option<ExtractionPlan>,
    pub scope: DedupScope,
    pub accepted: Vec<CandidateQuestion>,
    pub prepared: Vec<PreparedQuestion>,
    pub questions_extracted: usize,
    pub questions_added: usize,
    pub duplicates_removed: usize,
    pub answers_generated: usize,
    pub total_chunks: usize,
    /// High-water mark keeping published progress non-decreasing.
    last_progress: f32,
}

impl<'a> JobContext<'a> {
    pub fn new(
        job: &'a IngestionJob,
        config: &'a PipelineConfig,
        services: &'a dyn PipelineServices,
        tracker: &'a ProgressTracker,
    ) -> Self {
        Self {
            job,
            config,
            services,
            tracker,
            plan: None,
            scope: DedupScope::new(),
            accepted: Vec::new(),
            prepared: Vec::new(),
            questions_extracted: 0,
            questions_added: 0,
            duplicates_removed: 0,
            answers_generated: 0,
            total_chunks: 0,
            last_progress: 0.0,
        }
    }

    /// Starts a progress update carrying this job's identifiers.
    pub fn update(
        &self,
        status: JobStatus,
        message: impl Into<String>,
        progress: f32,
    ) -> ProgressUpdate {
        ProgressUpdate::new(
            self.job.id.clone(),
            self.job.bank_id.clone(),
            status,
            message,
            progress,
        )
    }

    /// Publishes through the tracker, clamping the percentage against the
    /// job's high-water mark so observers always see a non-decreasing
    /// sequence.
    pub fn publish(&mut self, mut update: ProgressUpdate) {
        update.progress = update.progress.max(self.last_progress);
        self.last_progress = update.progress;
        self.tracker.publish(update);
    }

    /// The job boundary for fatal errors: log, emit the terminal `Failed`
    /// update at the current progress, and hand the error back for the
    /// caller's cleanup.
    pub fn abort(&mut self, err: AppError) -> AppError {
        error!(
            job_id = %self.job.id,
            bank_id = %self.job.bank_id,
            error = %err,
            "ingestion job failed"
        );

        let update = self
            .update(
                JobStatus::Failed,
                format!("Processing failed: {err}"),
                self.last_progress,
            )
            .with_chunks(0, self.total_chunks)
            .with_counts(self.questions_extracted, 0, self.duplicates_removed);
        self.publish(update);

        err
    }
}
