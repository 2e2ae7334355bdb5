mod config;
mod context;
mod services;
mod stages;
mod state;

pub use config::{PipelineConfig, PipelineTuning};
pub use services::{DefaultPipelineServices, PipelineServices};
pub use stages::MISSING_ANSWER_PLACEHOLDER;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::question_bank::BankStatus},
    utils::config::AppConfig,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    decoder::PlainTextDecoder,
    extractor::OpenAiExtractor,
    progress::ProgressTracker,
};

use self::{
    context::JobContext,
    stages::{answer, extract, persist, prepare},
    state::ready,
};

/// The document handed to a job: pre-extracted text, or raw file bytes that
/// still need decoding (or a native-capable extractor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobInput {
    Text { text: String },
    Document { file_name: String, data: Vec<u8> },
}

/// One document-upload-to-ready cycle for one question bank. Jobs are never
/// reused: a follow-up upload to the same bank is a fresh job.
#[derive(Debug, Clone)]
pub struct IngestionJob {
    pub id: String,
    pub bank_id: String,
    pub input: JobInput,
}

impl IngestionJob {
    pub fn new(bank_id: String, input: JobInput) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bank_id,
            input,
        }
    }
}

/// Final counters of a finished job, mirroring the terminal progress update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub questions_extracted: usize,
    pub questions_added: usize,
    pub duplicates_removed: usize,
    pub answers_generated: usize,
}

#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    pipeline_config: PipelineConfig,
    services: Arc<dyn PipelineServices>,
    tracker: Arc<ProgressTracker>,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        config: &AppConfig,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        let extractor = Arc::new(OpenAiExtractor::new(
            openai_client,
            config.openai_model.clone(),
        ));
        let services = DefaultPipelineServices::new(db, extractor, Arc::new(PlainTextDecoder));

        Self::with_services(PipelineConfig::default(), Arc::new(services), tracker)
    }

    pub fn with_services(
        pipeline_config: PipelineConfig,
        services: Arc<dyn PipelineServices>,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            pipeline_config,
            services,
            tracker,
        }
    }

    /// Runs one job to its terminal state. Fatal errors are published as a
    /// `Failed` update and the bank is marked failed before the error is
    /// returned; nothing escapes the job boundary unreported.
    #[tracing::instrument(skip_all, fields(job_id = %job.id, bank_id = %job.bank_id))]
    pub async fn run_job(&self, job: IngestionJob) -> Result<JobSummary, AppError> {
        let mut ctx = JobContext::new(
            &job,
            &self.pipeline_config,
            self.services.as_ref(),
            &self.tracker,
        );

        match self.drive_pipeline(&mut ctx).await {
            Ok(summary) => {
                info!(
                    questions_added = summary.questions_added,
                    duplicates_removed = summary.duplicates_removed,
                    "ingestion job succeeded"
                );
                Ok(summary)
            }
            Err(err) => {
                if let Err(status_err) = self
                    .services
                    .set_bank_status(&job.bank_id, BankStatus::Failed)
                    .await
                {
                    warn!(
                        error = %status_err,
                        "failed to mark question bank as failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn drive_pipeline(&self, ctx: &mut JobContext<'_>) -> Result<JobSummary, AppError> {
        self.services
            .set_bank_status(&ctx.job.bank_id, BankStatus::Processing)
            .await
            .map_err(|err| ctx.abort(err))?;

        let machine = ready();

        let pipeline_started = Instant::now();

        let stage_start = Instant::now();
        let machine = prepare(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        let prepare_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = extract(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        let extract_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = answer(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        let answer_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let _machine = persist(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        let persist_duration = stage_start.elapsed();

        info!(
            total_ms = duration_millis(pipeline_started.elapsed()),
            prepare_ms = duration_millis(prepare_duration),
            extract_ms = duration_millis(extract_duration),
            answer_ms = duration_millis(answer_duration),
            persist_ms = duration_millis(persist_duration),
            "ingestion pipeline finished"
        );

        Ok(JobSummary {
            questions_extracted: ctx.questions_extracted,
            questions_added: ctx.questions_added,
            duplicates_removed: ctx.duplicates_removed,
            answers_generated: ctx.answers_generated,
        })
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests;
