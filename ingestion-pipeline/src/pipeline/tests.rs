use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::{
        question::{AnswerOrigin, Question, QuestionType},
        question_bank::BankStatus,
    },
};
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::{
    dedup::DedupScope,
    extractor::CandidateQuestion,
    progress::{JobStatus, ProgressTracker, ProgressUpdate},
};

use super::{
    config::{PipelineConfig, PipelineTuning},
    services::PipelineServices,
    IngestionJob, IngestionPipeline, JobInput, MISSING_ANSWER_PLACEHOLDER,
};

fn candidate(content: &str, answer: Option<&str>) -> CandidateQuestion {
    CandidateQuestion {
        content: content.to_string(),
        question_type: QuestionType::Single,
        options: Some(vec!["A. Yes".to_string(), "B. No".to_string()]),
        answer: answer.map(str::to_string),
        analysis: None,
    }
}

/// Scripted pipeline services: each `extract_questions` call pops the next
/// scripted batch (`None` simulates an extractor failure for that chunk).
#[derive(Default)]
struct MockServices {
    extract_batches: Mutex<VecDeque<Option<Vec<CandidateQuestion>>>>,
    binary_capable: bool,
    binary_batch: Option<Vec<CandidateQuestion>>,
    decoded_text: Option<String>,
    seed: Vec<(String, String)>,
    backfill_answer: Option<String>,
    persist_fails: bool,
    persisted: Mutex<Vec<Question>>,
    bank_statuses: Mutex<Vec<BankStatus>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockServices {
    fn with_batches(batches: Vec<Option<Vec<CandidateQuestion>>>) -> Self {
        Self {
            extract_batches: Mutex::new(batches.into_iter().collect()),
            backfill_answer: Some("B".to_string()),
            ..Self::default()
        }
    }

    async fn record(&self, call: &'static str) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl PipelineServices for MockServices {
    fn supports_binary_extraction(&self, _file_name: &str) -> bool {
        self.binary_capable
    }

    async fn decode_document(&self, _data: &[u8], _file_name: &str) -> Result<String, AppError> {
        self.record("decode").await;
        self.decoded_text
            .clone()
            .ok_or_else(|| AppError::Validation("unsupported document format".into()))
    }

    async fn extract_questions(&self, _text: &str) -> Result<Vec<CandidateQuestion>, AppError> {
        self.record("extract").await;
        match self.extract_batches.lock().await.pop_front() {
            Some(Some(batch)) => Ok(batch),
            Some(None) => Err(AppError::Extraction("provider rejected the chunk".into())),
            None => Ok(Vec::new()),
        }
    }

    async fn extract_from_document(
        &self,
        _data: &[u8],
        _file_name: &str,
    ) -> Result<Vec<CandidateQuestion>, AppError> {
        self.record("extract_binary").await;
        self.binary_batch
            .clone()
            .ok_or_else(|| AppError::Extraction("binary extraction failed".into()))
    }

    async fn generate_answer(
        &self,
        _content: &str,
        _question_type: QuestionType,
        _options: Option<&[String]>,
    ) -> Result<String, AppError> {
        self.record("generate_answer").await;
        self.backfill_answer
            .clone()
            .ok_or_else(|| AppError::Extraction("answer generation failed".into()))
    }

    async fn seed_dedup_scope(&self, _bank_id: &str) -> Result<DedupScope, AppError> {
        self.record("seed").await;
        Ok(DedupScope::seed(self.seed.clone()))
    }

    async fn persist_questions(&self, questions: Vec<Question>) -> Result<usize, AppError> {
        self.record("persist").await;
        if self.persist_fails {
            return Err(AppError::Database(surrealdb::Error::Api(
                surrealdb::error::Api::ConnectionUninitialised,
            )));
        }
        let count = questions.len();
        self.persisted.lock().await.extend(questions);
        Ok(count)
    }

    async fn set_bank_status(&self, _bank_id: &str, status: BankStatus) -> Result<(), AppError> {
        self.bank_statuses.lock().await.push(status);
        Ok(())
    }

    async fn finalize_bank(&self, _bank_id: &str) -> Result<u64, AppError> {
        self.record("finalize").await;
        let mut statuses = self.bank_statuses.lock().await;
        statuses.push(BankStatus::Ready);
        Ok(self.persisted.lock().await.len() as u64)
    }
}

fn small_chunk_config() -> PipelineConfig {
    PipelineConfig {
        tuning: PipelineTuning {
            split_threshold: 10,
            chunk_size: 8,
            chunk_overlap: 2,
            min_document_chars: 4,
            ..PipelineTuning::default()
        },
    }
}

fn pipeline_with(
    services: Arc<MockServices>,
    config: PipelineConfig,
) -> (IngestionPipeline, Arc<ProgressTracker>) {
    let tracker = Arc::new(ProgressTracker::new());
    let pipeline = IngestionPipeline::with_services(config, services, Arc::clone(&tracker));
    (pipeline, tracker)
}

fn text_job(text: &str) -> IngestionJob {
    IngestionJob::new(
        "bank-1".to_string(),
        JobInput::Text {
            text: text.to_string(),
        },
    )
}

async fn run_and_observe(
    pipeline: &IngestionPipeline,
    tracker: &ProgressTracker,
    job: IngestionJob,
) -> (Result<super::JobSummary, AppError>, Vec<ProgressUpdate>) {
    let stream = tracker.subscribe(&job.id);
    let result = pipeline.run_job(job).await;
    let updates: Vec<ProgressUpdate> = stream.collect().await;
    (result, updates)
}

fn assert_progress_non_decreasing(updates: &[ProgressUpdate]) {
    let mut previous = 0.0_f32;
    for update in updates {
        assert!(
            update.progress >= previous,
            "progress went backwards: {} after {previous}",
            update.progress
        );
        previous = update.progress;
    }
}

#[tokio::test]
async fn short_text_happy_path_deduplicates_and_backfills() {
    let services = Arc::new(MockServices::with_batches(vec![Some(vec![
        candidate("Which gas do plants absorb from the atmosphere?", Some("A")),
        candidate("Which gas do plants absorb from the atmosphere ？", Some("A")),
        candidate("What year did the French Revolution begin?", Some("null")),
    ])]));
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), PipelineConfig::default());
    let job = text_job("A reasonably sized quiz document body.");

    let (result, updates) = run_and_observe(&pipeline, &tracker, job).await;
    let summary = result.expect("job succeeds");

    assert_eq!(summary.questions_extracted, 3);
    assert_eq!(summary.questions_added, 2);
    assert_eq!(summary.duplicates_removed, 1);
    assert_eq!(summary.answers_generated, 1);

    let persisted = services.persisted.lock().await;
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[0].answer_origin, AnswerOrigin::Provided);
    assert_eq!(persisted[0].answer, "A");
    assert_eq!(persisted[1].answer_origin, AnswerOrigin::Generated);
    assert_eq!(persisted[1].answer, "B");

    let statuses: Vec<JobStatus> = updates.iter().map(|u| u.status).collect();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Parsing,
            JobStatus::Parsing,
            JobStatus::Deduplicating,
            JobStatus::Saving,
            JobStatus::Completed,
        ]
    );
    assert_progress_non_decreasing(&updates);

    let last = updates.last().expect("terminal update");
    assert_eq!(last.questions_added, 2);
    assert_eq!(last.duplicates_removed, 1);
    assert!((last.progress - 100.0).abs() < f32::EPSILON);

    let bank_statuses = services.bank_statuses.lock().await;
    assert_eq!(
        *bank_statuses,
        vec![BankStatus::Processing, BankStatus::Ready]
    );
}

#[tokio::test]
async fn chunked_document_deduplicates_across_chunks() {
    // 20 chars with chunk_size 8 / overlap 2 => windows 0..8, 6..14, 12..20.
    let services = Arc::new(MockServices::with_batches(vec![
        Some(vec![candidate(
            "Which planet is closest to the sun?",
            Some("A"),
        )]),
        Some(vec![
            candidate("Which planet is closest to the sun ？", Some("A")),
            candidate("Name the chemical symbol for potassium.", Some("K")),
        ]),
        Some(Vec::new()),
    ]));
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), small_chunk_config());
    let job = text_job("abcdefghijklmnopqrst");

    let (result, updates) = run_and_observe(&pipeline, &tracker, job).await;
    let summary = result.expect("job succeeds");

    assert_eq!(summary.questions_extracted, 3);
    assert_eq!(summary.questions_added, 2);
    assert_eq!(summary.duplicates_removed, 1);

    let statuses: Vec<JobStatus> = updates.iter().map(|u| u.status).collect();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Parsing,
            JobStatus::Splitting,
            JobStatus::ProcessingChunk,
            JobStatus::ProcessingChunk,
            JobStatus::ProcessingChunk,
            JobStatus::Deduplicating,
            JobStatus::Saving,
            JobStatus::Completed,
        ]
    );
    assert_progress_non_decreasing(&updates);

    let chunk_updates: Vec<&ProgressUpdate> = updates
        .iter()
        .filter(|u| u.status == JobStatus::ProcessingChunk)
        .collect();
    assert_eq!(chunk_updates.len(), 3);
    assert_eq!(chunk_updates[0].current_chunk, 1);
    assert_eq!(chunk_updates[2].current_chunk, 3);
    assert!(chunk_updates.iter().all(|u| u.total_chunks == 3));
}

#[tokio::test]
async fn failing_chunk_is_skipped_and_the_job_still_completes() {
    let services = Arc::new(MockServices::with_batches(vec![
        Some(vec![candidate("First unique question?", Some("A"))]),
        None, // chunk 2 blows up
        Some(vec![candidate(
            "Second question, entirely unrelated to anything else.",
            Some("B"),
        )]),
    ]));
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), small_chunk_config());
    let job = text_job("abcdefghijklmnopqrst");

    let (result, updates) = run_and_observe(&pipeline, &tracker, job).await;
    let summary = result.expect("job succeeds despite one bad chunk");

    assert_eq!(summary.questions_extracted, 2);
    assert_eq!(summary.questions_added, 2);
    assert_eq!(summary.duplicates_removed, 0);

    let last = updates.last().expect("terminal update");
    assert_eq!(last.status, JobStatus::Completed);
}

#[tokio::test]
async fn job_fails_when_every_chunk_fails() {
    let services = Arc::new(MockServices::with_batches(vec![None, None, None]));
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), small_chunk_config());
    let job = text_job("abcdefghijklmnopqrst");

    let (result, updates) = run_and_observe(&pipeline, &tracker, job).await;
    assert!(matches!(result, Err(AppError::Processing(_))));

    let last = updates.last().expect("terminal update");
    assert_eq!(last.status, JobStatus::Failed);
    assert!(last.message.contains("No questions found"));
    // The failure keeps the progress high-water mark instead of resetting.
    assert!(last.progress >= 75.0);
    assert_progress_non_decreasing(&updates);

    let bank_statuses = services.bank_statuses.lock().await;
    assert_eq!(
        *bank_statuses,
        vec![BankStatus::Processing, BankStatus::Failed]
    );
}

#[tokio::test]
async fn job_fails_when_extraction_finds_nothing() {
    let services = Arc::new(MockServices::with_batches(vec![Some(Vec::new())]));
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), PipelineConfig::default());
    let job = text_job("A document with no recognizable questions in it.");

    let (result, updates) = run_and_observe(&pipeline, &tracker, job).await;
    assert!(matches!(result, Err(AppError::Processing(_))));
    assert_eq!(
        updates.last().map(|u| u.status),
        Some(JobStatus::Failed)
    );
}

#[tokio::test]
async fn candidates_without_text_are_dropped_not_fatal() {
    let mut empty = candidate("", Some("A"));
    empty.content = "   ".to_string();
    let services = Arc::new(MockServices::with_batches(vec![Some(vec![
        empty,
        candidate("A real question with actual text?", Some("A")),
    ])]));
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), PipelineConfig::default());
    let job = text_job("A reasonably sized quiz document body.");

    let (result, _updates) = run_and_observe(&pipeline, &tracker, job).await;
    let summary = result.expect("job succeeds");

    // The blank candidate never counts as extracted or duplicated.
    assert_eq!(summary.questions_extracted, 1);
    assert_eq!(summary.questions_added, 1);
    assert_eq!(summary.duplicates_removed, 0);
}

#[tokio::test]
async fn backfill_failure_stores_an_explicit_placeholder() {
    let mut services = MockServices::with_batches(vec![Some(vec![candidate(
        "Unanswered question?",
        None,
    )])]);
    services.backfill_answer = None;
    let services = Arc::new(services);
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), PipelineConfig::default());
    let job = text_job("A reasonably sized quiz document body.");

    let (result, _updates) = run_and_observe(&pipeline, &tracker, job).await;
    let summary = result.expect("backfill failure is not fatal");

    assert_eq!(summary.questions_added, 1);
    assert_eq!(summary.answers_generated, 0);

    let persisted = services.persisted.lock().await;
    assert_eq!(persisted[0].answer, MISSING_ANSWER_PLACEHOLDER);
    assert_eq!(persisted[0].answer_origin, AnswerOrigin::Missing);
}

#[tokio::test]
async fn persistence_failure_fails_the_job() {
    let mut services = MockServices::with_batches(vec![Some(vec![candidate(
        "A perfectly fine question?",
        Some("A"),
    )])]);
    services.persist_fails = true;
    let services = Arc::new(services);
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), PipelineConfig::default());
    let job = text_job("A reasonably sized quiz document body.");

    let (result, updates) = run_and_observe(&pipeline, &tracker, job).await;
    assert!(matches!(result, Err(AppError::Database(_))));

    let last = updates.last().expect("terminal update");
    assert_eq!(last.status, JobStatus::Failed);
    assert!(last.message.contains("Processing failed"));

    let bank_statuses = services.bank_statuses.lock().await;
    assert_eq!(bank_statuses.last(), Some(&BankStatus::Failed));
}

#[tokio::test]
async fn too_short_documents_are_rejected_in_prepare() {
    let services = Arc::new(MockServices::with_batches(vec![]));
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), PipelineConfig::default());
    let job = text_job("tiny");

    let (result, updates) = run_and_observe(&pipeline, &tracker, job).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(updates.last().map(|u| u.status), Some(JobStatus::Failed));

    // The extractor was never consulted.
    let calls = services.calls.lock().await;
    assert!(!calls.contains(&"extract"));
}

#[tokio::test]
async fn binary_capable_extractor_skips_text_decoding() {
    let mut services = MockServices::default();
    services.binary_capable = true;
    services.binary_batch = Some(vec![candidate("From the PDF itself?", Some("A"))]);
    services.backfill_answer = Some("B".to_string());
    let services = Arc::new(services);
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), PipelineConfig::default());

    let job = IngestionJob::new(
        "bank-1".to_string(),
        JobInput::Document {
            file_name: "quiz.pdf".to_string(),
            data: b"%PDF-1.7 ...".to_vec(),
        },
    );

    let (result, updates) = run_and_observe(&pipeline, &tracker, job).await;
    let summary = result.expect("job succeeds");
    assert_eq!(summary.questions_added, 1);

    let calls = services.calls.lock().await;
    assert!(calls.contains(&"extract_binary"));
    assert!(!calls.contains(&"decode"));
    assert_eq!(updates.last().map(|u| u.status), Some(JobStatus::Completed));
}

#[tokio::test]
async fn binary_incapable_extractor_decodes_to_text_first() {
    let mut services = MockServices::with_batches(vec![Some(vec![candidate(
        "From the decoded text?",
        Some("A"),
    )])]);
    services.decoded_text = Some("A decoded document with plenty of text.".to_string());
    let services = Arc::new(services);
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), PipelineConfig::default());

    let job = IngestionJob::new(
        "bank-1".to_string(),
        JobInput::Document {
            file_name: "quiz.txt".to_string(),
            data: b"some bytes".to_vec(),
        },
    );

    let (result, _updates) = run_and_observe(&pipeline, &tracker, job).await;
    let summary = result.expect("job succeeds");
    assert_eq!(summary.questions_added, 1);

    let calls = services.calls.lock().await;
    assert!(calls.contains(&"decode"));
    assert!(calls.contains(&"extract"));
    assert!(!calls.contains(&"extract_binary"));
}

#[tokio::test]
async fn seeded_scope_blocks_historical_duplicates() {
    let seed_content = "Name the largest planet in the solar system.";
    let mut services = MockServices::with_batches(vec![Some(vec![
        candidate("Name the largest planet in our solar system.", Some("A")),
        candidate("How many moons does Mars have?", Some("2")),
    ])]);
    services.seed = vec![(
        seed_content.to_string(),
        common::utils::fingerprint::content_fingerprint(seed_content),
    )];
    let services = Arc::new(services);
    let (pipeline, tracker) = pipeline_with(Arc::clone(&services), PipelineConfig::default());
    let job = text_job("A reasonably sized quiz document body.");

    let (result, _updates) = run_and_observe(&pipeline, &tracker, job).await;
    let summary = result.expect("job succeeds");

    assert_eq!(summary.questions_extracted, 2);
    assert_eq!(summary.questions_added, 1);
    assert_eq!(summary.duplicates_removed, 1);

    let persisted = services.persisted.lock().await;
    assert_eq!(persisted[0].content, "How many moons does Mars have?");
}
