use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            question::{Question, QuestionType},
            question_bank::{BankStatus, QuestionBank},
        },
    },
};
use mime_guess::mime;

use crate::{
    decoder::DocumentDecoder,
    dedup::DedupScope,
    extractor::{CandidateQuestion, QuestionExtractor},
};

/// Everything the orchestrator needs from the outside world, behind one
/// trait so tests can drive the pipeline with controllable fakes.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    /// Whether `file_name` can skip text decoding and go straight to the
    /// extractor's native binary path.
    fn supports_binary_extraction(&self, file_name: &str) -> bool;

    async fn decode_document(&self, data: &[u8], file_name: &str) -> Result<String, AppError>;

    async fn extract_questions(&self, text: &str) -> Result<Vec<CandidateQuestion>, AppError>;

    async fn extract_from_document(
        &self,
        data: &[u8],
        file_name: &str,
    ) -> Result<Vec<CandidateQuestion>, AppError>;

    async fn generate_answer(
        &self,
        content: &str,
        question_type: QuestionType,
        options: Option<&[String]>,
    ) -> Result<String, AppError>;

    /// Reads the target bank's persisted questions into a fresh dedup scope.
    async fn seed_dedup_scope(&self, bank_id: &str) -> Result<DedupScope, AppError>;

    async fn persist_questions(&self, questions: Vec<Question>) -> Result<usize, AppError>;

    async fn set_bank_status(&self, bank_id: &str, status: BankStatus) -> Result<(), AppError>;

    /// Marks the bank ready and returns its synced question count.
    async fn finalize_bank(&self, bank_id: &str) -> Result<u64, AppError>;
}

pub struct DefaultPipelineServices {
    db: Arc<SurrealDbClient>,
    extractor: Arc<dyn QuestionExtractor>,
    decoder: Arc<dyn DocumentDecoder>,
}

impl DefaultPipelineServices {
    pub fn new(
        db: Arc<SurrealDbClient>,
        extractor: Arc<dyn QuestionExtractor>,
        decoder: Arc<dyn DocumentDecoder>,
    ) -> Self {
        Self {
            db,
            extractor,
            decoder,
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    fn supports_binary_extraction(&self, file_name: &str) -> bool {
        // The native path currently covers PDFs only; everything else goes
        // through the text decoder regardless of extractor capability.
        self.extractor.supports_binary_input()
            && mime_guess::from_path(file_name).first_or_octet_stream() == mime::APPLICATION_PDF
    }

    async fn decode_document(&self, data: &[u8], file_name: &str) -> Result<String, AppError> {
        self.decoder.decode(data, file_name).await
    }

    async fn extract_questions(&self, text: &str) -> Result<Vec<CandidateQuestion>, AppError> {
        self.extractor.extract(text).await
    }

    async fn extract_from_document(
        &self,
        data: &[u8],
        file_name: &str,
    ) -> Result<Vec<CandidateQuestion>, AppError> {
        self.extractor.extract_from_document(data, file_name).await
    }

    async fn generate_answer(
        &self,
        content: &str,
        question_type: QuestionType,
        options: Option<&[String]>,
    ) -> Result<String, AppError> {
        self.extractor
            .generate_answer(content, question_type, options)
            .await
    }

    async fn seed_dedup_scope(&self, bank_id: &str) -> Result<DedupScope, AppError> {
        let rows = Question::dedup_seed(&self.db, bank_id).await?;
        Ok(DedupScope::seed(
            rows.into_iter().map(|row| (row.content, row.content_hash)),
        ))
    }

    async fn persist_questions(&self, questions: Vec<Question>) -> Result<usize, AppError> {
        let mut stored = 0;
        for question in questions {
            self.db.store_item(question).await?;
            stored += 1;
        }
        Ok(stored)
    }

    async fn set_bank_status(&self, bank_id: &str, status: BankStatus) -> Result<(), AppError> {
        QuestionBank::set_status(&self.db, bank_id, status).await?;
        Ok(())
    }

    async fn finalize_bank(&self, bank_id: &str) -> Result<u64, AppError> {
        let count = Question::count_for_bank(&self.db, bank_id).await?;
        QuestionBank::mark_ready(&self.db, bank_id, count).await?;
        Ok(count)
    }
}
