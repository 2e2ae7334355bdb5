use uuid::Uuid;

use crate::{
    error::AppError, storage::db::SurrealDbClient, storage::types::StoredObject, stored_object,
    utils::fingerprint::content_fingerprint,
};

/// Wire names match the extractor's output vocabulary: `judge` is a
/// true/false question, `short` a free-response one.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Single,
    Multiple,
    Judge,
    Short,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Single => "single",
            QuestionType::Multiple => "multiple",
            QuestionType::Judge => "judge",
            QuestionType::Short => "short",
        }
    }
}

/// Where a persisted answer came from, so consumers can tell a sourced
/// answer from a generated or absent one.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnswerOrigin {
    Provided,
    Generated,
    Missing,
}

stored_object!(Question, "question", {
    bank_id: String,
    content: String,
    question_type: QuestionType,
    options: Option<Vec<String>>,
    answer: String,
    answer_origin: AnswerOrigin,
    analysis: Option<String>,
    content_hash: String
});

/// One row of the dedup seed: the already-persisted content and its
/// fingerprint, fetched together so the scope's two representations start
/// consistent.
#[derive(Debug, serde::Deserialize)]
pub struct DedupSeedRow {
    pub content: String,
    pub content_hash: String,
}

#[derive(serde::Deserialize)]
struct CountRow {
    total: u64,
}

impl Question {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bank_id: String,
        content: String,
        question_type: QuestionType,
        options: Option<Vec<String>>,
        answer: String,
        answer_origin: AnswerOrigin,
        analysis: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now();
        let content_hash = content_fingerprint(&content);

        Self {
            id: Uuid::new_v4().to_string(),
            bank_id,
            content,
            question_type,
            options,
            answer,
            answer_origin,
            analysis,
            content_hash,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn dedup_seed(
        db: &SurrealDbClient,
        bank_id: &str,
    ) -> Result<Vec<DedupSeedRow>, AppError> {
        let rows: Vec<DedupSeedRow> = db
            .client
            .query(
                "SELECT content, content_hash FROM type::table($table)
                 WHERE bank_id = $bank_id
                 ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("bank_id", bank_id.to_string()))
            .await?
            .take(0)?;

        Ok(rows)
    }

    pub async fn count_for_bank(db: &SurrealDbClient, bank_id: &str) -> Result<u64, AppError> {
        let rows: Vec<CountRow> = db
            .client
            .query(
                "SELECT count() AS total FROM type::table($table)
                 WHERE bank_id = $bank_id
                 GROUP ALL",
            )
            .bind(("table", Self::table_name()))
            .bind(("bank_id", bank_id.to_string()))
            .await?
            .take(0)?;

        Ok(rows.first().map_or(0, |row| row.total))
    }
}
