use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, storage::types::StoredObject, stored_object};

/// Lifecycle of a question bank with respect to document ingestion.
#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BankStatus {
    #[default]
    Pending,
    Processing,
    Ready,
    Failed,
}

impl BankStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankStatus::Pending => "pending",
            BankStatus::Processing => "processing",
            BankStatus::Ready => "ready",
            BankStatus::Failed => "failed",
        }
    }
}

stored_object!(QuestionBank, "question_bank", {
    title: String,
    status: BankStatus,
    question_count: u64
});

impl QuestionBank {
    pub fn new(title: String) -> Self {
        let now = chrono::Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            title,
            status: BankStatus::Pending,
            question_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn create_and_store(
        title: String,
        db: &SurrealDbClient,
    ) -> Result<QuestionBank, AppError> {
        let bank = Self::new(title);
        db.store_item(bank.clone()).await?;
        Ok(bank)
    }

    pub async fn set_status(
        db: &SurrealDbClient,
        id: &str,
        status: BankStatus,
    ) -> Result<QuestionBank, AppError> {
        const SET_STATUS_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $status,
                updated_at = $now
            RETURN *;
        "#;

        let now = chrono::Utc::now();
        let mut result = db
            .client
            .query(SET_STATUS_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("status", status.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<QuestionBank> = result.take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("Question bank {id} not found")))
    }

    /// Marks the bank ready after a successful ingestion run and records the
    /// authoritative question count.
    pub async fn mark_ready(
        db: &SurrealDbClient,
        id: &str,
        question_count: u64,
    ) -> Result<QuestionBank, AppError> {
        const MARK_READY_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $status,
                question_count = $question_count,
                updated_at = $now
            RETURN *;
        "#;

        let now = chrono::Utc::now();
        let mut result = db
            .client
            .query(MARK_READY_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("status", BankStatus::Ready.as_str()))
            .bind(("question_count", question_count))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<QuestionBank> = result.take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("Question bank {id} not found")))
    }
}
