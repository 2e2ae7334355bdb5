//! The question-extraction collaborator: the trait the pipeline talks to,
//! and the OpenAI-compatible default implementation.

use std::sync::Arc;

use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use common::{error::AppError, storage::types::question::QuestionType};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const EXTRACTION_SYSTEM_MESSAGE: &str =
    "You are a professional quiz-question parser. Return only JSON.";

const EXTRACTION_INSTRUCTIONS: &str = r#"Parse the given document and extract every quiz question it contains.

For each question identify:
1. The question text
2. The question type: single (single choice), multiple (multiple choice), judge (true/false), short (free response)
3. The options, for choice questions only, as ["A. Option1", "B. Option2", ...]
4. The correct answer
5. An analysis/explanation, if the document provides one

Return ONLY a JSON array of questions, with no additional text:
[
  {
    "content": "question text",
    "type": "single",
    "options": ["A. Option1", "B. Option2", "C. Option3", "D. Option4"],
    "answer": "A",
    "analysis": "explanation"
  }
]

Document content:
---
"#;

const ANSWER_SYSTEM_MESSAGE: &str =
    "You are a helpful assistant that provides concise answers.";

/// One question as returned by the extractor for a single chunk. Never
/// mutated; the pipeline turns accepted candidates into stored questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateQuestion {
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
}

/// Contract for the external text-extraction service. Binary-capable
/// implementations advertise themselves through `supports_binary_input`
/// instead of the pipeline branching on provider identity.
#[async_trait]
pub trait QuestionExtractor: Send + Sync {
    /// Extracts candidate questions from plain text. An input with no
    /// questions yields an empty list, not an error.
    async fn extract(&self, text: &str) -> Result<Vec<CandidateQuestion>, AppError>;

    fn supports_binary_input(&self) -> bool {
        false
    }

    async fn extract_from_document(
        &self,
        _data: &[u8],
        file_name: &str,
    ) -> Result<Vec<CandidateQuestion>, AppError> {
        Err(AppError::Extraction(format!(
            "this extractor cannot process binary documents ({file_name})"
        )))
    }

    /// Generates a reference answer for a question the document left
    /// unanswered. Failures here are recoverable per question.
    async fn generate_answer(
        &self,
        content: &str,
        question_type: QuestionType,
        options: Option<&[String]>,
    ) -> Result<String, AppError>;
}

pub struct OpenAiExtractor {
    client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    model: String,
}

impl OpenAiExtractor {
    pub fn new(
        client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        model: String,
    ) -> Self {
        Self { client, model }
    }

    async fn complete(
        &self,
        system: &str,
        user: String,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, AppError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(system).into(),
                ChatCompletionRequestUserMessage::from(user).into(),
            ])
            .temperature(temperature);
        if let Some(max_tokens) = max_tokens {
            builder.max_tokens(max_tokens);
        }
        let request = builder.build()?;

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(AppError::LLMParsing(
                "No content found in LLM response".into(),
            ))
    }
}

#[async_trait]
impl QuestionExtractor for OpenAiExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<CandidateQuestion>, AppError> {
        let user_message = format!("{EXTRACTION_INSTRUCTIONS}{text}\n---");
        let raw = self
            .complete(EXTRACTION_SYSTEM_MESSAGE, user_message, 0.3, None)
            .await?;
        decode_candidates(&raw)
    }

    async fn generate_answer(
        &self,
        content: &str,
        question_type: QuestionType,
        options: Option<&[String]>,
    ) -> Result<String, AppError> {
        let prompt = answer_prompt(content, question_type, options);
        let answer = self
            .complete(ANSWER_SYSTEM_MESSAGE, prompt, 0.7, Some(256))
            .await?;
        Ok(answer.trim().to_string())
    }
}

/// Builds the answer-backfill prompt for one unanswered question.
fn answer_prompt(
    content: &str,
    question_type: QuestionType,
    options: Option<&[String]>,
) -> String {
    match (question_type, options) {
        (QuestionType::Single | QuestionType::Multiple, Some(options)) if !options.is_empty() => {
            let kind = match question_type {
                QuestionType::Multiple => "multiple-choice",
                _ => "single-choice",
            };
            let options_text = options.join("\n");
            format!(
                "This is a {kind} question, but the source document provides no answer. \
                 Infer the most likely correct answer from the question itself.\n\n\
                 Question: {content}\n\nOptions:\n{options_text}\n\n\
                 Reply with only the option letters you believe are correct (for example A or AB), \
                 with no explanation. If you cannot decide, reply \"undetermined\"."
            )
        }
        (QuestionType::Judge, _) => format!(
            "This is a true/false question, but the source document provides no answer. \
             Judge whether the statement is correct.\n\nQuestion: {content}\n\n\
             Reply with only \"true\" or \"false\", with no explanation. \
             If you cannot decide, reply \"undetermined\"."
        ),
        _ => format!(
            "This question has no answer in the source document. Provide a concise reference \
             answer (at most 50 words).\n\nQuestion: {content}\n\n\
             Reply with the answer text only, without an \"Answer:\" prefix. \
             If you cannot answer, reply \"undetermined\"."
        ),
    }
}

/// Decodes the extractor's raw response into candidates. The payload goes
/// through the lenient JSON ladder; elements that fail to deserialize or
/// carry empty question text are dropped with a warning rather than failing
/// the whole chunk.
pub fn decode_candidates(raw: &str) -> Result<Vec<CandidateQuestion>, AppError> {
    let value = lenient_json::parse_lenient(raw)
        .map_err(|e| AppError::LLMParsing(format!("Failed to parse extractor response: {e}")))?;

    let serde_json::Value::Array(items) = value else {
        return Err(AppError::LLMParsing(
            "Extractor response was not a JSON array of questions".into(),
        ));
    };

    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<CandidateQuestion>(item) {
            Ok(candidate) if candidate.content.trim().is_empty() => {
                warn!("dropping extracted question with empty content");
            }
            Ok(candidate) => candidates.push(candidate),
            Err(e) => {
                warn!(error = %e, "dropping malformed extracted question");
            }
        }
    }

    Ok(candidates)
}
