use common::{
    error::AppError,
    storage::types::question::{AnswerOrigin, Question},
};
use state_machines::core::GuardError;
use tracing::{debug, info, instrument, warn};

use crate::{
    chunker::split_with_overlap,
    dedup::deduplicate_batch,
    extractor::CandidateQuestion,
    pipeline::JobInput,
    progress::JobStatus,
};

use super::{
    context::{ExtractionPlan, JobContext, PreparedQuestion},
    state::{Answered, Extracted, IngestionMachine, Persisted, Prepared, Ready},
};

/// Answer text stored when neither the document nor the backfill produced
/// one.
pub const MISSING_ANSWER_PLACEHOLDER: &str = "(answer not provided)";

#[instrument(
    level = "trace",
    skip_all,
    fields(job_id = %ctx.job.id, bank_id = %ctx.job.bank_id)
)]
pub async fn prepare(
    machine: IngestionMachine<(), Ready>,
    ctx: &mut JobContext<'_>,
) -> Result<IngestionMachine<(), Prepared>, AppError> {
    ctx.publish(ctx.update(JobStatus::Parsing, "Parsing document...", 5.0));

    let plan = match &ctx.job.input {
        JobInput::Text { text } => ExtractionPlan::Text { text: text.clone() },
        JobInput::Document { file_name, data } => {
            if ctx.services.supports_binary_extraction(file_name) {
                info!(file_name = %file_name, "using native binary extraction");
                ExtractionPlan::NativeBinary {
                    file_name: file_name.clone(),
                    data: data.clone(),
                }
            } else {
                ctx.publish(ctx.update(
                    JobStatus::Parsing,
                    "Extracting document text...",
                    10.0,
                ));
                let text = ctx.services.decode_document(data, file_name).await?;
                ExtractionPlan::Text { text }
            }
        }
    };

    if let ExtractionPlan::Text { text } = &plan {
        let text_chars = text.trim().chars().count();
        if text_chars < ctx.config.tuning.min_document_chars {
            return Err(AppError::Validation(
                "Document appears to be empty or too short".into(),
            ));
        }
        debug!(text_chars, "ingestion input ready");
    }

    ctx.plan = Some(plan);

    machine
        .prepare()
        .map_err(|(_, guard)| map_guard_error("prepare", &guard))
}

#[instrument(
    level = "trace",
    skip_all,
    fields(job_id = %ctx.job.id, bank_id = %ctx.job.bank_id)
)]
pub async fn extract(
    machine: IngestionMachine<(), Prepared>,
    ctx: &mut JobContext<'_>,
) -> Result<IngestionMachine<(), Extracted>, AppError> {
    ctx.scope = ctx.services.seed_dedup_scope(&ctx.job.bank_id).await?;
    debug!(
        existing_questions = ctx.scope.len(),
        "dedup scope seeded from question bank"
    );

    let plan = ctx
        .plan
        .take()
        .ok_or_else(|| AppError::InternalError("extraction plan expected to be available".into()))?;

    match plan {
        ExtractionPlan::NativeBinary { file_name, data } => {
            ctx.publish(ctx.update(
                JobStatus::Parsing,
                "Extracting questions from the document...",
                10.0,
            ));

            let candidates = ctx.services.extract_from_document(&data, &file_name).await?;
            ingest_candidates(ctx, candidates);

            let update = ctx
                .update(
                    JobStatus::Deduplicating,
                    format!("Extracted {} questions", ctx.questions_extracted),
                    60.0,
                )
                .with_counts(ctx.questions_extracted, 0, ctx.duplicates_removed);
            ctx.publish(update);
        }
        ExtractionPlan::Text { text }
            if text.chars().count() > ctx.config.tuning.split_threshold =>
        {
            let chunks = split_with_overlap(
                &text,
                ctx.config.tuning.chunk_size,
                ctx.config.tuning.chunk_overlap,
            )?;
            let total_chunks = chunks.len();
            ctx.total_chunks = total_chunks;

            let update = ctx
                .update(
                    JobStatus::Splitting,
                    format!("Document split into {total_chunks} sections"),
                    15.0,
                )
                .with_chunks(0, total_chunks);
            ctx.publish(update);

            for (index, chunk) in chunks.iter().enumerate() {
                let current_chunk = index + 1;
                let progress = 15.0 + (60.0 * current_chunk as f32 / total_chunks as f32);

                let update = ctx
                    .update(
                        JobStatus::ProcessingChunk,
                        format!("Processing section {current_chunk}/{total_chunks}..."),
                        progress,
                    )
                    .with_chunks(current_chunk, total_chunks)
                    .with_counts(ctx.questions_extracted, 0, ctx.duplicates_removed);
                ctx.publish(update);

                match ctx.services.extract_questions(chunk).await {
                    Ok(candidates) => {
                        debug!(
                            chunk = current_chunk,
                            extracted = candidates.len(),
                            "chunk extraction finished"
                        );
                        ingest_candidates(ctx, candidates);
                    }
                    Err(err) => {
                        warn!(
                            chunk = current_chunk,
                            error = %err,
                            "chunk extraction failed, skipping section"
                        );
                    }
                }
            }

            let update = ctx
                .update(
                    JobStatus::Deduplicating,
                    format!(
                        "All sections processed, {} unique questions kept",
                        ctx.accepted.len()
                    ),
                    75.0,
                )
                .with_chunks(total_chunks, total_chunks)
                .with_counts(ctx.questions_extracted, 0, ctx.duplicates_removed);
            ctx.publish(update);
        }
        ExtractionPlan::Text { text } => {
            ctx.publish(ctx.update(JobStatus::Parsing, "Extracting questions...", 30.0));

            let candidates = ctx.services.extract_questions(&text).await?;
            ingest_candidates(ctx, candidates);

            let update = ctx
                .update(
                    JobStatus::Deduplicating,
                    format!("Extracted {} questions", ctx.questions_extracted),
                    60.0,
                )
                .with_counts(ctx.questions_extracted, 0, ctx.duplicates_removed);
            ctx.publish(update);
        }
    }

    if ctx.questions_extracted == 0 {
        return Err(AppError::Processing(
            "No questions found in document".into(),
        ));
    }

    machine
        .extract()
        .map_err(|(_, guard)| map_guard_error("extract", &guard))
}

/// Filters out candidates without question text, then runs the batch
/// through cross-chunk deduplication against the job's running scope.
fn ingest_candidates(ctx: &mut JobContext<'_>, candidates: Vec<CandidateQuestion>) {
    let valid: Vec<CandidateQuestion> = candidates
        .into_iter()
        .filter(|candidate| {
            if candidate.content.trim().is_empty() {
                warn!("dropping extracted candidate without question text");
                false
            } else {
                true
            }
        })
        .collect();

    ctx.questions_extracted += valid.len();

    let batch_size = valid.len();
    let accepted = deduplicate_batch(valid, &mut ctx.scope, ctx.config.tuning.dedup_threshold);
    ctx.duplicates_removed += batch_size - accepted.len();
    ctx.accepted.extend(accepted);
}

#[instrument(
    level = "trace",
    skip_all,
    fields(job_id = %ctx.job.id, bank_id = %ctx.job.bank_id)
)]
pub async fn answer(
    machine: IngestionMachine<(), Extracted>,
    ctx: &mut JobContext<'_>,
) -> Result<IngestionMachine<(), Answered>, AppError> {
    for candidate in std::mem::take(&mut ctx.accepted) {
        let provided = candidate
            .answer
            .as_deref()
            .map(str::trim)
            .filter(|answer| !answer.is_empty() && *answer != "null");

        let (answer, origin) = match provided {
            Some(answer) => (answer.to_string(), AnswerOrigin::Provided),
            None => {
                match ctx
                    .services
                    .generate_answer(
                        &candidate.content,
                        candidate.question_type,
                        candidate.options.as_deref(),
                    )
                    .await
                {
                    Ok(generated) => {
                        ctx.answers_generated += 1;
                        debug!(
                            question = %candidate.content.chars().take(50).collect::<String>(),
                            "generated reference answer"
                        );
                        (generated, AnswerOrigin::Generated)
                    }
                    Err(err) => {
                        warn!(
                            error = %err,
                            question = %candidate.content.chars().take(50).collect::<String>(),
                            "answer backfill failed, storing placeholder"
                        );
                        (MISSING_ANSWER_PLACEHOLDER.to_string(), AnswerOrigin::Missing)
                    }
                }
            }
        };

        ctx.prepared.push(PreparedQuestion {
            candidate,
            answer,
            origin,
        });
    }

    machine
        .answer()
        .map_err(|(_, guard)| map_guard_error("answer", &guard))
}

#[instrument(
    level = "trace",
    skip_all,
    fields(job_id = %ctx.job.id, bank_id = %ctx.job.bank_id)
)]
pub async fn persist(
    machine: IngestionMachine<(), Answered>,
    ctx: &mut JobContext<'_>,
) -> Result<IngestionMachine<(), Persisted>, AppError> {
    let update = ctx
        .update(
            JobStatus::Saving,
            "Saving questions to the question bank...",
            80.0,
        )
        .with_counts(ctx.questions_extracted, 0, ctx.duplicates_removed);
    ctx.publish(update);

    let bank_id = ctx.job.bank_id.clone();
    let questions: Vec<Question> = ctx
        .prepared
        .drain(..)
        .map(|prepared| {
            Question::new(
                bank_id.clone(),
                prepared.candidate.content,
                prepared.candidate.question_type,
                prepared.candidate.options,
                prepared.answer,
                prepared.origin,
                prepared.candidate.analysis,
            )
        })
        .collect();

    let added = ctx.services.persist_questions(questions).await?;
    ctx.questions_added = added;

    let bank_total = ctx.services.finalize_bank(&ctx.job.bank_id).await?;

    info!(
        added,
        bank_total,
        duplicates_removed = ctx.duplicates_removed,
        answers_generated = ctx.answers_generated,
        "ingestion job persisted"
    );

    let mut message = format!(
        "Done. Added {added} new questions ({} duplicates removed)",
        ctx.duplicates_removed
    );
    if ctx.answers_generated > 0 {
        message.push_str(&format!(
            ", generated {} reference answers",
            ctx.answers_generated
        ));
    }

    let update = ctx
        .update(JobStatus::Completed, message, 100.0)
        .with_chunks(ctx.total_chunks, ctx.total_chunks)
        .with_counts(ctx.questions_extracted, added, ctx.duplicates_removed);
    ctx.publish(update);

    machine
        .persist()
        .map_err(|(_, guard)| map_guard_error("persist", &guard))
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}
