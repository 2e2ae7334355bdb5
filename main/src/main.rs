//! Command-line driver: ingest one document into a (new or existing)
//! question bank and follow the job's progress until it terminates.
//!
//! Usage: `ingest <bank-title-or-id> <file>`

use std::sync::Arc;

use common::{
    storage::{
        db::SurrealDbClient,
        types::question_bank::QuestionBank,
    },
    utils::config::get_config,
};
use futures::{pin_mut, StreamExt};
use ingestion_pipeline::{IngestionPipeline, IngestionService, JobInput, ProgressTracker};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let mut args = std::env::args().skip(1);
    let (Some(bank_ref), Some(file_path)) = (args.next(), args.next()) else {
        eprintln!("usage: ingest <bank-title-or-id> <file>");
        std::process::exit(2);
    };

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let tracker = Arc::new(ProgressTracker::new());
    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&db),
        openai_client,
        &config,
        Arc::clone(&tracker),
    ));
    let service = IngestionService::new(Arc::clone(&db), pipeline, tracker);

    // Reuse the bank when the argument is an existing id, otherwise create
    // one with the argument as its title.
    let bank = match db.get_item::<QuestionBank>(&bank_ref).await? {
        Some(existing) => existing,
        None => QuestionBank::create_and_store(bank_ref.clone(), &db).await?,
    };

    let file_name = std::path::Path::new(&file_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.clone());
    let data = tokio::fs::read(&file_path).await?;

    info!(bank_id = %bank.id, file = %file_name, "starting ingestion job");

    let job_id = service
        .start_job(&bank.id, JobInput::Document { file_name, data })
        .await?;

    let updates = service.subscribe(&job_id);
    pin_mut!(updates);

    let mut failed = false;
    while let Some(update) = updates.next().await {
        info!(
            status = update.status.as_str(),
            progress = update.progress,
            extracted = update.questions_extracted,
            added = update.questions_added,
            duplicates = update.duplicates_removed,
            "{}",
            update.message
        );
        failed = update.status == ingestion_pipeline::JobStatus::Failed;
    }

    if failed {
        error!(job_id = %job_id, "ingestion job failed");
        std::process::exit(1);
    }

    Ok(())
}
