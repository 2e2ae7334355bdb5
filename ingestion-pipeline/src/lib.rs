#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunker;
pub mod decoder;
pub mod dedup;
pub mod extractor;
pub mod pipeline;
pub mod progress;
pub mod service;
pub mod similarity;

pub use pipeline::{IngestionJob, IngestionPipeline, JobInput, PipelineConfig, PipelineTuning};
pub use progress::{JobStatus, ProgressTracker, ProgressUpdate};
pub use service::IngestionService;
