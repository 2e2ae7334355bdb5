use crate::dedup::DEFAULT_DEDUP_THRESHOLD;

#[derive(Debug, Clone)]
pub struct PipelineTuning {
    /// Documents longer than this many characters are chunked.
    pub split_threshold: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Decoded documents shorter than this are rejected as empty.
    pub min_document_chars: usize,
    pub dedup_threshold: f64,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            split_threshold: 5_000,
            chunk_size: 3_000,
            chunk_overlap: 1_000,
            min_document_chars: 10,
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub tuning: PipelineTuning,
}
