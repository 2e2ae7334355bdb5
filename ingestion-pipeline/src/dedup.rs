//! Two-stage question deduplication: exact fingerprint matching first, then
//! a fuzzy similarity scan for the extractor's re-worded variants.

use std::collections::HashSet;

use common::utils::fingerprint::content_fingerprint;
use tracing::debug;

use crate::{extractor::CandidateQuestion, similarity::similarity};

pub const DEFAULT_DEDUP_THRESHOLD: f64 = 0.85;

/// The working set of questions already known for one ingestion job: the
/// fingerprints of everything persisted or accepted so far, plus the raw
/// texts needed for fuzzy comparison. Both representations grow together
/// through [`DedupScope::admit`] and only ever grow.
#[derive(Debug, Default)]
pub struct DedupScope {
    fingerprints: HashSet<String>,
    texts: Vec<String>,
}

impl DedupScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a scope from `(content, fingerprint)` pairs of already-persisted
    /// questions.
    pub fn seed(rows: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut scope = Self::new();
        for (content, fingerprint) in rows {
            scope.fingerprints.insert(fingerprint);
            scope.texts.push(content);
        }
        scope
    }

    /// Records an accepted question. Fingerprint set and text list are
    /// updated together so later candidates see a consistent scope.
    pub fn admit(&mut self, content: &str, fingerprint: String) {
        self.fingerprints.insert(fingerprint);
        self.texts.push(content.to_string());
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Returns true when `content` duplicates a question already in `scope`.
/// Stage 1 is an O(1) fingerprint lookup for byte-identical repeats; stage 2
/// scans every scope text with the fuzzy score and trips at `threshold`.
pub fn is_duplicate(content: &str, scope: &DedupScope, threshold: f64) -> bool {
    let fingerprint = content_fingerprint(content);
    if scope.fingerprints.contains(&fingerprint) {
        debug!("exact fingerprint match, dropping candidate");
        return true;
    }

    for existing in &scope.texts {
        let score = similarity(content, existing);
        if score >= threshold {
            debug!(score, "fuzzy duplicate, dropping candidate");
            return true;
        }
    }

    false
}

/// Filters `candidates` against `scope` in input order. Each accepted
/// candidate is admitted to the scope before the next one is evaluated, so
/// two near-identical candidates in the same batch cannot both survive.
pub fn deduplicate_batch(
    candidates: Vec<CandidateQuestion>,
    scope: &mut DedupScope,
    threshold: f64,
) -> Vec<CandidateQuestion> {
    let mut accepted = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        if is_duplicate(&candidate.content, scope, threshold) {
            continue;
        }

        scope.admit(&candidate.content, content_fingerprint(&candidate.content));
        accepted.push(candidate);
    }

    accepted
}
